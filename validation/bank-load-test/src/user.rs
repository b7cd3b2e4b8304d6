//! Virtual users and their one-time bootstrap.
//!
//! A virtual user owns two service-side users, each with one account. Bootstrap
//! creates both users, then both accounts, then seeds both balances. Missing
//! users or accounts leave the virtual user inert; a failed deposit does not.

use tracing::{debug, error, info, instrument, warn};

use crate::api::{AccountId, BankApi, UserId};
use crate::error::CallResult;
use crate::identity::IdentityAllocator;

/// The two accounts a virtual user transfers between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountPair {
    pub first: AccountId,
    pub second: AccountId,
}

/// Parameters of the bootstrap sequence.
#[derive(Debug, Clone)]
pub struct BootstrapSettings {
    pub username_prefix: String,
    pub seed_amount: i64,
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            username_prefix: "user".to_string(),
            seed_amount: 100,
        }
    }
}

/// How a bootstrap attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// Both accounts exist. `unseeded` counts deposits that failed.
    Ready { unseeded: u8 },
    /// At least one user could not be created; nothing else was attempted.
    UserCreationFailed,
    /// At least one account could not be created; no deposits were attempted.
    AccountCreationFailed,
    /// Bootstrap already ran for this virtual user.
    AlreadyBootstrapped,
}

impl BootstrapOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }
}

/// One simulated client.
#[derive(Debug)]
pub struct VirtualUser {
    ordinal: u64,
    bootstrapped: bool,
    accounts: Option<AccountPair>,
}

impl VirtualUser {
    /// `ordinal` is the scheduler's spawn index, used for log correlation and
    /// RNG seeding only. Usernames come from the identity allocator.
    pub fn new(ordinal: u64) -> Self {
        Self {
            ordinal,
            bootstrapped: false,
            accounts: None,
        }
    }

    pub fn ordinal(&self) -> u64 {
        self.ordinal
    }

    /// Account pair, present only after a successful bootstrap.
    pub fn accounts(&self) -> Option<AccountPair> {
        self.accounts
    }

    /// Create two users and two accounts on the service and seed both balances.
    ///
    /// Runs at most once per virtual user. Never returns an error: every
    /// failure is logged and reflected in the outcome.
    #[instrument(skip_all, fields(vu = self.ordinal))]
    pub async fn bootstrap(
        &mut self,
        api: &dyn BankApi,
        identities: &IdentityAllocator,
        settings: &BootstrapSettings,
    ) -> BootstrapOutcome {
        if self.bootstrapped {
            return BootstrapOutcome::AlreadyBootstrapped;
        }
        self.bootstrapped = true;

        let username_a = format!("{}{}", settings.username_prefix, identities.next());
        let username_b = format!("{}{}", settings.username_prefix, identities.next());

        let user_a = create_user(api, &username_a).await;
        let user_b = create_user(api, &username_b).await;
        let (Some(user_a), Some(user_b)) = (user_a, user_b) else {
            error!(
                first = %username_a,
                first_created = user_a.is_some(),
                second = %username_b,
                second_created = user_b.is_some(),
                "Failed to create users"
            );
            return BootstrapOutcome::UserCreationFailed;
        };
        info!(first = %username_a, second = %username_b, "Created users");

        let account_a = create_account(api, user_a).await;
        let account_b = create_account(api, user_b).await;

        let (Some(first), Some(second)) = (account_a, account_b) else {
            error!("Failed to create accounts");
            return BootstrapOutcome::AccountCreationFailed;
        };

        self.accounts = Some(AccountPair { first, second });

        let mut unseeded = 0;
        for account_id in [first, second] {
            if !deposit(api, account_id, settings.seed_amount).await {
                error!(account_id = %account_id, "Failed to deposit to account");
                unseeded += 1;
            }
        }

        debug!(first = %first, second = %second, unseeded, "Bootstrap complete");
        BootstrapOutcome::Ready { unseeded }
    }
}

fn ok_or_log<T>(result: CallResult<T>, what: &str) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) if e.is_transport() => {
            error!(error = %e, "{} error", what);
            None
        }
        Err(e) => {
            warn!(error = %e, "{} failed", what);
            None
        }
    }
}

async fn create_user(api: &dyn BankApi, username: &str) -> Option<UserId> {
    ok_or_log(api.create_user(username).await, "Create user")
}

async fn create_account(api: &dyn BankApi, user_id: UserId) -> Option<AccountId> {
    ok_or_log(api.create_account(user_id).await, "Create account")
}

async fn deposit(api: &dyn BankApi, account_id: AccountId, amount: i64) -> bool {
    ok_or_log(api.deposit(account_id, amount).await, "Deposit").is_some()
}
