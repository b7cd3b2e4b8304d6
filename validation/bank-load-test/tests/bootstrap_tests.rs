//! Bootstrap sequencing against a scripted bank.

mod common;

use bank_load_test::{
    AccountId, AccountPair, BootstrapOutcome, BootstrapSettings, IdentityAllocator, UserId,
    VirtualUser,
};
use common::{bad_status, transport, Call, ScriptedBank};

async fn bootstrap(bank: &ScriptedBank, ids: &IdentityAllocator) -> (VirtualUser, BootstrapOutcome) {
    let mut user = VirtualUser::new(0);
    let outcome = user
        .bootstrap(bank, ids, &BootstrapSettings::default())
        .await;
    (user, outcome)
}

// ============================================================================
// Happy path
// ============================================================================

#[tokio::test]
async fn test_happy_path_creates_funded_pair() {
    let bank = ScriptedBank::new()
        .with_users(vec![Ok(UserId(1)), Ok(UserId(2))])
        .with_accounts(vec![Ok(AccountId(10)), Ok(AccountId(11))]);
    let ids = IdentityAllocator::new();

    let (user, outcome) = bootstrap(&bank, &ids).await;

    assert_eq!(outcome, BootstrapOutcome::Ready { unseeded: 0 });
    assert_eq!(
        user.accounts(),
        Some(AccountPair {
            first: AccountId(10),
            second: AccountId(11)
        })
    );
    assert_eq!(
        bank.calls(),
        vec![
            Call::CreateUser("user0".into()),
            Call::CreateUser("user1".into()),
            Call::CreateAccount(UserId(1)),
            Call::CreateAccount(UserId(2)),
            Call::Deposit(AccountId(10), 100),
            Call::Deposit(AccountId(11), 100),
        ]
    );
}

#[tokio::test]
async fn test_usernames_come_from_allocator() {
    let bank = ScriptedBank::new();
    let ids = IdentityAllocator::starting_at(40);
    let settings = BootstrapSettings {
        username_prefix: "lt".to_string(),
        seed_amount: 250,
    };

    let mut first = VirtualUser::new(0);
    let mut second = VirtualUser::new(1);
    first.bootstrap(&bank, &ids, &settings).await;
    second.bootstrap(&bank, &ids, &settings).await;

    assert_eq!(bank.usernames(), vec!["lt40", "lt41", "lt42", "lt43"]);
    assert_eq!(bank.count(|c| matches!(c, Call::Deposit(_, 250))), 4);
    assert_ne!(first.accounts(), second.accounts());
}

#[tokio::test]
async fn test_bootstrap_runs_once() {
    let bank = ScriptedBank::new();
    let ids = IdentityAllocator::new();

    let (mut user, outcome) = bootstrap(&bank, &ids).await;
    assert!(outcome.is_ready());
    let calls_after_first = bank.calls().len();

    let again = user
        .bootstrap(&bank, &ids, &BootstrapSettings::default())
        .await;
    assert_eq!(again, BootstrapOutcome::AlreadyBootstrapped);
    assert_eq!(bank.calls().len(), calls_after_first);
    assert_eq!(ids.peek(), 2);
}

// ============================================================================
// User creation failures
// ============================================================================

#[tokio::test]
async fn test_first_user_failure_aborts_before_accounts() {
    let bank = ScriptedBank::new().with_users(vec![Err(bad_status(500, "boom")), Ok(UserId(2))]);
    let ids = IdentityAllocator::new();

    let (user, outcome) = bootstrap(&bank, &ids).await;

    assert_eq!(outcome, BootstrapOutcome::UserCreationFailed);
    assert!(user.accounts().is_none());
    assert_eq!(bank.count(|c| matches!(c, Call::CreateUser(_))), 2);
    assert_eq!(bank.count(|c| matches!(c, Call::CreateAccount(_))), 0);
    assert_eq!(bank.count(|c| matches!(c, Call::Deposit(..))), 0);
}

#[tokio::test]
async fn test_second_user_transport_fault_aborts() {
    let bank =
        ScriptedBank::new().with_users(vec![Ok(UserId(1)), Err(transport("connection reset"))]);
    let ids = IdentityAllocator::new();

    let (user, outcome) = bootstrap(&bank, &ids).await;

    assert_eq!(outcome, BootstrapOutcome::UserCreationFailed);
    assert!(user.accounts().is_none());
    assert_eq!(bank.count(|c| matches!(c, Call::CreateAccount(_))), 0);
}

// ============================================================================
// Account creation failures
// ============================================================================

#[tokio::test]
async fn test_account_failure_skips_deposits() {
    let bank = ScriptedBank::new()
        .with_accounts(vec![Ok(AccountId(10)), Err(bad_status(500, "no such user"))]);
    let ids = IdentityAllocator::new();

    let (user, outcome) = bootstrap(&bank, &ids).await;

    assert_eq!(outcome, BootstrapOutcome::AccountCreationFailed);
    assert!(user.accounts().is_none());
    assert_eq!(bank.count(|c| matches!(c, Call::CreateAccount(_))), 2);
    assert_eq!(bank.count(|c| matches!(c, Call::Deposit(..))), 0);
}

// ============================================================================
// Deposit failures
// ============================================================================

#[tokio::test]
async fn test_deposit_failure_keeps_pair() {
    let bank = ScriptedBank::new()
        .with_users(vec![Ok(UserId(1)), Ok(UserId(2))])
        .with_accounts(vec![Ok(AccountId(10)), Ok(AccountId(11))])
        .with_deposits(vec![Err(bad_status(500, "ledger locked"))]);
    let ids = IdentityAllocator::new();

    let (user, outcome) = bootstrap(&bank, &ids).await;

    assert_eq!(outcome, BootstrapOutcome::Ready { unseeded: 1 });
    assert_eq!(
        user.accounts(),
        Some(AccountPair {
            first: AccountId(10),
            second: AccountId(11)
        })
    );
    // The second deposit is still attempted
    assert_eq!(bank.count(|c| matches!(c, Call::Deposit(..))), 2);
}

#[tokio::test]
async fn test_both_deposits_fail() {
    let bank = ScriptedBank::new().with_deposits(vec![
        Err(transport("timed out")),
        Err(bad_status(400, "bad amount")),
    ]);
    let ids = IdentityAllocator::new();

    let (user, outcome) = bootstrap(&bank, &ids).await;

    assert_eq!(outcome, BootstrapOutcome::Ready { unseeded: 2 });
    assert!(user.accounts().is_some());
}
