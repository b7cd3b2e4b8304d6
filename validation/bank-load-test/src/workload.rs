//! Steady-state transfer workload.

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{error, trace};

use crate::api::{AccountId, BankApi};
use crate::metrics::{MetricsSink, RequestEvent};
use crate::user::{AccountPair, VirtualUser};

/// Request type reported for every transfer event.
pub const TRANSFER_REQUEST_TYPE: &str = "transfer";

/// Which way money moves between a virtual user's two accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// First account to second account.
    Forward,
    /// Second account to first account.
    Reverse,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Forward, Direction::Reverse];

    /// Event name for this direction.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Forward => "1->2",
            Self::Reverse => "2->1",
        }
    }

    /// `(from, to)` for this direction.
    pub fn endpoints(&self, pair: &AccountPair) -> (AccountId, AccountId) {
        match self {
            Self::Forward => (pair.first, pair.second),
            Self::Reverse => (pair.second, pair.first),
        }
    }
}

/// How the scheduler chooses the next task for a virtual user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskSelection {
    #[default]
    Random,
    RoundRobin,
}

/// Yields the direction of each successive transfer for one virtual user.
pub struct TaskPicker {
    selection: TaskSelection,
    next_index: usize,
}

impl TaskPicker {
    pub fn new(selection: TaskSelection) -> Self {
        Self {
            selection,
            next_index: 0,
        }
    }

    pub fn next(&mut self, rng: &mut StdRng) -> Direction {
        match self.selection {
            TaskSelection::Random => Direction::ALL[rng.gen_range(0..Direction::ALL.len())],
            TaskSelection::RoundRobin => {
                let direction = Direction::ALL[self.next_index % Direction::ALL.len()];
                self.next_index += 1;
                direction
            }
        }
    }
}

/// What a single workload invocation did.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferOutcome {
    /// The virtual user has no account pair; nothing was sent or recorded.
    Skipped,
    /// A response arrived and one event was recorded.
    Recorded { success: bool },
    /// No response arrived; logged only, no event recorded.
    TransportFault,
}

/// Issues fixed-amount transfers between a virtual user's accounts.
#[derive(Debug, Clone)]
pub struct TransferWorkload {
    amount: i64,
}

impl Default for TransferWorkload {
    fn default() -> Self {
        Self::new(5)
    }
}

impl TransferWorkload {
    pub fn new(amount: i64) -> Self {
        Self { amount }
    }

    pub fn amount(&self) -> i64 {
        self.amount
    }

    /// Run one transfer in `direction` and report it to `sink`.
    pub async fn run(
        &self,
        user: &VirtualUser,
        direction: Direction,
        api: &dyn BankApi,
        sink: &dyn MetricsSink,
    ) -> TransferOutcome {
        let Some(pair) = user.accounts() else {
            return TransferOutcome::Skipped;
        };

        let (from, to) = direction.endpoints(&pair);

        match api.transfer(from, to, self.amount).await {
            Ok(response) => {
                let success = response.is_success();
                trace!(
                    vu = user.ordinal(),
                    direction = direction.label(),
                    status = response.status,
                    "Transfer completed"
                );

                sink.record(RequestEvent {
                    request_type: TRANSFER_REQUEST_TYPE.to_string(),
                    name: direction.label().to_string(),
                    duration_ms: response.elapsed.as_secs_f64() * 1000.0,
                    size_bytes: response.body.len(),
                    error: if success { None } else { Some(response.body) },
                });

                TransferOutcome::Recorded { success }
            }
            Err(e) => {
                error!(
                    vu = user.ordinal(),
                    error = %e,
                    "Transfer {} error",
                    direction.label()
                );
                TransferOutcome::TransportFault
            }
        }
    }
}
