//! Load testing framework for the banking transfer service.
//!
//! This crate provides tools to:
//! - Allocate unique identities across concurrently spawned virtual users
//! - Bootstrap a pair of funded accounts per virtual user
//! - Drive transfers in both directions between those accounts
//! - Collect per-request latency and outcome metrics
//! - Output results in multiple formats (console, JSON, CSV)

pub mod api;
pub mod config;
pub mod error;
pub mod identity;
pub mod metrics;
pub mod report;
pub mod runner;
pub mod user;
pub mod workload;

pub use api::{AccountId, BankApi, HttpBankClient, TransferResponse, UserId};
pub use config::TestConfig;
pub use error::{CallError, CallResult};
pub use identity::IdentityAllocator;
pub use metrics::{
    MetricsCollector, MetricsSink, RecordingSink, RequestEvent, RequestLogSink, RunStats,
    TestResults,
};
pub use report::ResultsReport;
pub use runner::LoadRunner;
pub use user::{AccountPair, BootstrapOutcome, BootstrapSettings, VirtualUser};
pub use workload::{Direction, TaskPicker, TaskSelection, TransferOutcome, TransferWorkload};
