//! Virtual-user scheduling and load test orchestration.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::api::{BankApi, HttpBankClient};
use crate::config::TestConfig;
use crate::identity::IdentityAllocator;
use crate::metrics::{MetricsCollector, MetricsSink, RequestLogSink, RunStats, TestResults};
use crate::user::{BootstrapOutcome, BootstrapSettings, VirtualUser};
use crate::workload::{TaskPicker, TaskSelection, TransferOutcome, TransferWorkload};

/// Lifecycle counters shared by all virtual users of a run.
#[derive(Debug, Default)]
pub struct RunCounters {
    users_spawned: AtomicU64,
    users_ready: AtomicU64,
    user_creation_failures: AtomicU64,
    account_creation_failures: AtomicU64,
    unseeded_accounts: AtomicU64,
    transfers_skipped: AtomicU64,
    transfer_transport_faults: AtomicU64,
}

impl RunCounters {
    pub fn record_bootstrap(&self, outcome: BootstrapOutcome) {
        match outcome {
            BootstrapOutcome::Ready { unseeded } => {
                self.users_ready.fetch_add(1, Ordering::Relaxed);
                self.unseeded_accounts
                    .fetch_add(unseeded as u64, Ordering::Relaxed);
            }
            BootstrapOutcome::UserCreationFailed => {
                self.user_creation_failures.fetch_add(1, Ordering::Relaxed);
            }
            BootstrapOutcome::AccountCreationFailed => {
                self.account_creation_failures
                    .fetch_add(1, Ordering::Relaxed);
            }
            BootstrapOutcome::AlreadyBootstrapped => {}
        }
    }

    pub fn record_transfer(&self, outcome: &TransferOutcome) {
        match outcome {
            TransferOutcome::Skipped => {
                self.transfers_skipped.fetch_add(1, Ordering::Relaxed);
            }
            TransferOutcome::TransportFault => {
                self.transfer_transport_faults
                    .fetch_add(1, Ordering::Relaxed);
            }
            TransferOutcome::Recorded { .. } => {}
        }
    }

    /// Zero the per-transfer counters. Bootstrap counters are kept.
    pub fn reset_transfer_counters(&self) {
        self.transfers_skipped.store(0, Ordering::Relaxed);
        self.transfer_transport_faults.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RunStats {
        RunStats {
            users_spawned: self.users_spawned.load(Ordering::Relaxed),
            users_ready: self.users_ready.load(Ordering::Relaxed),
            user_creation_failures: self.user_creation_failures.load(Ordering::Relaxed),
            account_creation_failures: self.account_creation_failures.load(Ordering::Relaxed),
            unseeded_accounts: self.unseeded_accounts.load(Ordering::Relaxed),
            transfers_skipped: self.transfers_skipped.load(Ordering::Relaxed),
            transfer_transport_faults: self.transfer_transport_faults.load(Ordering::Relaxed),
        }
    }
}

/// Everything a virtual user task needs, shared across the run.
struct UserContext {
    api: Arc<dyn BankApi>,
    sink: Arc<dyn MetricsSink>,
    identities: Arc<IdentityAllocator>,
    counters: Arc<RunCounters>,
    bootstrap: BootstrapSettings,
    workload: TransferWorkload,
    selection: TaskSelection,
    wait_ms: (u64, u64),
    seed: Option<u64>,
}

/// Spawns virtual users and drives them for the configured duration.
pub struct LoadRunner {
    api: Arc<dyn BankApi>,
    config: TestConfig,
    show_progress: bool,
}

impl LoadRunner {
    /// Create a load runner talking HTTP to `config.base_url`.
    pub fn new(config: TestConfig) -> anyhow::Result<Self> {
        let client = HttpBankClient::new(
            &config.base_url,
            config.request_timeout(),
            config.users as usize,
        )?;
        Ok(Self::with_api(config, Arc::new(client)))
    }

    /// Create a load runner over any [`BankApi`].
    pub fn with_api(config: TestConfig, api: Arc<dyn BankApi>) -> Self {
        Self {
            api,
            config,
            show_progress: true,
        }
    }

    /// Disable the progress bar.
    pub fn without_progress(mut self) -> Self {
        self.show_progress = false;
        self
    }

    /// Run the load test.
    pub async fn run(&self) -> anyhow::Result<TestResults> {
        let config = &self.config;
        config.validate()?;

        let warmup_duration = Duration::from_secs(config.warmup_secs);
        let total_duration = warmup_duration + Duration::from_secs(config.duration_secs);

        info!(
            name = %config.name,
            base_url = %config.base_url,
            users = config.users,
            hatch_rate = config.hatch_rate,
            duration_secs = config.duration_secs,
            warmup_secs = config.warmup_secs,
            "Starting load test"
        );

        let collector = Arc::new(MetricsCollector::new());
        let request_log = if config.log_requests {
            Some(Arc::new(self.open_request_log()?))
        } else {
            None
        };
        let counters = Arc::new(RunCounters::default());

        let context = Arc::new(UserContext {
            api: self.api.clone(),
            sink: Arc::new((collector.clone(), request_log.clone())),
            identities: Arc::new(IdentityAllocator::starting_at(config.identity_offset)),
            counters: counters.clone(),
            bootstrap: config.bootstrap_settings(),
            workload: TransferWorkload::new(config.transfer_amount),
            selection: config.task_selection,
            wait_ms: (config.wait_min_ms, config.wait_max_ms),
            seed: config.seed,
        });

        let pb = if self.show_progress {
            ProgressBar::new(config.duration_secs)
        } else {
            ProgressBar::hidden()
        };
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len}s {msg}")?
                .progress_chars("##-"),
        );

        let (stop_tx, stop_rx) = watch::channel(false);
        let hatcher = tokio::spawn(hatch_users(
            config.users,
            config.hatch_interval(),
            context,
            stop_rx,
        ));

        let start_time = Instant::now();
        let mut warmup_complete = warmup_duration.is_zero();
        if warmup_complete {
            pb.set_message("Test phase");
        }

        let mut ticker = tokio::time::interval(Duration::from_millis(250));
        while start_time.elapsed() < total_duration {
            ticker.tick().await;

            if !warmup_complete && start_time.elapsed() >= warmup_duration {
                warmup_complete = true;
                pb.set_message("Test phase");
                // Reset metrics after warmup
                collector.reset();
                counters.reset_transfer_counters();
                debug!("Warmup complete, metrics reset");
            }

            if warmup_complete {
                let test_elapsed = start_time.elapsed().saturating_sub(warmup_duration).as_secs();
                pb.set_position(test_elapsed.min(config.duration_secs));
            } else {
                pb.set_message(format!(
                    "Warmup ({}/{}s)",
                    start_time.elapsed().as_secs(),
                    config.warmup_secs
                ));
            }
        }

        // Users stop between tasks; in-flight calls are allowed to finish.
        pb.set_message("Stopping virtual users...");
        let _ = stop_tx.send(true);

        let handles = hatcher.await?;
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Virtual user task ended abnormally");
            }
        }

        pb.finish_with_message("Complete!");

        if let Some(log) = &request_log {
            log.flush()?;
        }

        let stats = counters.snapshot();
        info!(
            users_ready = stats.users_ready,
            requests = collector.total_requests(),
            "Load test finished"
        );

        Ok(collector.results(config.name.clone(), config.users, stats))
    }

    fn open_request_log(&self) -> anyhow::Result<RequestLogSink> {
        let results_dir = if Path::new("validation/bank-load-test").exists() {
            "validation/bank-load-test/results"
        } else {
            "results"
        };
        std::fs::create_dir_all(results_dir)?;

        let scenario_name = self.config.name.replace(' ', "_").to_lowercase();
        let log_path = format!(
            "{}/{}_{}.jsonl",
            results_dir,
            scenario_name,
            chrono::Utc::now().format("%Y%m%d_%H%M%S")
        );
        info!(path = %log_path, "Logging transfer events");
        RequestLogSink::create(&log_path)
    }
}

/// Spawn `users` virtual users, one per `interval` (`None` = all at once).
async fn hatch_users(
    users: u32,
    interval: Option<Duration>,
    context: Arc<UserContext>,
    mut stop: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::with_capacity(users as usize);

    for ordinal in 0..users as u64 {
        if *stop.borrow() {
            break;
        }

        context.counters.users_spawned.fetch_add(1, Ordering::Relaxed);
        handles.push(tokio::spawn(drive_user(
            ordinal,
            context.clone(),
            stop.clone(),
        )));

        if let Some(interval) = interval {
            tokio::select! {
                _ = sleep(interval) => {}
                _ = stop.changed() => break,
            }
        }
    }

    debug!(spawned = handles.len(), "Hatching finished");
    handles
}

/// Lifecycle of one virtual user: bootstrap once, then transfer until stopped.
async fn drive_user(ordinal: u64, ctx: Arc<UserContext>, mut stop: watch::Receiver<bool>) {
    let mut user = VirtualUser::new(ordinal);
    let outcome = user
        .bootstrap(ctx.api.as_ref(), &ctx.identities, &ctx.bootstrap)
        .await;
    ctx.counters.record_bootstrap(outcome);

    let mut rng = match ctx.seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(ordinal)),
        None => StdRng::from_entropy(),
    };
    let mut picker = TaskPicker::new(ctx.selection);
    let (wait_min, wait_max) = ctx.wait_ms;

    loop {
        if *stop.borrow() {
            break;
        }

        let direction = picker.next(&mut rng);
        let result = ctx
            .workload
            .run(&user, direction, ctx.api.as_ref(), ctx.sink.as_ref())
            .await;
        ctx.counters.record_transfer(&result);

        let think_time = Duration::from_millis(rng.gen_range(wait_min..=wait_max));
        tokio::select! {
            _ = sleep(think_time) => {}
            _ = stop.changed() => break,
        }
    }
}
