//! The synchronization orchestrator.

use crate::classifier::classify;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::matcher::match_pairs;
use crate::progress::ProgressReporter;
use crate::state::{ExecutionContext, ExecutionOutcome, PairFailure, SyncAction, SyncState};
use crate::strategy::{strategy_for, SyncStrategy};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use twinsync_core::{
    AdapterError, EntityMapper, Ledger, LedgerStore, RelationRecord, Repository, Side, TimeWindow,
    VersionEntry,
};
use uuid::Uuid;

/// Relation record type for a pair of repositories.
pub type RelationOf<A, B> = RelationRecord<
    <A as Repository>::Id,
    <A as Repository>::Version,
    <B as Repository>::Id,
    <B as Repository>::Version,
>;

/// Ledger type for a pair of repositories.
pub type LedgerOf<A, B> = Ledger<
    <A as Repository>::Id,
    <A as Repository>::Version,
    <B as Repository>::Id,
    <B as Repository>::Version,
>;

/// Sync state type for a pair of repositories.
pub type StateOf<A, B> = SyncState<
    <A as Repository>::Id,
    <A as Repository>::Version,
    <B as Repository>::Id,
    <B as Repository>::Version,
>;

type OutcomeOf<A, B> = ExecutionOutcome<
    <A as Repository>::Id,
    <A as Repository>::Version,
    <B as Repository>::Id,
    <B as Repository>::Version,
>;

type EntriesOf<R> = Vec<VersionEntry<<R as Repository>::Id, <R as Repository>::Version>>;

/// The phase of the synchronizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// No run has started yet.
    Idle,
    /// Loading the ledger and enumerating both sides.
    Enumerating,
    /// Executing pair batches.
    Executing,
    /// Writing the ledger.
    Persisting,
    /// The last run finished (possibly cancelled).
    Completed,
    /// The last run aborted with an error.
    Failed,
}

impl SyncPhase {
    /// Returns true while a run is in progress.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SyncPhase::Enumerating | SyncPhase::Executing | SyncPhase::Persisting
        )
    }

    /// Returns true if a new run can start.
    pub fn can_start_sync(&self) -> bool {
        !self.is_active()
    }
}

/// Marks the run failed if it unwinds while a phase is still active.
struct PhaseGuard<'a>(&'a RwLock<SyncPhase>);

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        let mut phase = self.0.write();
        if phase.is_active() {
            tracing::error!(phase = ?*phase, "sync run unwound");
            *phase = SyncPhase::Failed;
        }
    }
}

/// Cumulative statistics over all runs of a synchronizer.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Runs that finished, including cancelled ones.
    pub runs_completed: u64,
    /// Runs that were cancelled.
    pub runs_cancelled: u64,
    /// Runs that aborted with an error.
    pub runs_failed: u64,
    /// Pairs committed to the ledger.
    pub pairs_processed: u64,
    /// Repository-writing actions that succeeded.
    pub writes_succeeded: u64,
    /// Actions that failed and fell back.
    pub pair_failures: u64,
    /// When the last run finished.
    pub last_run: Option<DateTime<Utc>>,
    /// Last fatal error message.
    pub last_error: Option<String>,
}

/// Result of one synchronization run.
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// Unique id of the run.
    pub run_id: Uuid,
    /// Profile that was synchronized.
    pub profile: String,
    /// Number of pairs the run decided on.
    pub total_pairs: usize,
    /// Number of pairs per action (as decided, including failures).
    pub actions: BTreeMap<SyncAction, usize>,
    /// Pairs whose action failed.
    pub failures: Vec<PairFailure>,
    /// Whether the run stopped early.
    pub cancelled: bool,
    /// Records in the ledger after the run.
    pub ledger_size: usize,
    /// Wall-clock duration.
    pub duration: Duration,
}

impl SyncReport {
    fn new(run_id: Uuid, profile: &str, total_pairs: usize) -> Self {
        Self {
            run_id,
            profile: profile.to_string(),
            total_pairs,
            actions: BTreeMap::new(),
            failures: Vec::new(),
            cancelled: false,
            ledger_size: 0,
            duration: Duration::ZERO,
        }
    }

    fn record<AI, AV, BI, BV>(&mut self, outcome: &ExecutionOutcome<AI, AV, BI, BV>) {
        *self.actions.entry(outcome.action).or_insert(0) += 1;
        if let Some(failure) = &outcome.failure {
            self.failures.push(failure.clone());
        }
    }

    /// Number of executed pairs with the given action.
    pub fn count(&self, action: SyncAction) -> usize {
        self.actions.get(&action).copied().unwrap_or(0)
    }

    /// Number of executed pairs.
    pub fn executed(&self) -> usize {
        self.actions.values().sum()
    }

    /// Number of executed pairs whose action was not `DoNothing`.
    pub fn changes(&self) -> usize {
        self.executed() - self.count(SyncAction::DoNothing)
    }

    /// Number of successful repository writes.
    pub fn writes(&self) -> usize {
        let attempted: usize = self
            .actions
            .iter()
            .filter(|(action, _)| action.writes())
            .map(|(_, n)| n)
            .sum();
        let failed = self.failures.iter().filter(|f| f.action.writes()).count();
        attempted - failed
    }
}

/// Handle that cancels a synchronizer's current run from anywhere.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Reconciles two repositories through a ledger.
///
/// A run loads the ledger, enumerates both sides, classifies and matches
/// every entity, lets the strategy pick an action per pair, executes the
/// actions in batches on scoped worker threads, and persists the ledger.
/// Per-pair failures are contained and reported; only enumeration and
/// ledger failures abort a run.
pub struct Synchronizer<A, B, M, L>
where
    A: Repository,
    B: Repository,
{
    config: SyncConfig,
    a: A,
    b: B,
    mapper: M,
    store: L,
    strategy: Box<dyn SyncStrategy<A::Id, A::Version, B::Id, B::Version>>,
    phase: RwLock<SyncPhase>,
    stats: RwLock<SyncStats>,
    cancelled: CancelHandle,
}

impl<A, B, M, L> Synchronizer<A, B, M, L>
where
    A: Repository,
    B: Repository,
    M: EntityMapper<A::Entity, B::Entity>,
    L: LedgerStore<A::Id, A::Version, B::Id, B::Version>,
{
    /// Creates a synchronizer with the strategy the configuration selects.
    pub fn new(config: SyncConfig, a: A, b: B, mapper: M, store: L) -> SyncResult<Self> {
        config.validate()?;
        if store.profile() != config.profile {
            return Err(SyncError::Configuration(format!(
                "ledger store belongs to profile {:?}, not {:?}",
                store.profile(),
                config.profile
            )));
        }
        let strategy = strategy_for(&config);
        Ok(Self {
            config,
            a,
            b,
            mapper,
            store,
            strategy,
            phase: RwLock::new(SyncPhase::Idle),
            stats: RwLock::new(SyncStats::default()),
            cancelled: CancelHandle::default(),
        })
    }

    /// Replaces the strategy.
    pub fn with_strategy(
        mut self,
        strategy: impl SyncStrategy<A::Id, A::Version, B::Id, B::Version> + 'static,
    ) -> Self {
        self.strategy = Box::new(strategy);
        self
    }

    /// The configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Side A's repository.
    pub fn repository_a(&self) -> &A {
        &self.a
    }

    /// Side B's repository.
    pub fn repository_b(&self) -> &B {
        &self.b
    }

    /// The entity mapper.
    pub fn mapper(&self) -> &M {
        &self.mapper
    }

    /// The ledger store.
    pub fn ledger_store(&self) -> &L {
        &self.store
    }

    /// Gets the current phase.
    pub fn phase(&self) -> SyncPhase {
        *self.phase.read()
    }

    /// Gets the cumulative stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Cancels the current run after its current batch.
    pub fn cancel(&self) {
        self.cancelled.cancel();
    }

    /// Resets the cancelled flag.
    pub fn reset_cancel(&self) {
        self.cancelled.0.store(false, Ordering::SeqCst);
    }

    /// Returns a handle that cancels runs of this synchronizer.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancelled.clone()
    }

    fn set_phase(&self, phase: SyncPhase) {
        tracing::debug!(?phase, "sync phase");
        *self.phase.write() = phase;
    }

    /// Runs one synchronization.
    ///
    /// Fails only if the ledger cannot be loaded or saved, if either side
    /// cannot be enumerated, or if a run is already in progress.
    pub fn synchronize(&self, progress: &dyn ProgressReporter) -> SyncResult<SyncReport> {
        let started = Instant::now();
        {
            let mut phase = self.phase.write();
            if !phase.can_start_sync() {
                return Err(SyncError::InvalidStateTransition {
                    from: format!("{:?}", *phase),
                    to: format!("{:?}", SyncPhase::Enumerating),
                });
            }
            *phase = SyncPhase::Enumerating;
        }
        let _unwind = PhaseGuard(&self.phase);
        self.reset_cancel();

        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("sync_run", %run_id, profile = %self.config.profile);
        let _enter = span.enter();

        let result = self.run(run_id, progress, started);
        progress.finish();

        let mut stats = self.stats.write();
        stats.last_run = Some(Utc::now());
        match &result {
            Ok(report) => {
                stats.runs_completed += 1;
                stats.runs_cancelled += u64::from(report.cancelled);
                stats.pairs_processed += report.executed() as u64;
                stats.writes_succeeded += report.writes() as u64;
                stats.pair_failures += report.failures.len() as u64;
                stats.last_error = None;
                drop(stats);
                self.set_phase(SyncPhase::Completed);
            }
            Err(e) => {
                tracing::error!(error = %e, "sync run aborted");
                stats.runs_failed += 1;
                stats.last_error = Some(e.to_string());
                drop(stats);
                self.set_phase(SyncPhase::Failed);
            }
        }
        result
    }

    fn run(
        &self,
        run_id: Uuid,
        progress: &dyn ProgressReporter,
        started: Instant,
    ) -> SyncResult<SyncReport> {
        let mut ledger = self.store.load()?;
        tracing::debug!(records = ledger.len(), "ledger loaded");

        let (a_entries, b_entries) = self.enumerate(&ledger)?;
        let a_side = classify(a_entries, ledger.a_versions());
        let b_side = classify(b_entries, ledger.b_versions());
        let states: Vec<StateOf<A, B>> = match_pairs(&ledger, a_side, b_side)
            .into_iter()
            .map(|pair| self.strategy.decide(pair))
            .collect();

        self.set_phase(SyncPhase::Executing);
        let mut report = SyncReport::new(run_id, &self.config.profile, states.len());
        progress.start(states.len() as u64);

        let mut remaining = states.into_iter();
        loop {
            if self.cancelled.is_cancelled() {
                tracing::info!(committed = report.executed(), "sync run cancelled");
                report.cancelled = true;
                break;
            }
            let batch: Vec<_> = remaining.by_ref().take(self.config.batch_size).collect();
            if batch.is_empty() {
                break;
            }

            for outcome in self.execute_batch(batch) {
                report.record(&outcome);
                outcome.next.apply_to(&mut ledger);
                progress.increment();
            }

            if self.config.checkpoint_each_batch && !remaining.as_slice().is_empty() {
                self.store.save(&ledger)?;
                tracing::debug!(records = ledger.len(), "ledger checkpoint");
            }
        }

        self.set_phase(SyncPhase::Persisting);
        self.store.save(&ledger)?;

        report.ledger_size = ledger.len();
        report.duration = started.elapsed();
        tracing::info!(
            pairs = report.total_pairs,
            changes = report.changes(),
            failures = report.failures.len(),
            cancelled = report.cancelled,
            ledger = report.ledger_size,
            elapsed_ms = report.duration.as_millis() as u64,
            "sync run finished"
        );
        Ok(report)
    }

    /// Enumerates both sides concurrently.
    fn enumerate(&self, ledger: &LedgerOf<A, B>) -> SyncResult<(EntriesOf<A>, EntriesOf<B>)> {
        let window = self.config.window.as_ref();
        let (a_known, b_known): (Vec<A::Id>, Vec<B::Id>) = match window {
            Some(_) => ledger
                .iter()
                .map(|r| (r.a_id.clone(), r.b_id.clone()))
                .unzip(),
            None => (Vec::new(), Vec::new()),
        };

        std::thread::scope(|scope| {
            let a_repo = &self.a;
            let a_handle = scope.spawn(move || enumerate_side(a_repo, Side::A, window, a_known));
            let b_result = enumerate_side(&self.b, Side::B, window, b_known);
            let a_result = a_handle.join().unwrap_or_else(|_| {
                Err(SyncError::enumeration(
                    Side::A,
                    AdapterError::backend_fatal("enumeration thread panicked"),
                ))
            });
            Ok((a_result?, b_result?))
        })
    }

    /// Executes one batch on up to `workers` scoped threads.
    ///
    /// Outcomes come back in batch order. A pair whose action panics takes
    /// its fallback state; the rest of its chunk still runs.
    fn execute_batch(&self, batch: Vec<StateOf<A, B>>) -> Vec<OutcomeOf<A, B>> {
        let ctx = ExecutionContext::prepare(&self.a, &self.b, &self.mapper, &batch);
        let workers = self.config.workers.clamp(1, batch.len().max(1));
        let chunk_size = batch.len().div_ceil(workers);

        let mut chunks = Vec::with_capacity(workers);
        let mut states = batch.into_iter();
        loop {
            let chunk: Vec<_> = states.by_ref().take(chunk_size).collect();
            if chunk.is_empty() {
                break;
            }
            chunks.push(chunk);
        }

        std::thread::scope(|scope| {
            let ctx = &ctx;
            let handles: Vec<_> = chunks
                .into_iter()
                .map(|chunk| {
                    let len = chunk.len();
                    let handle = scope.spawn(move || {
                        chunk
                            .into_iter()
                            .map(|state| execute_contained(state, ctx))
                            .collect::<Vec<_>>()
                    });
                    (handle, len)
                })
                .collect();

            let mut outcomes = Vec::new();
            for (handle, len) in handles {
                match handle.join() {
                    Ok(chunk) => outcomes.extend(chunk),
                    // Pairs without an outcome keep their ledger records.
                    Err(_) => tracing::error!(pairs = len, "sync worker panicked"),
                }
            }
            outcomes
        })
    }
}

/// Executes one pair, turning a panic into a retryable failure that
/// leaves the pair in its fallback state.
fn execute_contained<A, B, M>(
    state: StateOf<A, B>,
    ctx: &ExecutionContext<'_, A, B, M>,
) -> OutcomeOf<A, B>
where
    A: Repository,
    B: Repository,
    M: EntityMapper<A::Entity, B::Entity>,
{
    let action = state.action();
    let entity = state.describe();
    let fallback = state.fallback();
    match panic::catch_unwind(AssertUnwindSafe(|| state.execute(ctx))) {
        Ok(outcome) => outcome,
        Err(_) => {
            tracing::error!(%action, %entity, "sync action panicked; pair deferred");
            ExecutionOutcome {
                action,
                next: fallback,
                failure: Some(PairFailure {
                    action,
                    entity,
                    error: "action panicked".to_string(),
                    retryable: true,
                }),
            }
        }
    }
}

/// Enumerates one side.
///
/// With a window, ledger ids the window hides are looked up directly, so
/// they only count as deleted if they are really gone.
fn enumerate_side<R: Repository>(
    repo: &R,
    side: Side,
    window: Option<&TimeWindow>,
    known: Vec<R::Id>,
) -> SyncResult<EntriesOf<R>> {
    let mut entries = repo
        .enumerate(window)
        .map_err(|e| SyncError::enumeration(side, e))?;

    if window.is_some() && !known.is_empty() {
        let hidden: Vec<R::Id> = {
            let seen: HashSet<&R::Id> = entries.iter().map(|e| &e.id).collect();
            known.into_iter().filter(|id| !seen.contains(id)).collect()
        };
        if !hidden.is_empty() {
            let found = repo
                .versions(&hidden)
                .map_err(|e| SyncError::enumeration(side, e))?;
            tracing::debug!(
                %side,
                hidden = hidden.len(),
                found = found.len(),
                "resolved ids outside window"
            );
            entries.extend(found);
        }
    }

    tracing::debug!(%side, entities = entries.len(), "enumerated");
    Ok(entries)
}
