//! Waterfall orchestration: sequential resolve-and-play attempts under one
//! shared deadline.
//!
//! A run resolves the tag, tries to start a unit for the resulting chain and
//! on any failure asks the resolver for the next candidate. It stops at the
//! first unit that starts, when candidates run out, or when the budget is
//! spent. `on_run_finish` fires exactly once per run.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::{AdError, AdRunError, Result};
use crate::metrics::METRICS;
use crate::model::Chain;
use crate::obs;
use crate::options::{ResolveOptions, WaterfallOptions};
use crate::requested::RequestedAdSet;
use crate::resolver::ChainResolver;
use crate::unit::{PlaybackUnit, UnitFactory};

pub type AdStartHook = Arc<dyn Fn(Arc<dyn PlaybackUnit>) + Send + Sync>;
pub type RunErrorHook = Arc<dyn Fn(&AdRunError, &ErrorContext) + Send + Sync>;
pub type RunFinishHook = Arc<dyn Fn() + Send + Sync>;
pub type ChainTransform = Arc<dyn Fn(Chain) -> Chain + Send + Sync>;
pub type ChainValidator = Arc<dyn Fn(&Chain) -> std::result::Result<(), AdError> + Send + Sync>;
pub type UnitTransform = Arc<dyn Fn(Arc<dyn PlaybackUnit>) -> Arc<dyn PlaybackUnit> + Send + Sync>;

/// Caller callbacks for a run. Every hook is optional.
#[derive(Clone, Default)]
pub struct WaterfallHooks {
    /// A unit reached `started`. Fires at most once per run.
    pub on_ad_start: Option<AdStartHook>,
    /// An attempt failed, the started unit reported an error, or the run
    /// ended on a terminal error.
    pub on_error: Option<RunErrorHook>,
    pub on_run_finish: Option<RunFinishHook>,
    /// Rewrite each chain before it is used.
    pub transform_chain: Option<ChainTransform>,
    /// Reject a chain; the error counts as a failed attempt.
    pub validate_chain: Option<ChainValidator>,
    /// Wrap or replace each created unit before it starts.
    pub transform_unit: Option<UnitTransform>,
}

/// What an error hook knows about the failed attempt.
#[derive(Clone, Default)]
pub struct ErrorContext {
    pub chain: Option<Chain>,
    pub unit: Option<Arc<dyn PlaybackUnit>>,
}

impl ErrorContext {
    fn chain(chain: &Chain) -> Self {
        Self {
            chain: Some(chain.clone()),
            unit: None,
        }
    }

    fn unit(chain: &Chain, unit: &Arc<dyn PlaybackUnit>) -> Self {
        Self {
            chain: Some(chain.clone()),
            unit: Some(Arc::clone(unit)),
        }
    }
}

/// Runs waterfalls with one resolver and one unit factory.
///
/// Each run marks selected ads in a registry of its own, so concurrent runs
/// never see each other's picks unless [`sharing_requested`] is set.
///
/// [`sharing_requested`]: WaterfallOrchestrator::sharing_requested
#[derive(Clone)]
pub struct WaterfallOrchestrator {
    resolver: ChainResolver,
    units: UnitFactory,
    share_requested: bool,
}

impl WaterfallOrchestrator {
    pub fn new(resolver: ChainResolver, units: UnitFactory) -> Self {
        Self {
            resolver,
            units,
            share_requested: false,
        }
    }

    /// Mark ads in the resolver's own registry instead of a fresh one per
    /// run. Concurrent runs then skip each other's ads.
    pub fn sharing_requested(mut self) -> Self {
        self.share_requested = true;
        self
    }

    /// Start a run for `tag` in the background and return its handle.
    pub fn run(
        &self,
        tag: impl Into<String>,
        options: WaterfallOptions,
        hooks: WaterfallHooks,
    ) -> WaterfallHandle {
        let run_id = Uuid::new_v4().to_string();
        let (done, _) = watch::channel(false);
        let resolver = if self.share_requested {
            self.resolver.clone()
        } else {
            self.resolver.clone().with_requested(RequestedAdSet::new())
        };
        let run = Arc::new(Run {
            run_id: run_id.clone(),
            resolver,
            units: self.units.clone(),
            options,
            hooks,
            started_at: Instant::now(),
            cancelled: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            attempts: AtomicU32::new(0),
            unit: Mutex::new(None),
            seen: Mutex::new(Vec::new()),
            done,
        });

        let tag = tag.into();
        let task = tokio::spawn(
            Arc::clone(&run)
                .drive(tag)
                .instrument(obs::run_span(&run_id)),
        );
        WaterfallHandle { run, task }
    }
}

/// Run a single waterfall with its own requested-ad registry.
pub fn run_waterfall(
    tag: impl Into<String>,
    resolver: ChainResolver,
    units: UnitFactory,
    options: WaterfallOptions,
    hooks: WaterfallHooks,
) -> WaterfallHandle {
    WaterfallOrchestrator::new(resolver, units).run(tag, options, hooks)
}

/// Handle to a running waterfall.
pub struct WaterfallHandle {
    run: Arc<Run>,
    task: JoinHandle<()>,
}

impl WaterfallHandle {
    pub fn run_id(&self) -> &str {
        &self.run.run_id
    }

    /// Cancel the run.
    ///
    /// The current unit, started or still starting, is cancelled through its
    /// own protocol and `on_run_finish` fires before this returns. An
    /// outstanding fetch completes in the background and its result is
    /// discarded. After the run finished this does nothing.
    pub async fn cancel(&self) {
        if self.run.finished.load(Ordering::SeqCst) {
            return;
        }
        self.run.cancelled.store(true, Ordering::SeqCst);

        if let Some(unit) = self.run.current_unit() {
            if !unit.is_finished() {
                if let Err(err) = unit.cancel().await {
                    tracing::debug!(event = "run.cancel_unit_failed", error = %err);
                }
            }
        }
        self.run.finish_run();
    }

    pub fn is_finished(&self) -> bool {
        self.run.finished.load(Ordering::SeqCst)
    }

    /// Wait until `on_run_finish` has fired.
    pub async fn finished(&self) {
        let mut done = self.run.done.subscribe();
        let _ = done.wait_for(|finished| *finished).await;
    }

    /// Wait for the attempt loop to end. A started unit may still be
    /// playing afterwards.
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

enum Attempt {
    Started,
    Cancelled,
    /// The container went away before the unit could start.
    Abandoned,
    /// The budget ran out before the unit could be started.
    Expired(ErrorContext),
    Failed(AdRunError, ErrorContext),
}

struct Run {
    run_id: String,
    resolver: ChainResolver,
    units: UnitFactory,
    options: WaterfallOptions,
    hooks: WaterfallHooks,
    started_at: Instant,
    cancelled: AtomicBool,
    finished: AtomicBool,
    attempts: AtomicU32,
    unit: Mutex<Option<Arc<dyn PlaybackUnit>>>,
    seen: Mutex<Vec<Chain>>,
    done: watch::Sender<bool>,
}

impl Run {
    fn deadline(&self) -> Option<Instant> {
        self.options
            .resolve
            .timeout()
            .map(|budget| self.started_at + budget)
    }

    /// Budget left, `Err(Timeout)` once the deadline has passed.
    fn remaining(&self) -> Result<Option<Duration>> {
        match self.deadline() {
            None => Ok(None),
            Some(deadline) => {
                let left = deadline.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    Err(AdRunError::Timeout)
                } else {
                    Ok(Some(left))
                }
            }
        }
    }

    fn resolve_options(&self, budget: Option<Duration>) -> ResolveOptions {
        ResolveOptions {
            timeout_ms: budget.map(|left| u64::try_from(left.as_millis()).unwrap_or(u64::MAX)),
            ..self.options.resolve.clone()
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn current_unit(&self) -> Option<Arc<dyn PlaybackUnit>> {
        self.unit.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    async fn drive(self: Arc<Self>, tag: String) {
        obs::emit_run_started(&self.run_id, &tag);

        let budget = match self.remaining() {
            Ok(budget) => budget,
            Err(err) => return self.fail_run(err, ErrorContext::default()),
        };
        let mut chain = self
            .resolver
            .resolve_chain(&tag, &self.resolve_options(budget), Chain::new())
            .await;

        loop {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            self.seen
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(chain.clone());

            if self.is_cancelled() {
                return self.finish_run();
            }

            match self.attempt(chain.clone()).await {
                Attempt::Started => return,
                Attempt::Cancelled => return self.finish_run(),
                Attempt::Abandoned => {
                    tracing::debug!(event = "run.container_destroyed", attempt);
                    return self.finish_run();
                }
                Attempt::Expired(context) => return self.fail_run(AdRunError::Timeout, context),
                Attempt::Failed(err, context) => {
                    obs::emit_attempt_failed(&self.run_id, attempt, &err);
                    self.report(&err, &context);
                }
            }

            let budget = match self.remaining() {
                Ok(budget) => budget,
                Err(err) => return self.fail_run(err, ErrorContext::chain(&chain)),
            };
            if self.is_cancelled() {
                return self.finish_run();
            }
            match self
                .resolver
                .request_next_ad(&chain, &self.resolve_options(budget))
                .await
            {
                Ok(next) => chain = next,
                Err(err) => return self.fail_run(err, ErrorContext::chain(&chain)),
            }
        }
    }

    async fn attempt(self: &Arc<Self>, chain: Chain) -> Attempt {
        let chain = match &self.hooks.transform_chain {
            Some(transform) => transform(chain),
            None => chain,
        };

        if let Some(head) = chain.head() {
            if head.is_error() {
                let error = head.error.clone().unwrap_or_else(|| {
                    AdError {
                        code: head.error_code,
                        message: "ad chain resolution failed".to_string(),
                    }
                });
                return Attempt::Failed(error.into(), ErrorContext::chain(&chain));
            }
        }
        if let Some(validate) = &self.hooks.validate_chain {
            if let Err(err) = validate(&chain) {
                return Attempt::Failed(err.into(), ErrorContext::chain(&chain));
            }
        }

        let budget = match self.remaining() {
            Ok(budget) => budget,
            Err(_) => return Attempt::Expired(ErrorContext::chain(&chain)),
        };
        if self.is_cancelled() {
            return Attempt::Cancelled;
        }
        if self.units.container().is_destroyed() {
            return Attempt::Abandoned;
        }

        let unit = match self.units.create(chain.clone(), &self.options.unit) {
            Ok(unit) => unit,
            Err(err) => return Attempt::Failed(err, ErrorContext::chain(&chain)),
        };
        let unit = match &self.hooks.transform_unit {
            Some(transform) => transform(unit),
            None => unit,
        };

        let live = Arc::new(AtomicBool::new(false));
        self.wire_unit(&unit, &chain, &live);
        *self.unit.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&unit));

        let outcome = match budget {
            Some(left) => tokio::time::timeout(left, unit.start())
                .await
                .unwrap_or(Err(AdRunError::Timeout)),
            None => unit.start().await,
        };

        if self.is_cancelled() {
            if !unit.is_finished() {
                let _ = unit.cancel().await;
            }
            return Attempt::Cancelled;
        }

        match outcome {
            Err(AdRunError::Timeout) => {
                if !unit.is_finished() {
                    let _ = unit.cancel().await;
                }
                Attempt::Expired(ErrorContext::unit(&chain, &unit))
            }
            Err(err) => {
                if !unit.is_finished() {
                    let _ = unit.cancel().await;
                }
                Attempt::Failed(err, ErrorContext::unit(&chain, &unit))
            }
            Ok(()) if !unit.is_started() => {
                if !unit.is_finished() {
                    let _ = unit.cancel().await;
                }
                if unit.error().is_none() && self.units.container().is_destroyed() {
                    return Attempt::Abandoned;
                }
                let err = unit
                    .error()
                    .map(AdRunError::from)
                    .unwrap_or(AdRunError::StartFailed);
                Attempt::Failed(err, ErrorContext::unit(&chain, &unit))
            }
            Ok(()) => {
                live.store(true, Ordering::SeqCst);
                if let Some(on_ad_start) = &self.hooks.on_ad_start {
                    on_ad_start(Arc::clone(&unit));
                }
                if unit.is_finished() {
                    self.finish_run();
                }
                Attempt::Started
            }
        }
    }

    /// Forward unit errors and completion once the unit is live.
    fn wire_unit(
        self: &Arc<Self>,
        unit: &Arc<dyn PlaybackUnit>,
        chain: &Chain,
        live: &Arc<AtomicBool>,
    ) {
        let weak_unit = Arc::downgrade(unit);
        let run = Arc::downgrade(self);
        let flag = Arc::clone(live);
        let chain = chain.clone();
        unit.on_error(Arc::new(move |error: &AdError| {
            let Some(run) = run.upgrade() else {
                return;
            };
            if !flag.load(Ordering::SeqCst) {
                return;
            }
            let context = ErrorContext {
                chain: Some(chain.clone()),
                unit: weak_unit.upgrade(),
            };
            run.report(&AdRunError::Ad(error.clone()), &context);
        }));

        // Held strongly until the unit finishes so on_run_finish still fires
        // after the handle is dropped.
        let run = Arc::clone(self);
        let flag = Arc::clone(live);
        unit.on_finish(Box::new(move || {
            if flag.load(Ordering::SeqCst) {
                run.finish_run();
            }
        }));
    }

    fn report(&self, err: &AdRunError, context: &ErrorContext) {
        if let Some(on_error) = &self.hooks.on_error {
            on_error(err, context);
        }
    }

    fn fail_run(&self, err: AdRunError, context: ErrorContext) {
        if self.is_cancelled() {
            return self.finish_run();
        }
        obs::emit_attempt_failed(&self.run_id, 0, &err);
        self.report(&err, &context);
        self.finish_run();
    }

    /// Release every chain fetched so far from the registry.
    fn release_seen(&self) {
        let seen = std::mem::take(&mut *self.seen.lock().unwrap_or_else(|e| e.into_inner()));
        for chain in &seen {
            self.resolver.requested().release_chain(chain);
        }
    }

    /// Idempotent, apart from releasing chains fetched after a cancel.
    fn finish_run(&self) {
        self.release_seen();
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }

        let started = self.current_unit().is_some_and(|unit| unit.is_started());
        let elapsed = u64::try_from(self.started_at.elapsed().as_millis()).unwrap_or(u64::MAX);
        METRICS.inc_runs_finished();
        let attempts = self.attempts.load(Ordering::SeqCst);
        obs::emit_run_finished(&self.run_id, elapsed, attempts, started);

        if let Some(on_run_finish) = &self.hooks.on_run_finish {
            on_run_finish();
        }
        self.done.send_replace(true);
    }
}
