//! The Observe → Reason → Act scheduler
//!
//! One background task per loop instance; at most one tick runs at a time,
//! guaranteed by the loop's own control flow rather than locking. Shutdown
//! is cooperative: the in-flight tick is cancelled at its next await point
//! and the state machine lands in `Idle` before `stop()` returns.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::context::{ContextBuffer, Snapshot};
use crate::diagnostics::DiagnosticRunner;
use crate::error::{ProviderError, QueryError};
use crate::models::diagnostics::OverallHealth;
use crate::observability::EngineMetrics;
use crate::reasoning::plan::{ActionPlan, LoopPhase, LoopStatus, Observation, Reasoning};
use crate::topology::TopologyBuilder;

/// Configuration for the reasoning loop
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Target time between tick starts (default: 30 seconds)
    pub interval: Duration,
    /// Lookback window for restart-delta analysis (default: 1 hour)
    pub restart_lookback_hours: i64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            restart_lookback_hours: 1,
        }
    }
}

/// Latest tick results plus the current FSM phase.
#[derive(Default)]
struct LoopState {
    phase: Option<LoopPhase>,
    last_observation: Option<Observation>,
    last_reasoning: Option<Reasoning>,
    last_action_plan: Option<ActionPlan>,
}

impl LoopState {
    fn phase(&self) -> LoopPhase {
        self.phase.unwrap_or(LoopPhase::Idle)
    }
}

/// Everything a tick needs, shared between the loop task and query callers.
struct TickContext {
    builder: TopologyBuilder,
    runner: DiagnosticRunner,
    buffer: Arc<Mutex<ContextBuffer>>,
    state: Arc<RwLock<LoopState>>,
    config: LoopConfig,
    metrics: EngineMetrics,
}

impl TickContext {
    async fn set_phase(&self, phase: LoopPhase) {
        self.state.write().await.phase = Some(phase);
    }
}

/// Handle to the running background task.
struct RunHandle {
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

/// The Observe → Reason → Act state machine and its background task.
pub struct ReasoningLoop {
    ctx: Arc<TickContext>,
    handle: Mutex<Option<RunHandle>>,
}

impl ReasoningLoop {
    pub fn new(
        builder: TopologyBuilder,
        runner: DiagnosticRunner,
        buffer: Arc<Mutex<ContextBuffer>>,
        config: LoopConfig,
    ) -> Self {
        Self {
            ctx: Arc::new(TickContext {
                builder,
                runner,
                buffer,
                state: Arc::new(RwLock::new(LoopState::default())),
                config,
                metrics: EngineMetrics::new(),
            }),
            handle: Mutex::new(None),
        }
    }

    /// Start the background task. A second call while running is a logged
    /// no-op, never an error.
    pub async fn start(&self) {
        let mut handle = self.handle.lock().await;

        if let Some(existing) = handle.as_ref() {
            if !existing.task.is_finished() {
                info!("Reasoning loop already running, start ignored");
                return;
            }
        }

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let ctx = Arc::clone(&self.ctx);
        let task = tokio::spawn(run(ctx, shutdown_rx));

        *handle = Some(RunHandle { shutdown_tx, task });
        self.ctx.metrics.set_loop_running(true);
        info!(
            interval_secs = self.ctx.config.interval.as_secs(),
            "Reasoning loop started"
        );
    }

    /// Signal shutdown and await the task. After this returns no further
    /// phase transitions occur and the state machine is `Idle`.
    pub async fn stop(&self) {
        let taken = self.handle.lock().await.take();

        let Some(RunHandle { shutdown_tx, task }) = taken else {
            debug!("Reasoning loop not running, stop ignored");
            return;
        };

        // The task may already have exited; a dropped receiver is fine.
        let _ = shutdown_tx.send(());

        if let Err(e) = task.await {
            warn!(error = %e, "Reasoning loop task ended abnormally");
        }

        self.ctx.state.write().await.phase = Some(LoopPhase::Idle);
        self.ctx.metrics.set_loop_running(false);
        info!("Reasoning loop stopped");
    }

    pub async fn status(&self) -> LoopStatus {
        let running = self
            .handle
            .lock()
            .await
            .as_ref()
            .map(|h| !h.task.is_finished())
            .unwrap_or(false);

        let state = self.ctx.state.read().await;
        LoopStatus {
            running,
            phase: state.phase(),
            last_observation_time: state.last_observation.as_ref().map(|o| o.timestamp),
            last_reasoning: state.last_reasoning.as_ref().map(Into::into),
            last_action_plan: state.last_action_plan.as_ref().map(Into::into),
        }
    }

    pub async fn last_observation(&self) -> Result<Observation, QueryError> {
        self.ctx
            .state
            .read()
            .await
            .last_observation
            .clone()
            .ok_or(QueryError::NotFound)
    }

    pub async fn last_reasoning(&self) -> Result<Reasoning, QueryError> {
        self.ctx
            .state
            .read()
            .await
            .last_reasoning
            .clone()
            .ok_or(QueryError::NotFound)
    }

    pub async fn last_action_plan(&self) -> Result<ActionPlan, QueryError> {
        self.ctx
            .state
            .read()
            .await
            .last_action_plan
            .clone()
            .ok_or(QueryError::NotFound)
    }

    /// Run a single tick inline, outside the background task. Used by the
    /// serving layer for on-demand topology and diagnostics queries.
    pub async fn tick_once(&self) -> Result<OverallHealth, ProviderError> {
        tick(&self.ctx).await
    }
}

async fn run(ctx: Arc<TickContext>, mut shutdown: broadcast::Receiver<()>) {
    loop {
        let started = Instant::now();

        tokio::select! {
            _ = shutdown.recv() => {
                ctx.set_phase(LoopPhase::Idle).await;
                info!("Shutting down reasoning loop");
                break;
            }
            result = tick(&ctx) => {
                let elapsed = started.elapsed();

                let sleep_for = match result {
                    Ok(health) => {
                        ctx.metrics.inc_ticks();
                        info!(
                            event = "reasoning_cycle_complete",
                            duration_ms = elapsed.as_millis() as u64,
                            overall_health = ?health,
                            "Reasoning cycle complete"
                        );
                        // Slow ticks never stack: the sleep shrinks to zero
                        // rather than going negative.
                        ctx.config.interval.saturating_sub(elapsed)
                    }
                    Err(e) => {
                        ctx.metrics.inc_tick_errors();
                        warn!(
                            event = "reasoning_cycle_failed",
                            error = %e,
                            resource = e.resource(),
                            duration_ms = elapsed.as_millis() as u64,
                            "Reasoning tick failed, backing off a full interval"
                        );
                        ctx.config.interval
                    }
                };

                ctx.set_phase(LoopPhase::Idle).await;

                tokio::select! {
                    _ = shutdown.recv() => {
                        ctx.set_phase(LoopPhase::Idle).await;
                        info!("Shutting down reasoning loop");
                        break;
                    }
                    _ = tokio::time::sleep(sleep_for) => {}
                }
            }
        }
    }
}

/// One Observe → Reason → (Act) cycle. All topology and diagnostic values
/// are created fresh here and immutable once stored.
async fn tick(ctx: &TickContext) -> Result<OverallHealth, ProviderError> {
    ctx.set_phase(LoopPhase::Observing).await;

    let build_start = Instant::now();
    let topology = Arc::new(ctx.builder.build().await?);
    ctx.metrics
        .observe_build_latency(build_start.elapsed().as_secs_f64());

    let observation = Observation::new(Arc::clone(&topology), Vec::new());

    ctx.set_phase(LoopPhase::Reasoning).await;

    let history = {
        let buffer = ctx.buffer.lock().await;
        buffer.restart_deltas(ctx.config.restart_lookback_hours)
    };

    let eval_start = Instant::now();
    let report = ctx.runner.run_all_checks(&topology, &history);
    ctx.metrics
        .observe_evaluation_latency(eval_start.elapsed().as_secs_f64());
    ctx.metrics
        .set_failing_checks((report.summary.fail + report.summary.error) as i64);

    let health = report.overall_health;
    let reasoning = Reasoning::from_report(report);

    let plan = if health != OverallHealth::Pass {
        ctx.set_phase(LoopPhase::Acting).await;
        ActionPlan::from_reasoning(&reasoning)
    } else {
        None
    };

    {
        let mut buffer = ctx.buffer.lock().await;
        buffer.add(Snapshot::new(
            Arc::clone(&topology),
            observation.events.clone(),
        ));
        ctx.metrics.set_buffer_snapshots(buffer.len() as i64);
    }

    let mut state = ctx.state.write().await;
    state.last_observation = Some(observation);
    state.last_reasoning = Some(reasoning);
    // Previous results are discarded, not versioned: a healthy tick clears
    // the plan, so a stale plan is never served for a recovered cluster.
    state.last_action_plan = plan;
    state.phase = Some(LoopPhase::Idle);

    Ok(health)
}
