//! Simulation loop runner with operator controls.
//!
//! [`run_simulation`] drives a [`CascadeEngine`] in real time:
//!
//! - **Bounded simulation**: stop after `max_ticks` or `max_real_time_seconds`
//! - **Pause/resume**: the operator can halt and continue the loop
//! - **Variable tick speed**: interval adjustable at runtime
//! - **Interventions**: queued requests are applied between ticks
//! - **Clean shutdown**: operator stop ends the loop before the next tick
//!
//! Each committed snapshot goes to the history sink. A tick error ends the
//! run; the engine keeps its last committed state.

use std::sync::Arc;

use cascade_types::Snapshot;
use tracing::{info, warn};

use crate::engine::{CascadeEngine, TickError};
use crate::history::HistorySink;
use crate::operator::{OperatorState, SimulationEndReason};
use crate::signal::SignalSource;

/// Errors that can occur during the simulation run.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// A tick execution failed.
    #[error("tick error: {source}")]
    Tick {
        /// The underlying tick error.
        #[from]
        source: TickError,
    },
}

/// Result of the simulation run.
#[derive(Debug)]
pub struct SimulationResult {
    /// The reason the simulation ended.
    pub end_reason: SimulationEndReason,
    /// The last committed snapshot.
    pub final_snapshot: Snapshot,
    /// Number of ticks executed by this run.
    pub total_ticks: u64,
}

/// Run the simulation loop until a termination condition is met.
///
/// # Errors
///
/// Returns [`RunnerError`] if a tick fails. Interventions on unknown
/// modules are logged and skipped rather than ending the run.
pub async fn run_simulation(
    engine: &mut CascadeEngine,
    signals: &mut dyn SignalSource,
    history: &mut dyn HistorySink,
    operator: &Arc<OperatorState>,
    dt: f64,
) -> Result<SimulationResult, RunnerError> {
    let mut total_ticks: u64 = 0;

    info!(
        dt,
        max_ticks = operator.max_ticks(),
        max_real_time_seconds = operator.max_real_time_seconds(),
        tick_interval_ms = operator.tick_interval_ms(),
        "Simulation starting"
    );
    history.record(engine.snapshot());

    loop {
        if operator.is_paused() && !operator.is_stop_requested() {
            info!("Simulation paused, waiting for resume...");
            operator.wait_if_paused().await;
            info!("Simulation resumed");
        }

        if let Some(reason) = stop_reason(operator) {
            operator.set_end_reason(reason).await;
            return Ok(SimulationResult {
                end_reason: reason,
                final_snapshot: engine.snapshot().clone(),
                total_ticks,
            });
        }

        for request in operator.drain_interventions().await {
            if let Err(e) = engine.intervene(&request.module, request.kind) {
                warn!(module = %request.module, error = %e, "Intervention skipped");
            }
        }

        let next = engine.current_tick().saturating_add(1);
        let batch = signals.next_signals(next);
        let snapshot = engine.tick(dt, &batch)?;
        total_ticks = total_ticks.saturating_add(1);
        history.record(&snapshot);

        if operator.tick_limit_reached(snapshot.tick) {
            info!(
                tick = snapshot.tick,
                max_ticks = operator.max_ticks(),
                "Tick limit reached"
            );
            let reason = SimulationEndReason::MaxTicksReached;
            operator.set_end_reason(reason).await;
            return Ok(SimulationResult {
                end_reason: reason,
                final_snapshot: snapshot,
                total_ticks,
            });
        }

        let interval_ms = operator.tick_interval_ms();
        if interval_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(interval_ms)).await;
        }
    }
}

fn stop_reason(operator: &OperatorState) -> Option<SimulationEndReason> {
    if operator.is_stop_requested() {
        info!("Operator stop requested");
        return Some(SimulationEndReason::OperatorStop);
    }
    if operator.time_limit_reached() {
        info!(
            max_seconds = operator.max_real_time_seconds(),
            elapsed = operator.elapsed_seconds(),
            "Real-time limit reached"
        );
        return Some(SimulationEndReason::MaxRealTimeReached);
    }
    None
}

/// Log the end of a run.
pub fn log_simulation_end(result: &SimulationResult) {
    let snapshot = &result.final_snapshot;
    info!(
        reason = ?result.end_reason,
        total_ticks = result.total_ticks,
        final_tick = snapshot.tick,
        "Simulation ended"
    );
    if result.total_ticks == 0 {
        warn!("Simulation ended with no ticks executed");
        return;
    }
    let phases: Vec<String> = snapshot
        .phases
        .iter()
        .map(|(domain, phase)| format!("{domain}={}", phase.as_str()))
        .collect();
    info!(
        tick = snapshot.tick,
        erosion_factor = snapshot.erosion_factor,
        max_tension = snapshot.max_tension(),
        phases = %phases.join(","),
        "Final snapshot"
    );
}
