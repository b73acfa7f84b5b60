//! Structured lifecycle events for a cross-compile run.
//!
//! Every event carries an `event` field so log pipelines can filter on it;
//! engine output itself goes through the [`LogSink`](crate::engine::log::LogSink)
//! instead.

use tracing::{info, warn};

/// Span tagging every event of one pipeline run.
///
/// Attach it to the run's future with `tracing::Instrument` rather than
/// entering it, since the run crosses await points.
pub fn run_span(run_id: &str, platform: &str) -> tracing::Span {
    tracing::info_span!("rcc.run", run_id = %run_id, platform = %platform)
}

pub fn emit_pipeline_started(run_id: &str, stages: &[&str]) {
    info!(event = "pipeline.started", run_id = %run_id, stages = ?stages);
}

pub fn emit_pipeline_finished(run_id: &str, duration_ms: u64, success: bool) {
    info!(
        event = "pipeline.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        success = success,
    );
}

pub fn emit_stage_started(stage: &str) {
    info!(event = "stage.started", stage = %stage);
}

pub fn emit_stage_skipped(stage: &str, reason: &str) {
    info!(event = "stage.skipped", stage = %stage, reason = %reason);
}

pub fn emit_stage_finished(stage: &str, duration_ms: u64) {
    info!(event = "stage.finished", stage = %stage, duration_ms = duration_ms);
}

/// Stage failures are warnings here; the binary reports the final error.
pub fn emit_stage_failed(stage: &str, error: &dyn std::fmt::Display) {
    warn!(event = "stage.failed", stage = %stage, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emitters_do_not_panic() {
        let _span = run_span("run-1", "armhf-ubuntu-bionic-melodic").entered();
        emit_pipeline_started("run-1", &["gather_rosdeps", "create_sysroot"]);
        emit_stage_started("gather_rosdeps");
        emit_stage_skipped("gather_rosdeps", "--skip-rosdep");
        emit_stage_finished("create_sysroot", 12);
        emit_stage_failed("emulated_build", &"exit code 2");
        emit_pipeline_finished("run-1", 20, false);
    }
}
