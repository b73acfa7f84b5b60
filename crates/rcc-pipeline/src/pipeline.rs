//! Pipeline orchestration.

use std::time::Instant;

use chrono::{DateTime, Utc};
use rcc_core::obs;
use rcc_core::{ContainerEngine, PlatformDescriptor};
use serde::Serialize;
use tracing::{info, Instrument};
use uuid::Uuid;

use crate::builders::EmulatedBuild;
use crate::dependencies::GatherRosdeps;
use crate::error::PipelineResult;
use crate::stage::{Stage, StageContext};
use crate::sysroot::CreateSysroot;
use crate::workspace::WorkspaceLayout;

/// Outcome of one stage in a completed run.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StageOutcome {
    /// Stage name.
    pub stage_name: String,

    /// Image built or run; absent for skipped stages.
    pub image: Option<String>,

    /// Whether the stage was skipped.
    pub skipped: bool,

    /// Duration in milliseconds.
    pub duration_ms: u64,
}

/// Result of a pipeline run in which every enabled stage succeeded.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    /// Per-invocation id, also attached to every log line of the run.
    pub run_id: String,

    /// Wall-clock start of the run.
    pub started_at: DateTime<Utc>,

    /// Target platform, `<arch>-<os>-<os_distro>-<ros_distro>`.
    pub platform: String,

    /// Outcomes of individual stages, in execution order.
    pub stages: Vec<StageOutcome>,

    /// Total duration in milliseconds.
    pub duration_ms: u64,
}

impl PipelineReport {
    /// Number of stages that ran.
    pub fn executed_count(&self) -> usize {
        self.stages.iter().filter(|s| !s.skipped).count()
    }

    /// Number of stages that were skipped.
    pub fn skipped_count(&self) -> usize {
        self.stages.iter().filter(|s| s.skipped).count()
    }
}

/// Which stages a standard pipeline runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineOptions {
    /// Reuse dependency results from a previous run.
    pub skip_rosdep: bool,

    /// Host uid passed to the emulated build.
    pub owner_uid: u32,
}

impl PipelineOptions {
    /// Options whose emulated build hands output to the invoking user.
    pub fn for_current_user(skip_rosdep: bool) -> Self {
        Self {
            skip_rosdep,
            owner_uid: nix::unistd::getuid().as_raw(),
        }
    }
}

struct PipelineStage {
    stage: Box<dyn Stage>,
    skip_reason: Option<&'static str>,
}

/// Ordered list of stages run strictly one after another.
///
/// The first failing stage aborts the run. Images built by earlier stages
/// stay in the local image store so a re-run can pick up where this one
/// stopped.
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<PipelineStage>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// gather_rosdeps -> create_sysroot -> emulated_build
    pub fn standard(options: PipelineOptions) -> Self {
        let pipeline = Self::new();
        let pipeline = if options.skip_rosdep {
            pipeline.skipped(GatherRosdeps, "--skip-rosdep")
        } else {
            pipeline.stage(GatherRosdeps)
        };
        pipeline
            .stage(CreateSysroot)
            .stage(EmulatedBuild::new(options.owner_uid))
    }

    /// Append a stage.
    pub fn stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(PipelineStage {
            stage: Box::new(stage),
            skip_reason: None,
        });
        self
    }

    /// Append a stage that is reported but never executed.
    pub fn skipped(mut self, stage: impl Stage + 'static, reason: &'static str) -> Self {
        self.stages.push(PipelineStage {
            stage: Box::new(stage),
            skip_reason: Some(reason),
        });
        self
    }

    /// Stage names in execution order, including skipped ones.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.stage.name()).collect()
    }

    /// Run every enabled stage in order, stopping at the first error.
    pub async fn run(
        &self,
        platform: &PlatformDescriptor,
        workspace: &WorkspaceLayout,
        engine: &dyn ContainerEngine,
    ) -> PipelineResult<PipelineReport> {
        let run_id = Uuid::new_v4().to_string();
        let span = obs::run_span(&run_id, &platform.to_string());
        self.run_stages(run_id, platform, workspace, engine)
            .instrument(span)
            .await
    }

    async fn run_stages(
        &self,
        run_id: String,
        platform: &PlatformDescriptor,
        workspace: &WorkspaceLayout,
        engine: &dyn ContainerEngine,
    ) -> PipelineResult<PipelineReport> {
        let started_at = Utc::now();
        let start = Instant::now();

        obs::emit_pipeline_started(&run_id, &self.stage_names());

        let ctx = StageContext::new(platform, workspace, engine);
        let mut outcomes = Vec::with_capacity(self.stages.len());

        for entry in &self.stages {
            let name = entry.stage.name();

            if let Some(reason) = entry.skip_reason {
                obs::emit_stage_skipped(name, reason);
                outcomes.push(StageOutcome {
                    stage_name: name.to_string(),
                    image: None,
                    skipped: true,
                    duration_ms: 0,
                });
                continue;
            }

            obs::emit_stage_started(name);
            let stage_start = Instant::now();

            if let Err(err) = entry.stage.run(&ctx).await {
                obs::emit_stage_failed(name, &err);
                obs::emit_pipeline_finished(&run_id, start.elapsed().as_millis() as u64, false);
                return Err(err);
            }

            let duration_ms = stage_start.elapsed().as_millis() as u64;
            obs::emit_stage_finished(name, duration_ms);
            outcomes.push(StageOutcome {
                stage_name: name.to_string(),
                image: Some(entry.stage.image(platform)),
                skipped: false,
                duration_ms,
            });
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        obs::emit_pipeline_finished(&run_id, duration_ms, true);
        info!(run_id = %run_id, "Cross-compile pipeline completed successfully");

        Ok(PipelineReport {
            run_id,
            started_at,
            platform: platform.to_string(),
            stages: outcomes,
            duration_ms,
        })
    }
}
