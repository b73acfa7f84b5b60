//! The common stage capability.

use async_trait::async_trait;
use rcc_core::{ContainerEngine, PlatformDescriptor};

use crate::error::PipelineResult;
use crate::workspace::WorkspaceLayout;

/// Everything a stage may read while it runs.
#[derive(Clone, Copy)]
pub struct StageContext<'a> {
    pub platform: &'a PlatformDescriptor,
    pub workspace: &'a WorkspaceLayout,
    pub engine: &'a dyn ContainerEngine,
}

impl<'a> StageContext<'a> {
    pub fn new(
        platform: &'a PlatformDescriptor,
        workspace: &'a WorkspaceLayout,
        engine: &'a dyn ContainerEngine,
    ) -> Self {
        Self {
            platform,
            workspace,
            engine,
        }
    }
}

/// One step of the cross-compile pipeline.
///
/// Stages are stateless: the result depends only on the context they are
/// given, which lets them run against a fake engine in isolation.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Stable snake_case name used in logs and reports.
    fn name(&self) -> &'static str;

    /// The image this stage builds or runs.
    fn image(&self, platform: &PlatformDescriptor) -> String;

    async fn run(&self, ctx: &StageContext<'_>) -> PipelineResult<()>;
}
