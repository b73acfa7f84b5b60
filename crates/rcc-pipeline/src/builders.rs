//! Emulated build: run the sysroot image against the ROS workspace.

use async_trait::async_trait;
use rcc_core::{PlatformDescriptor, RunSpec};
use tracing::info;

use crate::error::{PipelineError, PipelineResult};
use crate::stage::{Stage, StageContext};

/// Where the sysroot image expects the ROS workspace.
pub const ROS_WORKSPACE_MOUNT: &str = "/ros_ws";

/// Host uid the container chowns its build output to.
pub const OWNER_USER_ENV: &str = "OWNER_USER";

/// Runs the cross-compilation inside the sysroot image under CPU emulation.
///
/// The workspace is a bind mount, so the container is told the host user's
/// uid to keep build artifacts owned by that user.
#[derive(Debug, Clone, Copy)]
pub struct EmulatedBuild {
    owner_uid: u32,
}

impl EmulatedBuild {
    pub const NAME: &'static str = "emulated_build";

    pub fn new(owner_uid: u32) -> Self {
        Self { owner_uid }
    }

    pub fn owner_uid(&self) -> u32 {
        self.owner_uid
    }

    pub fn run_spec(&self, ctx: &StageContext<'_>) -> RunSpec {
        RunSpec::new(ctx.platform.sysroot_image_tag())
            .env(OWNER_USER_ENV, self.owner_uid.to_string())
            .volume(ctx.workspace.ros_workspace(), ROS_WORKSPACE_MOUNT)
    }
}

#[async_trait]
impl Stage for EmulatedBuild {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn image(&self, platform: &PlatformDescriptor) -> String {
        platform.sysroot_image_tag()
    }

    async fn run(&self, ctx: &StageContext<'_>) -> PipelineResult<()> {
        let spec = self.run_spec(ctx);
        info!("Running emulated build in {}", spec.image);
        ctx.engine
            .run_container(&spec)
            .await
            .map_err(|e| PipelineError::stage(Self::NAME, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::WorkspaceLayout;
    use rcc_core::fakes::{EngineCall, FakeEngine};
    use rcc_core::EngineError;
    use std::path::PathBuf;

    const SYSROOT_TAG: &str = "rcc/ros_cross_compile:armhf-debian-buster";

    fn platform() -> PlatformDescriptor {
        PlatformDescriptor::new("armhf", "debian", "buster", "dashing", None).unwrap()
    }

    #[tokio::test]
    async fn test_runs_sysroot_image_as_owner() {
        let engine = FakeEngine::default().with_image(SYSROOT_TAG);
        let platform = platform();
        let layout = WorkspaceLayout::new("/cc", "my_ws", "/docker");
        let ctx = StageContext::new(&platform, &layout, &engine);

        EmulatedBuild::new(1000).run(&ctx).await.unwrap();

        match engine.calls().as_slice() {
            [EngineCall::Run(spec)] => {
                assert_eq!(spec.image, SYSROOT_TAG);
                assert_eq!(spec.environment["OWNER_USER"], "1000");
                assert_eq!(spec.volumes[&PathBuf::from("/cc/my_ws")], "/ros_ws");
            }
            other => panic!("unexpected calls: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_nonzero_exit_fails_stage() {
        let engine = FakeEngine::default()
            .with_image(SYSROOT_TAG)
            .fail_run(SYSROOT_TAG, 2);
        let platform = platform();
        let layout = WorkspaceLayout::new("/cc", "ros_ws", "/docker");
        let ctx = StageContext::new(&platform, &layout, &engine);

        let err = EmulatedBuild::new(1000).run(&ctx).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Stage {
                stage: "emulated_build",
                source: EngineError::RunFailure { exit_code: 2, .. },
            }
        ));
    }
}
