//! Dependency gathering: build the rosdep collector image and run it against
//! the ROS workspace.

use async_trait::async_trait;
use rcc_core::{BuildSpec, PlatformDescriptor, RunSpec};
use tracing::info;

use crate::error::{PipelineError, PipelineResult};
use crate::stage::{Stage, StageContext};

/// Build-definition file of the collector image, inside the docker directory.
pub const ROSDEP_DOCKERFILE: &str = "rosdep.Dockerfile";

/// Where the collector expects the ROS workspace.
pub const ROSDEP_WORKSPACE_MOUNT: &str = "/root/ws";

/// Environment variable naming the target ROS distribution.
pub const ROSDISTRO_ENV: &str = "ROSDISTRO";

/// Resolves the workspace's rosdep keys for the target platform.
///
/// The collector writes its results back into the mounted workspace; their
/// content is the collector's business, not this stage's.
#[derive(Debug, Default, Clone, Copy)]
pub struct GatherRosdeps;

impl GatherRosdeps {
    pub const NAME: &'static str = "gather_rosdeps";

    pub fn build_spec(ctx: &StageContext<'_>) -> BuildSpec {
        BuildSpec::new(
            ctx.workspace.docker_dir(),
            ROSDEP_DOCKERFILE,
            ctx.platform.rosdep_image_tag(),
        )
        .build_arg("BASE_IMAGE", ctx.platform.native_base_image())
    }

    pub fn run_spec(ctx: &StageContext<'_>) -> RunSpec {
        RunSpec::new(ctx.platform.rosdep_image_tag())
            .env(ROSDISTRO_ENV, ctx.platform.ros_distro().as_str())
            .volume(ctx.workspace.ros_workspace(), ROSDEP_WORKSPACE_MOUNT)
    }
}

#[async_trait]
impl Stage for GatherRosdeps {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn image(&self, platform: &PlatformDescriptor) -> String {
        platform.rosdep_image_tag()
    }

    async fn run(&self, ctx: &StageContext<'_>) -> PipelineResult<()> {
        let build = Self::build_spec(ctx);
        info!("Building rosdep collector image: {}", build.tag);
        ctx.engine
            .build_image(&build)
            .await
            .map_err(|e| PipelineError::stage(Self::NAME, e))?;
        info!("Successfully created rosdep collector image: {}", build.tag);

        info!("Running rosdep collector image on workspace...");
        ctx.engine
            .run_container(&Self::run_spec(ctx))
            .await
            .map_err(|e| PipelineError::stage(Self::NAME, e))
    }
}
