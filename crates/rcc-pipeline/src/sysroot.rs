//! Sysroot image creation.

use std::fs;
use std::os::unix::fs::symlink;
use std::path::Path;

use async_trait::async_trait;
use rcc_core::{BuildSpec, PlatformDescriptor};
use tracing::{debug, info};

use crate::error::{PipelineError, PipelineResult};
use crate::stage::{Stage, StageContext};
use crate::workspace::{WorkspaceLayout, SYSROOT_DIR_NAME};

/// Build-definition file of the sysroot image, inside the docker directory.
pub const WORKSPACE_DOCKERFILE: &str = "Dockerfile_workspace";

/// Staged name of the user's setup script.
pub const CUSTOM_SETUP_NAME: &str = "user-custom-setup";

/// Staged name of the user's data directory.
pub const CUSTOM_DATA_NAME: &str = "user-custom-data";

const NOOP_SETUP_SCRIPT: &str = "#!/bin/bash\necho \"No custom setup\"\n";

/// Builds the workspace image containing the gathered dependencies and the
/// target toolchain.
#[derive(Debug, Default, Clone, Copy)]
pub struct CreateSysroot;

impl CreateSysroot {
    pub const NAME: &'static str = "create_sysroot";

    pub fn build_spec(ctx: &StageContext<'_>) -> BuildSpec {
        BuildSpec::new(
            ctx.workspace.root(),
            &format!("{SYSROOT_DIR_NAME}/{WORKSPACE_DOCKERFILE}"),
            ctx.platform.sysroot_image_tag(),
        )
        .build_arg("BASE_IMAGE", ctx.platform.target_base_image())
        .build_arg("ROS_WORKSPACE", ctx.workspace.ros_workspace_name())
        .build_arg("ROS_VERSION", ctx.platform.ros_version().as_str())
        .build_arg("ROS_DISTRO", ctx.platform.ros_distro().as_str())
    }
}

/// Copy the Dockerfile and user-supplied inputs into `<root>/sysroot/`.
///
/// Absent custom inputs are replaced by a no-op script and an empty directory
/// so the Dockerfile can copy them unconditionally.
pub fn stage_sysroot_inputs(layout: &WorkspaceLayout) -> PipelineResult<()> {
    let sysroot = layout.sysroot_dir();
    fs::create_dir_all(&sysroot).map_err(|e| PipelineError::io(&sysroot, e))?;

    let dockerfile = layout.docker_dir().join(WORKSPACE_DOCKERFILE);
    fs::copy(&dockerfile, sysroot.join(WORKSPACE_DOCKERFILE))
        .map_err(|e| PipelineError::io(&dockerfile, e))?;

    let setup_dest = sysroot.join(CUSTOM_SETUP_NAME);
    match layout.custom_setup_script() {
        Some(script) => {
            debug!(script = %script.display(), "Staging custom setup script");
            fs::copy(script, &setup_dest).map_err(|e| PipelineError::io(script, e))?;
        }
        None => fs::write(&setup_dest, NOOP_SETUP_SCRIPT)
            .map_err(|e| PipelineError::io(&setup_dest, e))?,
    }

    let data_dest = sysroot.join(CUSTOM_DATA_NAME);
    if data_dest.exists() {
        fs::remove_dir_all(&data_dest).map_err(|e| PipelineError::io(&data_dest, e))?;
    }
    match layout.custom_data_dir() {
        Some(data) => {
            debug!(data = %data.display(), "Staging custom data directory");
            copy_dir_all(data, &data_dest)?;
        }
        None => fs::create_dir_all(&data_dest).map_err(|e| PipelineError::io(&data_dest, e))?,
    }

    Ok(())
}

/// Recursive copy that recreates symlinks instead of following them, so a
/// dangling link or a link cycle in the data directory is carried over as is.
fn copy_dir_all(src: &Path, dest: &Path) -> PipelineResult<()> {
    fs::create_dir_all(dest).map_err(|e| PipelineError::io(dest, e))?;
    let entries = fs::read_dir(src).map_err(|e| PipelineError::io(src, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| PipelineError::io(src, e))?;
        let from = entry.path();
        let to = dest.join(entry.file_name());
        let file_type = entry.file_type().map_err(|e| PipelineError::io(&from, e))?;

        if file_type.is_symlink() {
            let target = fs::read_link(&from).map_err(|e| PipelineError::io(&from, e))?;
            symlink(&target, &to).map_err(|e| PipelineError::io(&to, e))?;
        } else if file_type.is_dir() {
            copy_dir_all(&from, &to)?;
        } else {
            fs::copy(&from, &to).map_err(|e| PipelineError::io(&from, e))?;
        }
    }
    Ok(())
}

#[async_trait]
impl Stage for CreateSysroot {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn image(&self, platform: &PlatformDescriptor) -> String {
        platform.sysroot_image_tag()
    }

    async fn run(&self, ctx: &StageContext<'_>) -> PipelineResult<()> {
        stage_sysroot_inputs(ctx.workspace)?;

        let build = Self::build_spec(ctx);
        info!("Building sysroot image: {}", build.tag);
        ctx.engine
            .build_image(&build)
            .await
            .map_err(|e| PipelineError::stage(Self::NAME, e))?;
        info!("Successfully created sysroot image: {}", build.tag);
        Ok(())
    }
}
