//! Host-side directory layout of a cross-compile run.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::warn;

use crate::error::{PipelineError, PipelineResult};

/// Directory, under the sysroot root, where sysroot build inputs are staged.
pub const SYSROOT_DIR_NAME: &str = "sysroot";

/// Directory, under the sysroot root, holding the qemu static binaries.
pub const QEMU_DIR_NAME: &str = "qemu-user-static";

/// Paths every stage works against.
///
/// ```text
/// <root>/
///   <ros_workspace>/src/...     user sources, bind-mounted into containers
///   qemu-user-static/           emulators copied into the sysroot image
///   sysroot/                    staged Dockerfile, setup script, custom data
/// ```
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WorkspaceLayout {
    root: PathBuf,
    ros_workspace_name: String,
    docker_dir: PathBuf,
    custom_setup_script: Option<PathBuf>,
    custom_data_dir: Option<PathBuf>,
}

impl WorkspaceLayout {
    pub fn new(root: impl Into<PathBuf>, ros_workspace_name: &str, docker_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ros_workspace_name: ros_workspace_name.to_string(),
            docker_dir: docker_dir.into(),
            custom_setup_script: None,
            custom_data_dir: None,
        }
    }

    pub fn with_custom_setup_script(mut self, script: Option<PathBuf>) -> Self {
        self.custom_setup_script = script;
        self
    }

    pub fn with_custom_data_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.custom_data_dir = dir;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ros_workspace_name(&self) -> &str {
        &self.ros_workspace_name
    }

    /// Absolute path of the ROS workspace.
    pub fn ros_workspace(&self) -> PathBuf {
        self.root.join(&self.ros_workspace_name)
    }

    /// Staging directory for sysroot build inputs.
    pub fn sysroot_dir(&self) -> PathBuf {
        self.root.join(SYSROOT_DIR_NAME)
    }

    /// Directory holding the versioned build-definition files.
    pub fn docker_dir(&self) -> &Path {
        &self.docker_dir
    }

    pub fn custom_setup_script(&self) -> Option<&Path> {
        self.custom_setup_script.as_deref()
    }

    pub fn custom_data_dir(&self) -> Option<&Path> {
        self.custom_data_dir.as_deref()
    }

    /// Check the layout before any container work starts.
    ///
    /// A missing ROS workspace, docker directory or custom input is fatal.
    /// A missing `src/` or qemu directory only warns: the build may still be
    /// driven by content the user staged some other way.
    pub fn validate(&self) -> PipelineResult<()> {
        if !self.root.is_absolute() {
            return Err(PipelineError::Workspace {
                path: self.root.clone(),
                reason: "sysroot path must be absolute".to_string(),
            });
        }

        let ros_ws = self.ros_workspace();
        if !ros_ws.is_dir() {
            return Err(PipelineError::Workspace {
                path: ros_ws,
                reason: "ROS workspace directory does not exist".to_string(),
            });
        }
        if !self.docker_dir.is_dir() {
            return Err(PipelineError::Workspace {
                path: self.docker_dir.clone(),
                reason: "docker directory does not exist".to_string(),
            });
        }
        if let Some(script) = &self.custom_setup_script {
            if !script.is_file() {
                return Err(PipelineError::Workspace {
                    path: script.clone(),
                    reason: "custom setup script is not a file".to_string(),
                });
            }
        }
        if let Some(dir) = &self.custom_data_dir {
            if !dir.is_dir() {
                return Err(PipelineError::Workspace {
                    path: dir.clone(),
                    reason: "custom data directory is not a directory".to_string(),
                });
            }
        }

        if !ros_ws.join("src").is_dir() {
            warn!(path = %ros_ws.display(), "ROS workspace has no src/ directory");
        }
        if !self.root.join(QEMU_DIR_NAME).is_dir() {
            warn!(path = %self.root.display(), "No {} directory found; emulated build may fail", QEMU_DIR_NAME);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_paths() {
        let layout = WorkspaceLayout::new("/home/dev/cc_root", "ros_ws", "/opt/rcc/docker");
        assert_eq!(layout.ros_workspace(), PathBuf::from("/home/dev/cc_root/ros_ws"));
        assert_eq!(layout.sysroot_dir(), PathBuf::from("/home/dev/cc_root/sysroot"));
        assert!(layout.custom_setup_script().is_none());
    }

    #[test]
    fn test_validate_requires_ros_workspace() {
        let root = tempfile::tempdir().unwrap();
        let layout = WorkspaceLayout::new(root.path(), "ros_ws", root.path());
        let err = layout.validate().unwrap_err();
        assert!(err.to_string().contains("ROS workspace directory does not exist"));

        std::fs::create_dir_all(root.path().join("ros_ws/src")).unwrap();
        layout.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_relative_root() {
        let layout = WorkspaceLayout::new("relative/root", "ros_ws", "/tmp");
        assert!(matches!(
            layout.validate(),
            Err(PipelineError::Workspace { .. })
        ));
    }

    #[test]
    fn test_validate_custom_inputs() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("ros_ws")).unwrap();

        let layout = WorkspaceLayout::new(root.path(), "ros_ws", root.path())
            .with_custom_setup_script(Some(root.path().join("missing.sh")));
        assert!(layout.validate().is_err());

        let layout = WorkspaceLayout::new(root.path(), "ros_ws", root.path())
            .with_custom_data_dir(Some(root.path().join("ros_ws")));
        layout.validate().unwrap();
    }
}
