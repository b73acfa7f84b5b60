//! Container engine client.
//!
//! Everything in the pipeline reaches the container engine through the two
//! operations of [`ContainerEngine`]. [`docker::DockerEngine`] talks to a
//! real daemon; [`crate::fakes::FakeEngine`] stands in for it in tests.
//!
//! # Modules
//!
//! - [`context`]: build-context packing (`.dockerignore`, symlinks kept as links)
//! - [`log`]    : `LogEvent`, `LogSink` and the log-processing state machine
//! - [`docker`] : `DockerEngine`, the bollard-backed implementation

pub mod context;
pub mod docker;
pub mod log;

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::EngineResult;

/// Input to [`ContainerEngine::build_image`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSpec {
    /// Build context directory.
    pub context_dir: PathBuf,

    /// Build-definition file name, relative to `context_dir`.
    pub dockerfile: String,

    /// Destination tag.
    pub tag: String,

    /// Build-time arguments.
    pub build_args: BTreeMap<String, String>,
}

impl BuildSpec {
    pub fn new(context_dir: impl Into<PathBuf>, dockerfile: &str, tag: impl Into<String>) -> Self {
        Self {
            context_dir: context_dir.into(),
            dockerfile: dockerfile.to_string(),
            tag: tag.into(),
            build_args: BTreeMap::new(),
        }
    }

    pub fn build_arg(mut self, key: &str, value: impl Into<String>) -> Self {
        self.build_args.insert(key.to_string(), value.into());
        self
    }
}

/// Input to [`ContainerEngine::run_container`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSpec {
    /// Image to run.
    pub image: String,

    /// Runtime environment variables.
    pub environment: BTreeMap<String, String>,

    /// Host absolute path -> in-container mount path. Always bound read-write.
    pub volumes: BTreeMap<PathBuf, String>,
}

impl RunSpec {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            environment: BTreeMap::new(),
            volumes: BTreeMap::new(),
        }
    }

    pub fn env(mut self, key: &str, value: impl Into<String>) -> Self {
        self.environment.insert(key.to_string(), value.into());
        self
    }

    pub fn volume(mut self, host: impl Into<PathBuf>, container: &str) -> Self {
        self.volumes.insert(host.into(), container.to_string());
        self
    }

    /// `KEY=VALUE` entries in key order.
    pub fn env_list(&self) -> Vec<String> {
        self.environment
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect()
    }

    /// `host:container:rw` bind entries in host-path order.
    pub fn bind_list(&self) -> Vec<String> {
        self.volumes
            .iter()
            .map(|(host, dest)| format!("{}:{}:rw", host.display(), dest))
            .collect()
    }
}

/// The two operations the pipeline needs from a container engine.
///
/// Both block (asynchronously) until the engine's log stream is exhausted,
/// forwarding output to the client's log sink in the order it was emitted.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Build an image. Fails with `EngineError::Build` as soon as the build log
    /// carries an error chunk.
    async fn build_image(&self, spec: &BuildSpec) -> EngineResult<()>;

    /// Run a container to completion. Fails with `EngineError::RunFailure` if
    /// the container exits non-zero.
    async fn run_container(&self, spec: &RunSpec) -> EngineResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_spec_args() {
        let spec = BuildSpec::new("/tmp/docker", "rosdep.Dockerfile", "rcc/rosdep:armhf-ubuntu-bionic")
            .build_arg("BASE_IMAGE", "ubuntu:bionic");
        assert_eq!(spec.dockerfile, "rosdep.Dockerfile");
        assert_eq!(spec.build_args.get("BASE_IMAGE").unwrap(), "ubuntu:bionic");
    }

    #[test]
    fn test_run_spec_lists() {
        let spec = RunSpec::new("rcc/ros_cross_compile:armhf-ubuntu-bionic")
            .env("OWNER_USER", "1000")
            .env("ROSDISTRO", "melodic")
            .volume("/home/me/sysroot/ros_ws", "/ros_ws");

        assert_eq!(spec.env_list(), vec!["OWNER_USER=1000", "ROSDISTRO=melodic"]);
        assert_eq!(spec.bind_list(), vec!["/home/me/sysroot/ros_ws:/ros_ws:rw"]);
    }
}
