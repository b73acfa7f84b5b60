//! Target platform model: the (arch, os, os distro, ROS distro) tuple and the
//! image names derived from it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PlatformError;

/// Namespace every image built by this tool is tagged under.
pub const IMAGE_NAMESPACE: &str = "rcc";

/// Stage name of the dependency collector image.
pub const ROSDEP_STAGE: &str = "rosdep";

/// Stage name of the workspace sysroot image.
pub const SYSROOT_STAGE: &str = "ros_cross_compile";

/// Supported target CPU architectures.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    Armhf,
    Aarch64,
}

impl Architecture {
    pub const ALL: [Architecture; 2] = [Architecture::Armhf, Architecture::Aarch64];

    pub fn as_str(&self) -> &'static str {
        match self {
            Architecture::Armhf => "armhf",
            Architecture::Aarch64 => "aarch64",
        }
    }

    /// Docker Hub organisation publishing official images for this architecture.
    pub fn docker_base(&self) -> &'static str {
        match self {
            Architecture::Armhf => "arm32v7",
            Architecture::Aarch64 => "arm64v8",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Architecture {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Architecture::ALL
            .into_iter()
            .find(|arch| arch.as_str() == s)
            .ok_or_else(|| PlatformError::UnsupportedArchitecture(s.to_string()))
    }
}

/// ROS 1 distributions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Ros1Distro {
    Kinetic,
    Melodic,
    Noetic,
}

impl Ros1Distro {
    pub const ALL: [Ros1Distro; 3] = [Ros1Distro::Kinetic, Ros1Distro::Melodic, Ros1Distro::Noetic];

    pub fn as_str(&self) -> &'static str {
        match self {
            Ros1Distro::Kinetic => "kinetic",
            Ros1Distro::Melodic => "melodic",
            Ros1Distro::Noetic => "noetic",
        }
    }
}

/// ROS 2 distributions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Ros2Distro {
    Dashing,
    Eloquent,
    Foxy,
}

impl Ros2Distro {
    pub const ALL: [Ros2Distro; 3] = [Ros2Distro::Dashing, Ros2Distro::Eloquent, Ros2Distro::Foxy];

    pub fn as_str(&self) -> &'static str {
        match self {
            Ros2Distro::Dashing => "dashing",
            Ros2Distro::Eloquent => "eloquent",
            Ros2Distro::Foxy => "foxy",
        }
    }
}

/// Major ROS generation a distribution belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RosVersion {
    Ros,
    Ros2,
}

impl RosVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            RosVersion::Ros => "ros",
            RosVersion::Ros2 => "ros2",
        }
    }
}

/// A supported target ROS distribution: the union of the ROS 1 and ROS 2 sets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(into = "String", try_from = "String")]
pub enum RosDistro {
    Ros1(Ros1Distro),
    Ros2(Ros2Distro),
}

impl RosDistro {
    /// Every supported distribution name, ROS 1 first.
    pub fn supported_names() -> Vec<&'static str> {
        Ros1Distro::ALL
            .iter()
            .map(Ros1Distro::as_str)
            .chain(Ros2Distro::ALL.iter().map(Ros2Distro::as_str))
            .collect()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RosDistro::Ros1(d) => d.as_str(),
            RosDistro::Ros2(d) => d.as_str(),
        }
    }

    pub fn version(&self) -> RosVersion {
        match self {
            RosDistro::Ros1(_) => RosVersion::Ros,
            RosDistro::Ros2(_) => RosVersion::Ros2,
        }
    }

    /// Ubuntu release each distribution primarily targets.
    pub fn default_os_distro(&self) -> &'static str {
        match self {
            RosDistro::Ros1(Ros1Distro::Kinetic) => "xenial",
            RosDistro::Ros1(Ros1Distro::Melodic) => "bionic",
            RosDistro::Ros1(Ros1Distro::Noetic) => "focal",
            RosDistro::Ros2(Ros2Distro::Dashing) => "bionic",
            RosDistro::Ros2(Ros2Distro::Eloquent) => "bionic",
            RosDistro::Ros2(Ros2Distro::Foxy) => "focal",
        }
    }
}

impl fmt::Display for RosDistro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RosDistro {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(d) = Ros1Distro::ALL.into_iter().find(|d| d.as_str() == s) {
            return Ok(RosDistro::Ros1(d));
        }
        if let Some(d) = Ros2Distro::ALL.into_iter().find(|d| d.as_str() == s) {
            return Ok(RosDistro::Ros2(d));
        }
        Err(PlatformError::UnsupportedTargetDistribution(s.to_string()))
    }
}

impl From<RosDistro> for String {
    fn from(distro: RosDistro) -> Self {
        distro.as_str().to_string()
    }
}

impl TryFrom<String> for RosDistro {
    type Error = PlatformError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Validated description of the cross-compilation target.
///
/// Immutable once constructed. Every image tag is a pure function of
/// `(arch, os_name, os_distro)` so that later stages can locate images built
/// by earlier ones without passing tags around.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PlatformDescriptor {
    arch: Architecture,
    os_name: String,
    os_distro: String,
    ros_distro: RosDistro,
    base_image_override: Option<String>,
}

impl PlatformDescriptor {
    /// Resolve raw user input into a descriptor.
    ///
    /// Fails with `UnsupportedArchitecture` or `UnsupportedTargetDistribution`
    /// before anything touches the container engine.
    pub fn new(
        arch: &str,
        os_name: &str,
        os_distro: &str,
        ros_distro: &str,
        base_image_override: Option<String>,
    ) -> Result<Self, PlatformError> {
        let arch: Architecture = arch.parse()?;
        let ros_distro: RosDistro = ros_distro.parse()?;

        if os_name.trim().is_empty() {
            return Err(PlatformError::EmptyField("os_name"));
        }
        if os_distro.trim().is_empty() {
            return Err(PlatformError::EmptyField("os_distro"));
        }

        Ok(Self {
            arch,
            os_name: os_name.to_string(),
            os_distro: os_distro.to_string(),
            ros_distro,
            base_image_override: base_image_override.filter(|image| !image.trim().is_empty()),
        })
    }

    pub fn arch(&self) -> Architecture {
        self.arch
    }

    pub fn os_name(&self) -> &str {
        &self.os_name
    }

    pub fn os_distro(&self) -> &str {
        &self.os_distro
    }

    pub fn ros_distro(&self) -> RosDistro {
        self.ros_distro
    }

    pub fn ros_version(&self) -> RosVersion {
        self.ros_distro.version()
    }

    /// Image used to run host-native tooling such as the dependency collector.
    pub fn native_base_image(&self) -> String {
        match &self.base_image_override {
            Some(image) => image.clone(),
            None => format!("{}:{}", self.os_name, self.os_distro),
        }
    }

    /// Target-architecture image the sysroot is layered on.
    pub fn target_base_image(&self) -> String {
        match &self.base_image_override {
            Some(image) => image.clone(),
            None => format!(
                "{}/{}:{}",
                self.arch.docker_base(),
                self.os_name,
                self.os_distro
            ),
        }
    }

    /// `<namespace>/<stage>:<arch>-<os_name>-<os_distro>`
    pub fn image_tag(&self, stage: &str) -> String {
        format!(
            "{}/{}:{}-{}-{}",
            IMAGE_NAMESPACE, stage, self.arch, self.os_name, self.os_distro
        )
    }

    /// Tag of the dependency collector image.
    pub fn rosdep_image_tag(&self) -> String {
        self.image_tag(ROSDEP_STAGE)
    }

    /// Tag of the workspace sysroot image.
    pub fn sysroot_image_tag(&self) -> String {
        self.image_tag(SYSROOT_STAGE)
    }
}

impl fmt::Display for PlatformDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}-{}",
            self.arch, self.os_name, self.os_distro, self.ros_distro
        )
    }
}
