//! ros-cross-compile core library
//!
//! Provides the pieces every pipeline stage builds on:
//! - [`platform`]: the validated target triple and the image names derived from it
//! - [`engine`]: the container engine client (build an image, run a container)
//!   and the log-event protocol that turns streamed engine output into pass/fail
//! - [`obs`] / [`telemetry`]: structured lifecycle events and tracing setup
//! - [`fakes`]: an in-memory engine for exercising stages without a daemon

pub mod engine;
pub mod error;
pub mod fakes;
pub mod obs;
pub mod platform;
pub mod telemetry;

pub use engine::docker::DockerEngine;
pub use engine::log::{LineTrim, LogEvent, LogSink, MemorySink, TracingSink};
pub use engine::{BuildSpec, ContainerEngine, RunSpec};
pub use error::{EngineError, EngineResult, PlatformError};
pub use platform::{Architecture, PlatformDescriptor, RosDistro, RosVersion};
pub use telemetry::init_tracing;
