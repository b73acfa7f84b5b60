//! ros-cross-compile pipeline
//!
//! Sequences the container stages of a cross-compile run:
//! - [`GatherRosdeps`]: build and run the rosdep collector against the workspace
//! - [`CreateSysroot`]: build the workspace sysroot image
//! - [`EmulatedBuild`]: run the sysroot image to cross-compile under emulation
//!
//! [`Pipeline`] runs them strictly in order and stops at the first failure.

pub mod builders;
pub mod dependencies;
pub mod error;
pub mod pipeline;
pub mod stage;
pub mod sysroot;
pub mod workspace;

// Re-export key types
pub use builders::EmulatedBuild;
pub use dependencies::GatherRosdeps;
pub use error::{PipelineError, PipelineResult};
pub use pipeline::{Pipeline, PipelineOptions, PipelineReport, StageOutcome};
pub use stage::{Stage, StageContext};
pub use sysroot::CreateSysroot;
pub use workspace::WorkspaceLayout;
