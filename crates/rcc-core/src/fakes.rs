//! In-memory container engine (testing only)
//!
//! `FakeEngine` satisfies the `ContainerEngine` contract without a daemon:
//! it records every call in order, replays scripted log chunks through the
//! real log-processing state machine, and keeps track of which tags exist.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;

use crate::engine::log::{
    drain_log, drain_log_with, LineTrim, LogEvent, LogOutcome, LogSink, MemorySink,
};
use crate::engine::{BuildSpec, ContainerEngine, RunSpec};
use crate::error::{EngineError, EngineResult};

/// One recorded engine call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Build(BuildSpec),
    Run(RunSpec),
}

impl EngineCall {
    /// Tag built or image run.
    pub fn image(&self) -> &str {
        match self {
            EngineCall::Build(spec) => &spec.tag,
            EngineCall::Run(spec) => &spec.image,
        }
    }
}

#[derive(Default)]
struct FakeState {
    calls: Vec<EngineCall>,
    images: HashSet<String>,
    build_logs: HashMap<String, Vec<LogEvent>>,
    run_logs: HashMap<String, Vec<LogEvent>>,
    exit_codes: HashMap<String, i64>,
    api_failures: HashMap<String, String>,
}

/// Scriptable stand-in for a container engine.
pub struct FakeEngine {
    sink: Arc<dyn LogSink>,
    state: Mutex<FakeState>,
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self::new(Arc::new(MemorySink::new()))
    }
}

impl FakeEngine {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self {
            sink,
            state: Mutex::new(FakeState::default()),
        }
    }

    /// Pretend `tag` is already in the local image store.
    pub fn with_image(self, tag: &str) -> Self {
        self.state.lock().unwrap().images.insert(tag.to_string());
        self
    }

    /// Log chunks emitted while building `tag`.
    pub fn with_build_log(self, tag: &str, events: Vec<LogEvent>) -> Self {
        self.state
            .lock()
            .unwrap()
            .build_logs
            .insert(tag.to_string(), events);
        self
    }

    /// Log chunks emitted while running `image`.
    pub fn with_run_log(self, image: &str, events: Vec<LogEvent>) -> Self {
        self.state
            .lock()
            .unwrap()
            .run_logs
            .insert(image.to_string(), events);
        self
    }

    /// Make a build of `tag` fail with an in-stream error chunk appended to
    /// its scripted log.
    pub fn fail_build(self, tag: &str, message: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .build_logs
            .entry(tag.to_string())
            .or_default()
            .push(LogEvent::Error(message.to_string()));
        self
    }

    /// Make a run of `image` exit with `code`.
    pub fn fail_run(self, image: &str, code: i64) -> Self {
        self.state
            .lock()
            .unwrap()
            .exit_codes
            .insert(image.to_string(), code);
        self
    }

    /// Make any call touching `name` fail at the API level.
    pub fn fail_api(self, name: &str, message: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .api_failures
            .insert(name.to_string(), message.to_string());
        self
    }

    /// Calls received so far, in order.
    pub fn calls(&self) -> Vec<EngineCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn has_image(&self, tag: &str) -> bool {
        self.state.lock().unwrap().images.contains(tag)
    }

    /// Record the call and return its scripted log, or the scripted API
    /// failure.
    fn begin(&self, call: EngineCall) -> EngineResult<Vec<LogEvent>> {
        let mut state = self.state.lock().unwrap();
        let name = call.image().to_string();
        let logs = match &call {
            EngineCall::Build(_) => &state.build_logs,
            EngineCall::Run(_) => &state.run_logs,
        };
        let events = logs.get(&name).cloned().unwrap_or_default();
        state.calls.push(call);
        if let Some(message) = state.api_failures.get(&name) {
            return Err(EngineError::Api(message.clone()));
        }
        Ok(events)
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn build_image(&self, spec: &BuildSpec) -> EngineResult<()> {
        let events = self.begin(EngineCall::Build(spec.clone()))?;

        match drain_log(stream::iter(events.into_iter().map(Ok)), self.sink.as_ref()).await? {
            LogOutcome::Succeeded => {
                self.state.lock().unwrap().images.insert(spec.tag.clone());
                Ok(())
            }
            LogOutcome::Failed(message) => Err(EngineError::Build {
                tag: spec.tag.clone(),
                message,
            }),
        }
    }

    async fn run_container(&self, spec: &RunSpec) -> EngineResult<()> {
        let events = self.begin(EngineCall::Run(spec.clone()))?;

        if !self.has_image(&spec.image) {
            return Err(EngineError::Api(format!("image {} not found", spec.image)));
        }

        drain_log_with(
            stream::iter(events.into_iter().map(Ok)),
            self.sink.as_ref(),
            LineTrim::Trailing,
        )
        .await?;

        let exit_code = self
            .state
            .lock()
            .unwrap()
            .exit_codes
            .get(&spec.image)
            .copied()
            .unwrap_or(0);
        if exit_code != 0 {
            return Err(EngineError::RunFailure {
                image: spec.image.clone(),
                exit_code,
                message: String::new(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_successful_build_registers_image() {
        let sink = Arc::new(MemorySink::new());
        let engine = FakeEngine::new(sink.clone()).with_build_log(
            "rcc/rosdep:armhf-ubuntu-bionic",
            vec![
                LogEvent::Info("Step 1/1 : FROM ubuntu:bionic\n".to_string()),
                LogEvent::Info("\n".to_string()),
            ],
        );

        let spec = BuildSpec::new("/docker", "rosdep.Dockerfile", "rcc/rosdep:armhf-ubuntu-bionic");
        engine.build_image(&spec).await.unwrap();

        assert!(engine.has_image("rcc/rosdep:armhf-ubuntu-bionic"));
        assert_eq!(sink.lines(), vec!["Step 1/1 : FROM ubuntu:bionic"]);
        assert_eq!(engine.calls(), vec![EngineCall::Build(spec)]);
    }

    #[tokio::test]
    async fn test_failed_build_leaves_no_image() {
        let engine = FakeEngine::default().fail_build("rcc/x:tag", "boom");
        let err = engine
            .build_image(&BuildSpec::new("/docker", "Dockerfile", "rcc/x:tag"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Build { message, .. } if message == "boom"));
        assert!(!engine.has_image("rcc/x:tag"));
    }

    #[tokio::test]
    async fn test_run_unknown_image_is_api_error() {
        let engine = FakeEngine::default();
        let err = engine.run_container(&RunSpec::new("missing:latest")).await.unwrap_err();
        assert!(matches!(err, EngineError::Api(_)));
    }

    #[tokio::test]
    async fn test_run_nonzero_exit() {
        let engine = FakeEngine::default().with_image("img").fail_run("img", 1);
        let err = engine.run_container(&RunSpec::new("img")).await.unwrap_err();
        assert!(matches!(err, EngineError::RunFailure { exit_code: 1, .. }));
    }
}
