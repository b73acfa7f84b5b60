//! Docker implementation of [`ContainerEngine`] on top of bollard.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bollard::container::{
    AttachContainerOptions, AttachContainerResults, Config, CreateContainerOptions, LogOutput,
    RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::image::BuildImageOptions;
use bollard::models::{BuildInfo, ContainerWaitResponse, HostConfig};
use bollard::Docker;
use futures::{future, stream, Stream, StreamExt, TryStreamExt};
use tracing::{debug, error, warn};

use super::context::pack_context;
use super::log::{drain_log, drain_log_with, LineTrim, LogEvent, LogOutcome, LogSink};
use super::{BuildSpec, ContainerEngine, RunSpec};
use crate::error::{EngineError, EngineResult};

/// Client for the local Docker daemon.
///
/// Owns the daemon connection for the lifetime of the process. The cache flag
/// is fixed at construction and forwarded on every build.
pub struct DockerEngine {
    docker: Docker,
    nocache: bool,
    sink: Arc<dyn LogSink>,
}

impl DockerEngine {
    /// Connect using `DOCKER_HOST` or the platform's default socket.
    pub fn connect(nocache: bool, sink: Arc<dyn LogSink>) -> EngineResult<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self::with_client(docker, nocache, sink))
    }

    pub fn with_client(docker: Docker, nocache: bool, sink: Arc<dyn LogSink>) -> Self {
        Self {
            docker,
            nocache,
            sink,
        }
    }

    /// Check that the daemon answers before any stage starts.
    pub async fn ping(&self) -> EngineResult<()> {
        self.docker.ping().await?;
        Ok(())
    }

    /// Attach, start, stream output, then collect the exit status.
    ///
    /// The attach happens before start so no output is lost, and the
    /// container is only removed by the caller once its status is read.
    async fn run_created(&self, id: &str, image: &str) -> EngineResult<()> {
        let options = AttachContainerOptions::<String> {
            stdout: Some(true),
            stderr: Some(true),
            stream: Some(true),
            logs: Some(true),
            ..Default::default()
        };
        let AttachContainerResults { output, .. } =
            self.docker.attach_container(id, Some(options)).await?;

        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await?;
        debug!(container = %id, "Started container");

        // Container output never carries an in-band failure signal.
        drain_log_with(
            container_log_events(output),
            self.sink.as_ref(),
            LineTrim::Trailing,
        )
        .await?;

        let exit = self
            .docker
            .wait_container(id, None::<WaitContainerOptions<String>>)
            .try_collect::<Vec<_>>()
            .await;
        exit_status(image, exit)
    }

    async fn remove(&self, id: &str) {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        if let Err(err) = self.docker.remove_container(id, Some(options)).await {
            warn!(container = %id, "Failed to remove container: {}", err);
        }
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn build_image(&self, spec: &BuildSpec) -> EngineResult<()> {
        debug!(tag = %spec.tag, context = %spec.context_dir.display(), "Packing build context");
        let context = pack_build_context(spec).await?;

        let options = BuildImageOptions {
            dockerfile: spec.dockerfile.clone(),
            t: spec.tag.clone(),
            buildargs: spec
                .build_args
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<HashMap<_, _>>(),
            nocache: self.nocache,
            q: false,
            rm: true,
            ..Default::default()
        };

        let events = self
            .docker
            .build_image(options, None, Some(context.into()))
            .filter_map(|chunk| future::ready(build_chunk_event(chunk)));

        match drain_log(events, self.sink.as_ref()).await? {
            LogOutcome::Succeeded => Ok(()),
            LogOutcome::Failed(message) => {
                error!(tag = %spec.tag, "Error building Docker image: {}", message);
                Err(EngineError::Build {
                    tag: spec.tag.clone(),
                    message,
                })
            }
        }
    }

    async fn run_container(&self, spec: &RunSpec) -> EngineResult<()> {
        let config = Config {
            image: Some(spec.image.clone()),
            env: Some(spec.env_list()),
            host_config: Some(HostConfig {
                binds: Some(spec.bind_list()),
                network_mode: Some("host".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let created = self
            .docker
            .create_container(None::<CreateContainerOptions<String>>, config)
            .await
            .map_err(|err| missing_image(err, &spec.image))?;
        let id = created.id;
        debug!(container = %id, image = %spec.image, "Created container");

        let result = self.run_created(&id, &spec.image).await;
        self.remove(&id).await;
        result
    }
}

/// Decode one build chunk. Chunks with neither text nor error (progress,
/// aux ids) produce nothing.
pub fn build_info_event(info: BuildInfo) -> Option<LogEvent> {
    if let Some(error) = info.error {
        return Some(LogEvent::Error(error));
    }
    if let Some(message) = info.error_detail.and_then(|detail| detail.message) {
        return Some(LogEvent::Error(message));
    }
    info.stream.map(LogEvent::Info)
}

/// Map one item of the build stream.
///
/// bollard surfaces an in-band `error` chunk as `DockerStreamError`; that is
/// a build failure, not an API failure.
pub fn build_chunk_event(chunk: Result<BuildInfo, DockerError>) -> Option<EngineResult<LogEvent>> {
    match chunk {
        Ok(info) => build_info_event(info).map(Ok),
        Err(DockerError::DockerStreamError { error }) => Some(Ok(LogEvent::Error(error))),
        Err(err) => Some(Err(EngineError::from(err))),
    }
}

/// Reassembles container output frames into whole lines.
///
/// The daemon frames output by write, not by line, so a line may arrive in
/// several frames. stdout and stderr are buffered separately.
#[derive(Debug, Default)]
pub struct LineSplitter {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl LineSplitter {
    /// Complete lines now available, without their terminators.
    pub fn push(&mut self, output: LogOutput) -> Vec<EngineResult<LogEvent>> {
        let buffer = match &output {
            LogOutput::StdErr { .. } => &mut self.stderr,
            _ => &mut self.stdout,
        };
        buffer.extend_from_slice(&output.into_bytes());

        let mut events = Vec::new();
        while let Some(end) = buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = buffer.drain(..=end).collect();
            events.push(Ok(LogEvent::Info(decode_line(&line))));
        }
        events
    }

    /// Unterminated trailing output, once the stream has ended.
    pub fn finish(&mut self) -> Vec<EngineResult<LogEvent>> {
        [std::mem::take(&mut self.stdout), std::mem::take(&mut self.stderr)]
            .into_iter()
            .filter(|rest| !rest.is_empty())
            .map(|rest| Ok(LogEvent::Info(decode_line(&rest))))
            .collect()
    }
}

fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches(['\n', '\r'])
        .to_string()
}

/// Turn an attached output stream into per-line log events.
pub fn container_log_events<S>(output: S) -> impl Stream<Item = EngineResult<LogEvent>>
where
    S: Stream<Item = Result<LogOutput, DockerError>>,
{
    output
        .map(Some)
        .chain(stream::once(future::ready(None)))
        .scan(LineSplitter::default(), |lines, frame| {
            let events = match frame {
                Some(Ok(output)) => lines.push(output),
                Some(Err(err)) => vec![Err(EngineError::from(err))],
                None => lines.finish(),
            };
            future::ready(Some(events))
        })
        .flat_map(stream::iter)
}

fn exit_status(
    image: &str,
    exit: Result<Vec<ContainerWaitResponse>, DockerError>,
) -> EngineResult<()> {
    match exit {
        Ok(responses) => match responses.last() {
            Some(response) if response.status_code != 0 => Err(EngineError::RunFailure {
                image: image.to_string(),
                exit_code: response.status_code,
                message: response
                    .error
                    .as_ref()
                    .and_then(|e| e.message.clone())
                    .unwrap_or_default(),
            }),
            _ => Ok(()),
        },
        Err(DockerError::DockerContainerWaitError { error, code }) => {
            Err(EngineError::RunFailure {
                image: image.to_string(),
                exit_code: code,
                message: error,
            })
        }
        Err(err) => Err(err.into()),
    }
}

fn missing_image(err: DockerError, image: &str) -> EngineError {
    match err {
        DockerError::DockerResponseServerError {
            status_code: 404,
            message,
        } => EngineError::Api(format!("image {image} not found: {message}")),
        other => other.into(),
    }
}

async fn pack_build_context(spec: &BuildSpec) -> EngineResult<Vec<u8>> {
    let root = spec.context_dir.clone();
    let dockerfile = spec.dockerfile.clone();
    let packed = tokio::task::spawn_blocking(move || pack_context(&root, &dockerfile))
        .await
        .map_err(|err| EngineError::Context {
            path: spec.context_dir.clone(),
            source: std::io::Error::new(std::io::ErrorKind::Other, err),
        })?;

    packed.map_err(|source| EngineError::Context {
        path: spec.context_dir.clone(),
        source,
    })
}
