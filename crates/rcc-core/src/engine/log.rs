//! Log-event protocol for streamed engine output.
//!
//! Engine output is decoded into [`LogEvent`]s and driven through
//! [`drain_log`]:
//!
//! ```text
//! AWAITING_CHUNK --Error(text)--> FAILED     (terminal, stream abandoned)
//! AWAITING_CHUNK --Info(text)---> EMIT --> AWAITING_CHUNK
//! AWAITING_CHUNK --exhausted----> SUCCEEDED  (terminal)
//! ```

use std::sync::Mutex;

use futures::{Stream, StreamExt};
use tracing::info;

use crate::error::EngineResult;

/// One decoded chunk of engine output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEvent {
    /// Informational output line
    Info(String),
    /// Error reported by the engine inside the stream
    Error(String),
}

/// Terminal state of a drained log stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutcome {
    Succeeded,
    Failed(String),
}

/// Tracing target of forwarded engine output.
pub const ENGINE_OUTPUT_TARGET: &str = "rcc::engine";

/// How much whitespace is stripped from an `Info` line before it is
/// forwarded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LineTrim {
    /// Both ends; build output.
    #[default]
    Both,
    /// Trailing only, keeping indentation; container output.
    Trailing,
}

impl LineTrim {
    fn apply(self, text: &str) -> &str {
        match self {
            LineTrim::Both => text.trim(),
            LineTrim::Trailing => text.trim_end(),
        }
    }
}

/// Destination for engine output lines.
///
/// One sink is created by the binary and shared by every engine client.
pub trait LogSink: Send + Sync {
    fn emit(&self, line: &str);
}

/// Forwards each line as an `info!` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, line: &str) {
        info!(target: ENGINE_OUTPUT_TARGET, "{}", line);
    }
}

/// Records lines in memory, in arrival order.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

impl LogSink for MemorySink {
    fn emit(&self, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line.to_string());
        }
    }
}

/// Consume a log stream until it is exhausted or reports an error.
///
/// Info lines are trimmed and forwarded when non-empty. The first `Error`
/// stops consumption: nothing after it is polled or forwarded. Errors raised
/// by the stream itself (engine API failures) propagate unchanged.
pub async fn drain_log<S>(events: S, sink: &dyn LogSink) -> EngineResult<LogOutcome>
where
    S: Stream<Item = EngineResult<LogEvent>>,
{
    drain_log_with(events, sink, LineTrim::Both).await
}

/// [`drain_log`] with an explicit trimming mode.
pub async fn drain_log_with<S>(
    events: S,
    sink: &dyn LogSink,
    trim: LineTrim,
) -> EngineResult<LogOutcome>
where
    S: Stream<Item = EngineResult<LogEvent>>,
{
    futures::pin_mut!(events);

    while let Some(event) = events.next().await {
        match event? {
            LogEvent::Error(message) => return Ok(LogOutcome::Failed(message)),
            LogEvent::Info(text) => {
                let line = trim.apply(&text);
                if !line.is_empty() {
                    sink.emit(line);
                }
            }
        }
    }

    Ok(LogOutcome::Succeeded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use futures::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn info(s: &str) -> EngineResult<LogEvent> {
        Ok(LogEvent::Info(s.to_string()))
    }

    #[tokio::test]
    async fn test_only_non_empty_trimmed_lines_forwarded() {
        let sink = MemorySink::new();
        let events = stream::iter(vec![
            info("Step 1/4 : FROM ubuntu:bionic\n"),
            info("\n"),
            info("   "),
            info(" ---> 56def654ec22\n"),
            info("Successfully built 56def654ec22\n"),
        ]);

        let outcome = drain_log(events, &sink).await.unwrap();
        assert_eq!(outcome, LogOutcome::Succeeded);
        assert_eq!(
            sink.lines(),
            vec![
                "Step 1/4 : FROM ubuntu:bionic",
                "---> 56def654ec22",
                "Successfully built 56def654ec22",
            ]
        );
    }

    #[tokio::test]
    async fn test_error_chunk_stops_consumption() {
        let sink = MemorySink::new();
        let polled = AtomicUsize::new(0);
        let events = stream::iter(vec![
            info("Step 1/2 : RUN false"),
            Ok(LogEvent::Error("returned a non-zero code: 1".to_string())),
            info("should never be seen"),
        ])
        .inspect(|_| {
            polled.fetch_add(1, Ordering::SeqCst);
        });

        let outcome = drain_log(events, &sink).await.unwrap();
        assert_eq!(
            outcome,
            LogOutcome::Failed("returned a non-zero code: 1".to_string())
        );
        assert_eq!(sink.lines(), vec!["Step 1/2 : RUN false"]);
        assert_eq!(polled.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_trailing_trim_keeps_indentation() {
        let sink = MemorySink::new();
        let events = stream::iter(vec![
            info("Starting >>> talker\r\n"),
            info("  \n"),
            info("    --- stderr: talker\n"),
        ]);

        drain_log_with(events, &sink, LineTrim::Trailing).await.unwrap();
        assert_eq!(
            sink.lines(),
            vec!["Starting >>> talker", "    --- stderr: talker"]
        );
    }

    #[tokio::test]
    async fn test_empty_stream_succeeds() {
        let sink = MemorySink::new();
        let events = stream::iter(Vec::<EngineResult<LogEvent>>::new());
        assert_eq!(drain_log(events, &sink).await.unwrap(), LogOutcome::Succeeded);
        assert!(sink.lines().is_empty());
    }

    #[tokio::test]
    async fn test_stream_api_error_propagates() {
        let sink = MemorySink::new();
        let events = stream::iter(vec![
            info("pulling"),
            Err(EngineError::Api("connection reset".to_string())),
        ]);
        let err = drain_log(events, &sink).await.unwrap_err();
        assert!(matches!(err, EngineError::Api(msg) if msg == "connection reset"));
        assert_eq!(sink.lines(), vec!["pulling"]);
    }
}
