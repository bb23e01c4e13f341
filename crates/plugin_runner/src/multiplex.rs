use tokio::{
    io::AsyncRead,
    sync::mpsc,
    task::{self, AbortHandle, JoinHandle},
};
use tracing::{debug, warn};

use crate::{
    reader::{AsyncBoundedLineReader, BoundedLine},
    CaptureLimits, RunnerError,
};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum StreamKind {
    /// The plugin's stdout; carries the JSON report.
    Primary,
    /// The plugin's stderr.
    Secondary,
}

impl StreamKind {
    pub fn name(&self) -> &'static str {
        match self {
            StreamKind::Primary => "stdout",
            StreamKind::Secondary => "stderr",
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum LineRecord {
    /// A line produced by the plugin, delimiter and trailing `\r` removed.
    Output(String),
    /// A line synthesized by the scanner, e.g. an overflow notice.
    Diagnostic(String),
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LineEvent {
    pub stream: StreamKind,
    pub record: LineRecord,
}

/// Single consumer of the merged line feed. Runs on a blocking thread, so
/// implementations may write to the terminal directly.
pub trait LineSink: Send + 'static {
    fn emit(&mut self, event: LineEvent);
}

impl<F> LineSink for F
where
    F: FnMut(LineEvent) + Send + 'static,
{
    fn emit(&mut self, event: LineEvent) {
        self(event)
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ScanEnd {
    Eof,
    Overflow {
        observed_bytes: usize,
        max_line_bytes: usize,
    },
    ReadError(String),
}

/// Completion value of one scanner task.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub stream: StreamKind,
    pub lines: usize,
    /// Raw bytes of every completed line, delimiters included. Only the primary
    /// stream is captured; the secondary one leaves this empty.
    pub captured: Vec<u8>,
    pub end: ScanEnd,
}

#[derive(Debug, Clone)]
pub struct MultiplexOutput {
    pub primary: ScanOutcome,
    pub secondary: ScanOutcome,
}

/// Two scanner tasks feeding one consumer task through an unbounded MPSC queue.
pub struct OutputMultiplexer {
    completion: JoinHandle<Result<MultiplexOutput, RunnerError>>,
    scanners: [AbortHandle; 2],
}

impl OutputMultiplexer {
    pub fn spawn<P, E, S>(primary: P, secondary: E, limits: CaptureLimits, mut sink: S) -> Self
    where
        P: AsyncRead + Unpin + Send + 'static,
        E: AsyncRead + Unpin + Send + 'static,
        S: LineSink,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<LineEvent>();

        let primary_task = tokio::spawn(scan_stream(
            primary,
            StreamKind::Primary,
            limits,
            tx.clone(),
        ));
        let secondary_task = tokio::spawn(scan_stream(secondary, StreamKind::Secondary, limits, tx));

        let consumer = task::spawn_blocking(move || {
            while let Some(event) = rx.blocking_recv() {
                sink.emit(event);
            }
        });

        let scanners = [primary_task.abort_handle(), secondary_task.abort_handle()];
        let completion = tokio::spawn(async move {
            let primary = primary_task
                .await
                .map_err(|e| RunnerError::Join(e.to_string()))?;
            let secondary = secondary_task
                .await
                .map_err(|e| RunnerError::Join(e.to_string()))?;
            consumer
                .await
                .map_err(|e| RunnerError::Join(e.to_string()))?;
            Ok(MultiplexOutput { primary, secondary })
        });

        Self {
            completion,
            scanners,
        }
    }

    /// Resolves once both streams are drained (or force-closed) and every queued
    /// line has been handed to the sink.
    pub async fn join(&mut self) -> Result<MultiplexOutput, RunnerError> {
        (&mut self.completion)
            .await
            .map_err(|e| RunnerError::Join(e.to_string()))?
    }

    /// Stops both scanners. The consumer exits on its own once the queue closes.
    pub fn abort(&self) {
        for handle in &self.scanners {
            handle.abort();
        }
        self.completion.abort();
    }
}

async fn scan_stream<R>(
    reader: R,
    stream: StreamKind,
    limits: CaptureLimits,
    tx: mpsc::UnboundedSender<LineEvent>,
) -> ScanOutcome
where
    R: AsyncRead + Unpin,
{
    let mut captured = match stream {
        StreamKind::Primary => Vec::with_capacity(limits.output_capacity),
        StreamKind::Secondary => Vec::new(),
    };
    let mut reader =
        AsyncBoundedLineReader::new(reader, limits.initial_line_bytes, limits.max_line_bytes);
    let mut lines = 0usize;

    let end = loop {
        let Some(next) = reader.next_line().await else {
            break ScanEnd::Eof;
        };
        match next {
            BoundedLine::Line {
                bytes, terminated, ..
            } => {
                lines += 1;
                let text = display_text(&bytes);
                if stream == StreamKind::Primary {
                    captured.extend_from_slice(&bytes);
                    if terminated {
                        captured.push(b'\n');
                    }
                }
                // The consumer only goes away when the run is being torn down.
                let _ = tx.send(LineEvent {
                    stream,
                    record: LineRecord::Output(text),
                });
            }
            BoundedLine::LineTooLong {
                observed_bytes,
                max_line_bytes,
                ..
            } => {
                warn!(
                    stream = stream.name(),
                    observed_bytes, max_line_bytes, "output line exceeds maximum; discarding rest of stream"
                );
                let _ = tx.send(LineEvent {
                    stream,
                    record: LineRecord::Diagnostic(format!(
                        "Output line exceeds maximum ({max_line_bytes} bytes)"
                    )),
                });
                // Keep reading so the plugin never writes into a closed pipe.
                match reader.discard_to_end().await {
                    Ok(discarded) => {
                        debug!(stream = stream.name(), discarded, "discarded output after overflow")
                    }
                    Err(err) => {
                        warn!(stream = stream.name(), error = %err, "failed draining plugin output")
                    }
                }
                break ScanEnd::Overflow {
                    observed_bytes,
                    max_line_bytes,
                };
            }
            BoundedLine::IoError { message, .. } => {
                warn!(stream = stream.name(), error = %message, "failed reading plugin output");
                let _ = tx.send(LineEvent {
                    stream,
                    record: LineRecord::Diagnostic(message.clone()),
                });
                break ScanEnd::ReadError(message);
            }
        }
    };

    debug!(stream = stream.name(), lines, end = ?end, "stream closed");
    ScanOutcome {
        stream,
        lines,
        captured,
        end,
    }
}

fn display_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}
