//! Container session - the attach/send/receive primitive
//!
//! Turns a container's raw attached byte stream into a synchronous
//! "send commands, get back (exit_status, output_lines)" primitive:
//! - `attach()` opens the duplex stream and starts exactly one background
//!   reader task that decodes chunks into discrete lines
//! - `send()` writes newline-terminated commands, in order
//! - `send_checked()` appends a sentinel echo and drains the line queue
//!   until the sentinel comes back, correlating output and exit status
//!
//! Single-writer discipline: one background producer feeds the line queue,
//! one foreground caller writes commands and drains the queue. Callers must
//! not issue `send`/`send_checked` concurrently.

use async_trait::async_trait;
use bollard::container::{AttachContainerOptions, AttachContainerResults, LogOutput};
use bollard::Docker;
use futures::stream::Stream;
use futures::StreamExt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;
use wercker_foundation::{Error, GlobalOptions, Result};

/// Pause before retrying when the attach stream yields nothing.
/// A no-data read is transient; the session has no closed state.
const READ_RETRY_PAUSE: Duration = Duration::from_millis(100);

/// Raw frames from the attach stream
type AttachStream =
    Pin<Box<dyn Stream<Item = std::result::Result<LogOutput, bollard::errors::Error>> + Send>>;

/// Timeout bounds for checked sends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Max wait for the next output line before giving up
    pub no_response_timeout: Duration,

    /// Max wall-clock time for one `send_checked` call
    pub command_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_options(&GlobalOptions::default())
    }
}

impl SessionConfig {
    /// Derive the bounds from the document-level options
    pub fn from_options(options: &GlobalOptions) -> Self {
        Self {
            no_response_timeout: options.no_response_duration(),
            command_timeout: options.command_duration(),
        }
    }
}

/// Seam between the orchestrator and a live session, so the container
/// sequence can be driven against a scripted channel in tests
#[async_trait]
pub trait CommandChannel: Send {
    /// Issue commands and correlate their completion: returns the raw
    /// textual exit status and the output lines captured before it
    async fn send_checked(&mut self, commands: Vec<String>) -> Result<(String, Vec<String>)>;
}

/// Command-execution channel bound to one running container.
///
/// Lifecycle: constructed, `attach()`ed once, then any number of
/// `send`/`send_checked` calls; torn down with the container. A session is
/// never reused across containers.
pub struct Session {
    container_id: String,
    docker: Option<Arc<Docker>>,
    config: SessionConfig,
    writer: Option<Pin<Box<dyn AsyncWrite + Send>>>,
    lines: Option<mpsc::UnboundedReceiver<String>>,
    reader_handle: Option<JoinHandle<()>>,

    /// Commands written so far - diagnostics only, not used for correlation
    sent: usize,
}

impl Session {
    /// Create a session for a container known to the given engine client
    pub fn new(
        container_id: impl Into<String>,
        docker: Arc<Docker>,
        config: SessionConfig,
    ) -> Self {
        Self {
            container_id: container_id.into(),
            docker: Some(docker),
            config,
            writer: None,
            lines: None,
            reader_handle: None,
            sent: 0,
        }
    }

    /// Create a session with no engine client, for callers that already
    /// hold an open attach stream and wire it with [`Session::attach_stream`]
    pub fn disconnected(container_id: impl Into<String>, config: SessionConfig) -> Self {
        Self {
            container_id: container_id.into(),
            docker: None,
            config,
            writer: None,
            lines: None,
            reader_handle: None,
            sent: 0,
        }
    }

    /// Open the duplex attach stream and start the background reader
    pub async fn attach(&mut self) -> Result<()> {
        let docker = self
            .docker
            .as_ref()
            .ok_or_else(|| Error::Session("session has no engine client".to_string()))?;

        let options = AttachContainerOptions::<String> {
            stdin: Some(true),
            stdout: Some(true),
            stderr: Some(true),
            stream: Some(true),
            logs: Some(false),
            ..Default::default()
        };
        let results = docker
            .attach_container(&self.container_id, Some(options))
            .await
            .map_err(|e| {
                Error::Docker(format!(
                    "Failed to attach to container {}: {}",
                    self.container_id, e
                ))
            })?;

        self.attach_stream(results);
        Ok(())
    }

    /// Wire an already-opened attach stream into the session.
    ///
    /// Split out from `attach()` so the protocol can run over an in-memory
    /// stream; `AttachContainerResults` has public halves for exactly this.
    pub fn attach_stream(&mut self, stream: AttachContainerResults) {
        let AttachContainerResults { output, input } = stream;
        let (tx, rx) = mpsc::unbounded_channel();
        let container_id = self.container_id.clone();
        let handle = tokio::spawn(read_lines(output, tx, container_id));

        self.writer = Some(input);
        self.lines = Some(rx);
        self.reader_handle = Some(handle);
    }

    /// Write commands to the container, newline-terminated, in order
    pub async fn send<I, S>(&mut self, commands: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| Error::Session("session is not attached".to_string()))?;

        for command in commands {
            let command = command.as_ref();
            debug!(seq = self.sent, "send {}", command);
            writer
                .write_all(command.as_bytes())
                .await
                .map_err(|e| Error::Session(format!("Failed to write command: {}", e)))?;
            writer
                .write_all(b"\n")
                .await
                .map_err(|e| Error::Session(format!("Failed to write command: {}", e)))?;
            self.sent += 1;
        }
        writer
            .flush()
            .await
            .map_err(|e| Error::Session(format!("Failed to flush commands: {}", e)))?;
        Ok(())
    }

    /// Issue commands followed by a sentinel echo, then drain the line queue
    /// until the sentinel comes back.
    ///
    /// Output is every line observed before the sentinel (trimmed, empties
    /// discarded), in arrival order. The exit status is the text after the
    /// sentinel, uninterpreted. Waits are bounded: `no_response_timeout`
    /// for each next line, `command_timeout` for the whole call.
    pub async fn send_checked<I, S>(&mut self, commands: I) -> Result<(String, Vec<String>)>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let sentinel = Uuid::new_v4().simple().to_string();
        self.send(commands).await?;
        self.send([format!("echo {} $?", sentinel)]).await?;

        let marker = format!("{} ", sentinel);
        let config = self.config;
        let deadline = Instant::now() + config.command_timeout;
        let lines = self
            .lines
            .as_mut()
            .ok_or_else(|| Error::Session("session is not attached".to_string()))?;

        let mut output = Vec::new();
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::Timeout(format!(
                    "command did not complete within {:?}",
                    config.command_timeout
                )));
            }

            let wait = config.no_response_timeout.min(deadline - now);
            let line = match tokio::time::timeout(wait, lines.recv()).await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    return Err(Error::Session(
                        "output stream ended before the command completed".to_string(),
                    ))
                }
                Err(_) => {
                    let message = if wait < config.no_response_timeout {
                        format!(
                            "command did not complete within {:?}",
                            config.command_timeout
                        )
                    } else {
                        format!(
                            "no output for {:?} while waiting for command completion",
                            wait
                        )
                    };
                    return Err(Error::Timeout(message));
                }
            };

            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(exit_status) = line.strip_prefix(&marker) {
                return Ok((exit_status.to_string(), output));
            }
            output.push(line.to_string());
        }
    }

    /// Pull the next decoded line from the queue (single logical consumer)
    pub async fn recv_line(&mut self) -> Option<String> {
        match self.lines.as_mut() {
            Some(lines) => lines.recv().await,
            None => None,
        }
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    /// Number of commands written so far (diagnostics only)
    pub fn sent_count(&self) -> usize {
        self.sent
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(handle) = self.reader_handle.take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl CommandChannel for Session {
    async fn send_checked(&mut self, commands: Vec<String>) -> Result<(String, Vec<String>)> {
        Session::send_checked(self, commands).await
    }
}

/// Background reader: decode raw frames into discrete lines, in arrival
/// order, carrying the trailing incomplete fragment across reads.
async fn read_lines(output: AttachStream, lines: mpsc::UnboundedSender<String>, container_id: String) {
    let mut output = output.fuse();
    let mut pending = String::new();

    loop {
        match output.next().await {
            Some(Ok(frame)) => {
                let chunk = frame.into_bytes();
                if chunk.is_empty() {
                    tokio::time::sleep(READ_RETRY_PAUSE).await;
                    continue;
                }
                debug!(container = %container_id, "raw {:?}", chunk);
                pending.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(index) = pending.find('\n') {
                    let line: String = pending.drain(..=index).collect();
                    let line = line.trim_end_matches('\n').to_string();
                    debug!(container = %container_id, "recv {}", line);
                    if lines.send(line).is_err() {
                        // Consumer dropped the session
                        return;
                    }
                }
            }
            Some(Err(e)) => {
                warn!(container = %container_id, "attach stream error: {}", e);
                tokio::time::sleep(READ_RETRY_PAUSE).await;
            }
            None => {
                if lines.is_closed() {
                    return;
                }
                tokio::time::sleep(READ_RETRY_PAUSE).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_options() {
        let config = SessionConfig::from_options(&GlobalOptions::default());
        assert_eq!(config.no_response_timeout, Duration::from_secs(5));
        assert_eq!(config.command_timeout, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_send_before_attach_errors() {
        let mut session = Session::disconnected("c1", SessionConfig::default());
        let result = session.send(["echo hi"]).await;
        assert!(matches!(result, Err(Error::Session(_))));
    }
}
