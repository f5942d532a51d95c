//! Session protocol tests over an in-memory attach stream
//!
//! A scripted shell sits on the far side of a pair of duplex pipes and
//! behaves like the container's interactive bash: it consumes one command
//! per line, tracks the last exit status, and expands `$?` in echoes. The
//! session never knows the difference.

use bollard::container::{AttachContainerResults, LogOutput};
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, DuplexStream};
use wercker_foundation::Error;
use wercker_pipeline::{Session, SessionConfig};

/// Wrap duplex halves as the engine's attach result
fn attach_results(output: DuplexStream, input: DuplexStream) -> AttachContainerResults {
    let frames = stream::unfold(output, |mut read| async move {
        // Small chunks on purpose - lines must survive arbitrary splits
        let mut buf = vec![0u8; 16];
        match read.read(&mut buf).await {
            Ok(0) => None,
            Ok(n) => {
                buf.truncate(n);
                let frame: Result<LogOutput, bollard::errors::Error> = Ok(LogOutput::StdOut {
                    message: Bytes::from(buf),
                });
                Some((frame, read))
            }
            Err(_) => None,
        }
    });
    AttachContainerResults {
        output: Box::pin(frames),
        input: Box::pin(input),
    }
}

/// Spawn the scripted shell; returns the attach result plus the command
/// lines it received
fn spawn_fake_shell() -> (AttachContainerResults, Arc<Mutex<Vec<String>>>) {
    let (input_client, input_server) = tokio::io::duplex(4096);
    let (mut output_server, output_client) = tokio::io::duplex(4096);
    let received = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&received);

    tokio::spawn(async move {
        let mut lines = BufReader::new(input_server).lines();
        let mut last_status: i32 = 0;
        while let Ok(Some(line)) = lines.next_line().await {
            log.lock().unwrap().push(line.clone());
            if let Some(rest) = line.strip_prefix("echo ") {
                let rendered = rest.replace("$?", &last_status.to_string());
                if output_server
                    .write_all(format!("{}\n", rendered).as_bytes())
                    .await
                    .is_err()
                {
                    return;
                }
                last_status = 0;
            } else if line == "false" {
                last_status = 1;
            } else if let Some(status) = line.strip_prefix("exit-with ") {
                last_status = status.parse().unwrap_or(1);
            } else {
                last_status = 0;
            }
        }
    });

    (attach_results(output_client, input_client), received)
}

fn shell_session() -> (Session, Arc<Mutex<Vec<String>>>) {
    let (results, received) = spawn_fake_shell();
    let mut session = Session::disconnected("test-container", SessionConfig::default());
    session.attach_stream(results);
    (session, received)
}

#[tokio::test]
async fn test_lines_reassembled_across_chunk_boundaries() {
    let frames = ["fir", "st\nsec", "ond\nthird\n"];
    let output = stream::iter(frames.into_iter().map(|f| {
        Ok::<_, bollard::errors::Error>(LogOutput::StdOut {
            message: Bytes::from(f),
        })
    }))
    .chain(stream::pending());
    let results = AttachContainerResults {
        output: Box::pin(output),
        input: Box::pin(tokio::io::sink()),
    };

    let mut session = Session::disconnected("test-container", SessionConfig::default());
    session.attach_stream(results);

    assert_eq!(session.recv_line().await.as_deref(), Some("first"));
    assert_eq!(session.recv_line().await.as_deref(), Some("second"));
    assert_eq!(session.recv_line().await.as_deref(), Some("third"));
}

#[tokio::test]
async fn test_send_checked_captures_output_and_exit() {
    let (mut session, _) = shell_session();

    let (exit_status, output) = session
        .send_checked(["echo build-output", "echo more"])
        .await
        .unwrap();

    assert_eq!(exit_status, "0");
    assert_eq!(output, vec!["build-output", "more"]);
}

#[tokio::test]
async fn test_send_checked_nonzero_exit_is_textual() {
    let (mut session, _) = shell_session();

    let (exit_status, output) = session.send_checked(["false"]).await.unwrap();
    assert_eq!(exit_status, "1");
    assert!(output.is_empty());

    let (exit_status, _) = session.send_checked(["exit-with 42"]).await.unwrap();
    assert_eq!(exit_status, "42");
}

#[tokio::test]
async fn test_send_checked_output_stays_between_boundaries() {
    let (mut session, _) = shell_session();

    let (_, first) = session.send_checked(["echo one"]).await.unwrap();
    let (_, second) = session.send_checked(["echo two"]).await.unwrap();

    assert_eq!(first, vec!["one"]);
    assert_eq!(second, vec!["two"]);
}

#[tokio::test]
async fn test_empty_lines_are_discarded() {
    let (mut session, _) = shell_session();

    // A bare `echo ` produces an empty output line
    let (exit_status, output) = session.send_checked(["echo ", "echo data"]).await.unwrap();
    assert_eq!(exit_status, "0");
    assert_eq!(output, vec!["data"]);
}

#[tokio::test]
async fn test_sentinels_are_unique_per_call() {
    let (mut session, received) = shell_session();

    session.send_checked(["echo a"]).await.unwrap();
    session.send_checked(["echo b"]).await.unwrap();
    assert_eq!(session.sent_count(), 4);

    let received = received.lock().unwrap();
    let sentinels: Vec<&String> = received
        .iter()
        .filter(|line| line.ends_with(" $?"))
        .collect();
    assert_eq!(sentinels.len(), 2);
    assert_ne!(sentinels[0], sentinels[1]);
}

#[tokio::test]
async fn test_silent_remote_times_out() {
    // Both far halves stay open but nothing ever answers
    let (input_client, _input_keepalive) = tokio::io::duplex(4096);
    let (_output_keepalive, output_client) = tokio::io::duplex(4096);

    let config = SessionConfig {
        no_response_timeout: Duration::from_millis(50),
        command_timeout: Duration::from_millis(200),
    };
    let mut session = Session::disconnected("test-container", config);
    session.attach_stream(attach_results(output_client, input_client));

    let result = session.send_checked(["echo never-answered"]).await;
    assert!(matches!(result, Err(Error::Timeout(_))));
}

#[tokio::test]
async fn test_chatty_remote_without_sentinel_hits_command_timeout() {
    let (input_client, _input_keepalive) = tokio::io::duplex(4096);
    let (mut output_server, output_client) = tokio::io::duplex(4096);

    // Noise arrives steadily, so the per-line wait never trips; the
    // overall command bound must
    tokio::spawn(async move {
        loop {
            if output_server.write_all(b"noise\n").await.is_err() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    });

    let config = SessionConfig {
        no_response_timeout: Duration::from_millis(100),
        command_timeout: Duration::from_millis(250),
    };
    let mut session = Session::disconnected("test-container", config);
    session.attach_stream(attach_results(output_client, input_client));

    let result = session.send_checked(["sleep forever"]).await;
    assert!(matches!(result, Err(Error::Timeout(_))));
}
