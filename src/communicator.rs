//! The non-blocking, bidirectional attach pump.
//!
//! The original design drives this over a hijacked socket with
//! `select`, non-blocking reads/writes and a 50 ms idle sleep (see
//! spec.md's design notes). In native async Rust the same shape is a
//! task racing two half-duplex pipes with a shared deadline: bollard's
//! already-demuxed `LogOutput` stream stands in for the read half, a
//! single whole-buffer write plus an explicit half-close stands in for
//! the write half, and `tokio::time::timeout` enforces the deadline at
//! the transport layer exactly as the tick-based loop did.

use std::time::Duration;

use bollard::container::{AttachContainerResults, LogOutput};
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::error::SandboxResult;

/// Outcome of one attach-and-communicate cycle.
pub enum CommunicatorOutcome {
    /// The peer closed the stream before the deadline elapsed.
    Completed { stdout: Vec<u8>, stderr: Vec<u8> },
    /// The deadline elapsed without the engine closing the stream. The
    /// container is intentionally not killed here — the lifecycle layer
    /// classifies and later destroys it.
    TimedOut,
}

/// Drive `attached` to termination: write `stdin` (if any) then
/// half-close, concurrently draining the demuxed output stream, all
/// bounded by `deadline`.
pub async fn communicate(
    attached: AttachContainerResults,
    stdin: Option<Vec<u8>>,
    deadline: Duration,
) -> SandboxResult<CommunicatorOutcome> {
    let AttachContainerResults { output, input } = attached;

    match tokio::time::timeout(deadline, pump(output, input, stdin)).await {
        Ok((stdout, stderr)) => Ok(CommunicatorOutcome::Completed { stdout, stderr }),
        Err(_) => Ok(CommunicatorOutcome::TimedOut),
    }
}

async fn pump(
    mut output: impl futures_util::Stream<Item = Result<LogOutput, bollard::errors::Error>> + Unpin,
    mut input: impl tokio::io::AsyncWrite + Unpin,
    stdin: Option<Vec<u8>>,
) -> (Vec<u8>, Vec<u8>) {
    let write_half = async {
        // The container's stdin is always open; programs like `cat` or
        // `grep` need an explicit half-close to observe EOF even when
        // there is nothing to send.
        if let Some(data) = &stdin {
            if !data.is_empty() {
                if let Err(err) = input.write_all(data).await {
                    warn!(%err, "stdin write failed, peer likely closed its read half");
                    return;
                }
                if let Err(err) = input.flush().await {
                    warn!(%err, "stdin flush failed");
                    return;
                }
            }
        }
        if let Err(err) = input.shutdown().await {
            warn!(%err, "failed to half-close stdin");
        }
    };

    let read_half = async {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        while let Some(chunk) = output.next().await {
            match chunk {
                Ok(LogOutput::StdOut { message }) => stdout.extend_from_slice(&message),
                Ok(LogOutput::StdErr { message }) => stderr.extend_from_slice(&message),
                Ok(LogOutput::StdIn { .. }) | Ok(LogOutput::Console { .. }) => {}
                Err(err) => {
                    warn!(%err, "attach stream closed abruptly");
                    break;
                }
            }
        }
        (stdout, stderr)
    };

    let (_, (stdout, stderr)) = tokio::join!(write_half, read_half);
    (stdout, stderr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn frame(variant: &str, bytes: &[u8]) -> Result<LogOutput, bollard::errors::Error> {
        let message = bytes::Bytes::copy_from_slice(bytes);
        Ok(match variant {
            "out" => LogOutput::StdOut { message },
            "err" => LogOutput::StdErr { message },
            _ => unreachable!(),
        })
    }

    #[tokio::test]
    async fn pump_separates_stdout_and_stderr_and_closes_stdin() {
        let chunks = vec![
            frame("out", b"hello "),
            frame("err", b"oops"),
            frame("out", b"world"),
        ];
        let output = stream::iter(chunks);
        let input = tokio::io::sink();

        let (stdout, stderr) = pump(output, input, Some(b"in".to_vec())).await;
        assert_eq!(stdout, b"hello world");
        assert_eq!(stderr, b"oops");
    }

    #[tokio::test]
    async fn timeout_without_stream_close_reports_timed_out() {
        let output = stream::pending::<Result<LogOutput, bollard::errors::Error>>();
        let input = tokio::io::sink();
        let result = tokio::time::timeout(Duration::from_millis(20), pump(output, input, None)).await;
        assert!(result.is_err());
    }
}
