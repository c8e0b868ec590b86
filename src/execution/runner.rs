use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tokio::process::Command;
use tokio::time::{Duration, timeout};
use tracing::{debug, warn};

use super::ToolCommand;
use crate::error::ToolboxError;
use crate::event::{Event, EventSender, OutputStream};

/// How long to keep reading output after the process itself has exited
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// How a tool process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// None if the process was killed by a signal or timed out
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Run `cmd`, forwarding each output line as a [`Event::ProcessMsg`].
///
/// The process is killed when `timeout_secs` elapses.
pub async fn run_command(
    cmd: &ToolCommand,
    timeout_secs: Option<u64>,
    item_name: &str,
    events: &EventSender,
) -> Result<ProcessOutcome, ToolboxError> {
    debug!(item = %item_name, command = %cmd, "starting process");

    let mut child = Command::new(&cmd.program)
        .args(&cmd.args)
        .current_dir(&cmd.work_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ToolboxError::Execution {
            item_name: item_name.to_string(),
            message: format!("failed to start '{}': {}", cmd.program, e),
        })?;

    let stdout = child.stdout.take().map(|out| {
        tokio::spawn(forward_lines(
            out,
            item_name.to_string(),
            OutputStream::Stdout,
            events.clone(),
        ))
    });
    let stderr = child.stderr.take().map(|err| {
        tokio::spawn(forward_lines(
            err,
            item_name.to_string(),
            OutputStream::Stderr,
            events.clone(),
        ))
    });

    let status = match timeout_secs {
        Some(secs) => match timeout(Duration::from_secs(secs), child.wait()).await {
            Ok(status) => Some(status),
            Err(_) => {
                warn!(item = %item_name, "process timed out after {} seconds", secs);
                if let Err(e) = child.kill().await {
                    warn!(item = %item_name, "failed to kill process: {}", e);
                }
                None
            }
        },
        None => Some(child.wait().await),
    };

    // Grandchildren may still hold the pipes open after the child exits.
    for task in [stdout, stderr].into_iter().flatten() {
        if status.is_none() {
            task.abort();
            let _ = task.await;
            continue;
        }
        drain_output(task, item_name).await;
    }

    let outcome = match status {
        Some(status) => {
            let status = status.map_err(|e| ToolboxError::Execution {
                item_name: item_name.to_string(),
                message: format!("failed to wait for process: {}", e),
            })?;
            ProcessOutcome {
                exit_code: status.code(),
                timed_out: false,
            }
        }
        None => ProcessOutcome {
            exit_code: None,
            timed_out: true,
        },
    };
    debug!(item = %item_name, exit_code = ?outcome.exit_code, "process finished");
    Ok(outcome)
}

async fn drain_output(mut task: JoinHandle<()>, item_name: &str) {
    match timeout(OUTPUT_DRAIN_TIMEOUT, &mut task).await {
        Ok(Err(e)) if !e.is_cancelled() => debug!("output reader task failed: {}", e),
        Ok(_) => {}
        Err(_) => {
            debug!(item = %item_name, "output still open after exit, detaching reader");
            task.abort();
        }
    }
}

/// Forward output line by line until EOF. Invalid UTF-8 is replaced
/// with U+FFFD.
async fn forward_lines<R>(reader: R, item_name: String, stream: OutputStream, events: EventSender)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                if buf.last() == Some(&b'\n') {
                    buf.pop();
                    if buf.last() == Some(&b'\r') {
                        buf.pop();
                    }
                }
                events.emit(Event::ProcessMsg {
                    item_name: item_name.clone(),
                    stream,
                    line: String::from_utf8_lossy(&buf).into_owned(),
                });
            }
            Err(e) => {
                debug!("failed to read process output: {}", e);
                break;
            }
        }
    }
}
