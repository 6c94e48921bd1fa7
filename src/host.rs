//! Console host - drives the service from a terminal or a service manager
//!
//! Control commands come from OS signals and, in debug mode, from lines
//! on stdin. Status reports are drained into the log.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::service::{ControlCommand, StatusReport};

/// Channel capacity for both directions
const CHANNEL_CAPACITY: usize = 16;

/// Configuration for the console host
#[derive(Debug, Clone, Default)]
pub struct ConsoleHostConfig {
    /// Also accept control commands typed on stdin
    pub read_stdin: bool,
}

/// The host's ends of the service channels, handed to `HealthService::run`
pub struct ConsoleHost {
    pub commands: mpsc::Receiver<ControlCommand>,
    pub status: mpsc::Sender<StatusReport>,
    status_task: JoinHandle<Option<StatusReport>>,
}

impl ConsoleHost {
    /// Wire up signal handling (and stdin if configured)
    pub fn start(config: &ConsoleHostConfig) -> Result<Self> {
        let (cmd_tx, commands) = mpsc::channel(CHANNEL_CAPACITY);
        let (status, status_rx) = mpsc::channel(CHANNEL_CAPACITY);

        spawn_signal_commands(cmd_tx.clone())?;
        if config.read_stdin {
            spawn_line_commands(BufReader::new(tokio::io::stdin()), cmd_tx);
        }
        let status_task = spawn_status_logger(status_rx);

        Ok(Self {
            commands,
            status,
            status_task,
        })
    }

    /// Split into the channel ends the service loop consumes
    pub fn into_parts(
        self,
    ) -> (
        mpsc::Receiver<ControlCommand>,
        mpsc::Sender<StatusReport>,
        JoinHandle<Option<StatusReport>>,
    ) {
        (self.commands, self.status, self.status_task)
    }
}

/// Forward OS signals as control commands
#[cfg(unix)]
pub fn spawn_signal_commands(tx: mpsc::Sender<ControlCommand>) -> Result<JoinHandle<()>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = signal(SignalKind::terminate())?;
    let mut int = signal(SignalKind::interrupt())?;
    let mut usr1 = signal(SignalKind::user_defined1())?;
    let mut usr2 = signal(SignalKind::user_defined2())?;
    let mut hup = signal(SignalKind::hangup())?;

    Ok(tokio::spawn(async move {
        loop {
            let command = tokio::select! {
                _ = term.recv() => ControlCommand::Stop,
                _ = int.recv() => ControlCommand::Stop,
                _ = usr1.recv() => ControlCommand::Pause,
                _ = usr2.recv() => ControlCommand::Continue,
                _ = hup.recv() => ControlCommand::Interrogate,
            };
            log::debug!("Signal mapped to {:?}", command);
            if tx.send(command).await.is_err() {
                break;
            }
        }
    }))
}

/// Forward Ctrl-C as a stop command
#[cfg(not(unix))]
pub fn spawn_signal_commands(tx: mpsc::Sender<ControlCommand>) -> Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send(ControlCommand::Stop).await.is_err() {
                break;
            }
        }
    }))
}

/// Forward each non-empty line as a control command; bad lines are skipped
pub fn spawn_line_commands<R>(reader: R, tx: mpsc::Sender<ControlCommand>) -> JoinHandle<()>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = reader.lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match line.parse::<ControlCommand>() {
                        Ok(command) => {
                            if tx.send(command).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => log::warn!("{}", e),
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    log::warn!("Failed to read control input: {}", e);
                    break;
                }
            }
        }
    })
}

/// Log every status report; resolves to the last one once the loop hangs up
pub fn spawn_status_logger(mut rx: mpsc::Receiver<StatusReport>) -> JoinHandle<Option<StatusReport>> {
    tokio::spawn(async move {
        let mut last = None;
        while let Some(report) = rx.recv().await {
            log::info!("Status {}", report);
            last = Some(report);
        }
        last
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::RunState;

    #[tokio::test]
    async fn test_line_commands_parse_and_skip() {
        let input: &'static [u8] = b"pause\n\nbogus\n7\ncontinue\nstop\n";
        let (tx, mut rx) = mpsc::channel(8);

        spawn_line_commands(input, tx).await.unwrap();

        let mut received = Vec::new();
        while let Ok(command) = rx.try_recv() {
            received.push(command);
        }
        assert_eq!(
            received,
            vec![
                ControlCommand::Pause,
                ControlCommand::Unknown(7),
                ControlCommand::Continue,
                ControlCommand::Stop,
            ]
        );
    }

    #[tokio::test]
    async fn test_line_commands_stop_when_receiver_gone() {
        let input: &'static [u8] = b"pause\ncontinue\n";
        let (tx, rx) = mpsc::channel(8);
        drop(rx);
        // Must finish rather than spin
        spawn_line_commands(input, tx).await.unwrap();
    }

    #[tokio::test]
    async fn test_status_logger_returns_last_report() {
        let (tx, rx) = mpsc::channel(8);
        let handle = spawn_status_logger(rx);

        tx.send(StatusReport::new(RunState::Running)).await.unwrap();
        tx.send(StatusReport::new(RunState::StopPending)).await.unwrap();
        drop(tx);

        let last = handle.await.unwrap();
        assert_eq!(last.map(|r| r.state), Some(RunState::StopPending));
    }

    #[tokio::test]
    async fn test_status_logger_with_no_reports() {
        let (tx, rx) = mpsc::channel::<StatusReport>(8);
        drop(tx);
        assert!(spawn_status_logger(rx).await.unwrap().is_none());
    }
}
