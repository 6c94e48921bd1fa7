//! Control Loop - the service state machine
//!
//! One task waits on two sources at once: the armed minute tick and the
//! host's control commands. Whichever is ready first is handled to
//! completion (including a probe, if one is due) before the next wait.
//!
//! ```text
//! Starting -> Running <-> Paused
//!             Running | Paused -> StopPending (terminal)
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use tokio::sync::mpsc;

use crate::error::{HchkError, Result};
use crate::eventlog::EventLog;
use crate::probe::Probe;
use crate::schedule::{Clock, SystemClock, TickScheduler};

/// Version reported in the start event
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Run state of the service; owned by the control loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Starting,
    Running,
    Paused,
    StopPending,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Starting => "starting",
            RunState::Running => "running",
            RunState::Paused => "paused",
            RunState::StopPending => "stop_pending",
        };
        write!(f, "{}", s)
    }
}

/// Kinds of control command a status report can advertise
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CommandKind {
    Continue,
    Interrogate,
    Pause,
    Stop,
    Shutdown,
}

/// A control request delivered by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Continue,
    Interrogate,
    Pause,
    Stop,
    Shutdown,
    /// A code the service does not understand
    Unknown(u32),
}

impl ControlCommand {
    /// Decode a host control code
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => ControlCommand::Stop,
            2 => ControlCommand::Pause,
            3 => ControlCommand::Continue,
            4 => ControlCommand::Interrogate,
            5 => ControlCommand::Shutdown,
            other => ControlCommand::Unknown(other),
        }
    }
}

impl FromStr for ControlCommand {
    type Err = HchkError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Ok(code) = s.parse::<u32>() {
            return Ok(Self::from_code(code));
        }
        match s.to_lowercase().as_str() {
            "stop" => Ok(ControlCommand::Stop),
            "pause" => Ok(ControlCommand::Pause),
            "continue" | "resume" => Ok(ControlCommand::Continue),
            "interrogate" => Ok(ControlCommand::Interrogate),
            "shutdown" => Ok(ControlCommand::Shutdown),
            _ => Err(HchkError::InvalidCommand(s.to_string())),
        }
    }
}

/// Commands accepted once the service is up
pub fn accepted_commands() -> BTreeSet<CommandKind> {
    BTreeSet::from([
        CommandKind::Pause,
        CommandKind::Continue,
        CommandKind::Stop,
        CommandKind::Shutdown,
    ])
}

/// Status written to the host on every transition and on interrogate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub state: RunState,
    pub accepts: BTreeSet<CommandKind>,
}

impl StatusReport {
    pub fn new(state: RunState) -> Self {
        let accepts = match state {
            RunState::Starting => BTreeSet::new(),
            _ => accepted_commands(),
        };
        Self { state, accepts }
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let accepts: Vec<String> = self
            .accepts
            .iter()
            .map(|k| format!("{:?}", k).to_lowercase())
            .collect();
        write!(f, "state={} accepts=[{}]", self.state, accepts.join(","))
    }
}

/// Counters for one run of the loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Ticks consumed
    pub ticks: u64,
    /// Probes performed
    pub probes: u64,
    /// Probes that did not succeed
    pub failures: u64,
    /// Ticks consumed while paused
    pub skipped: u64,
}

/// What the loop does after handling a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

/// The healthcheck service: state plus its collaborators
pub struct HealthService<P: Probe, L: EventLog, C: Clock = SystemClock> {
    url: String,
    probe: P,
    log: L,
    scheduler: TickScheduler<C>,
    state: RunState,
    stats: LoopStats,
}

impl<P: Probe, L: EventLog> HealthService<P, L, SystemClock> {
    /// Service on the system clock
    pub fn new(url: impl Into<String>, probe: P, log: L) -> Self {
        Self::with_scheduler(url, probe, log, TickScheduler::new())
    }
}

impl<P: Probe, L: EventLog, C: Clock> HealthService<P, L, C> {
    /// Service with a custom tick scheduler
    pub fn with_scheduler(
        url: impl Into<String>,
        probe: P,
        log: L,
        scheduler: TickScheduler<C>,
    ) -> Self {
        Self {
            url: url.into(),
            probe,
            log,
            scheduler,
            state: RunState::Starting,
            stats: LoopStats::default(),
        }
    }

    /// Run until Stop or Shutdown.
    ///
    /// Returns an error only if the host stops reading status reports.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<ControlCommand>,
        status: mpsc::Sender<StatusReport>,
    ) -> Result<LoopStats> {
        self.transition(RunState::Starting, &status).await?;
        let mut tick = self.scheduler.arm();
        self.transition(RunState::Running, &status).await?;

        self.log.info(&format!(
            "Service started url='{}' version='{}'",
            self.url, VERSION
        ));

        loop {
            tokio::select! {
                biased;

                command = commands.recv() => {
                    let command = command.unwrap_or_else(|| {
                        log::warn!("Command channel closed, shutting down");
                        ControlCommand::Shutdown
                    });
                    if self.handle(command, &status).await? == Flow::Exit {
                        break;
                    }
                }
                fired = &mut tick => {
                    self.on_tick(fired).await;
                    tick = self.scheduler.arm();
                }
            }
        }

        self.log.info("Service stopping");
        Ok(self.stats)
    }

    async fn on_tick(&mut self, fired: chrono::DateTime<chrono::Utc>) {
        self.stats.ticks += 1;
        if self.state == RunState::Paused {
            self.stats.skipped += 1;
            log::debug!("Tick at {} skipped while paused", fired);
            return;
        }

        let outcome = self.probe.check(&self.url).await;
        self.stats.probes += 1;
        if outcome.success {
            self.log.info(&outcome.message());
        } else {
            self.stats.failures += 1;
            self.log.error(&outcome.message());
        }
    }

    async fn handle(
        &mut self,
        command: ControlCommand,
        status: &mpsc::Sender<StatusReport>,
    ) -> Result<Flow> {
        log::debug!("Control request {:?} in state {}", command, self.state);
        match command {
            ControlCommand::Continue => {
                self.transition(RunState::Running, status).await?;
                self.log.info("Service resumed");
            }
            ControlCommand::Pause => {
                self.transition(RunState::Paused, status).await?;
                self.log.info("Service paused");
            }
            ControlCommand::Interrogate => {
                self.report(status).await?;
            }
            ControlCommand::Stop | ControlCommand::Shutdown => {
                self.transition(RunState::StopPending, status).await?;
                return Ok(Flow::Exit);
            }
            ControlCommand::Unknown(code) => {
                self.log
                    .error(&format!("Unexpected control request code={}", code));
            }
        }
        Ok(Flow::Continue)
    }

    async fn transition(
        &mut self,
        state: RunState,
        status: &mpsc::Sender<StatusReport>,
    ) -> Result<()> {
        self.state = state;
        self.report(status).await
    }

    async fn report(&self, status: &mpsc::Sender<StatusReport>) -> Result<()> {
        status
            .send(StatusReport::new(self.state))
            .await
            .map_err(|_| HchkError::StatusChannelClosed)
    }
}
