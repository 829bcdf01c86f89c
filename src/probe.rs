//! Supervision of the external probe processes.
//!
//! One long-running probe process is started per target. Its stdout is read
//! line by line and fed to the [`Monitor`]. When the process exits it is
//! restarted after a backoff delay, and the target's sequence numbering is
//! rebased so the restart does not look like lost probes.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::{PingwatchError, Result};
use crate::monitor::Monitor;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// A run at least this long counts as healthy and resets the backoff.
const HEALTHY_RUN: Duration = Duration::from_secs(30);

/// The program used to probe a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeCommand {
    /// Executable name or path.
    pub program: String,
    /// Arguments placed before the target address.
    pub args: Vec<String>,
}

impl Default for ProbeCommand {
    fn default() -> Self {
        Self {
            program: "ping".to_string(),
            args: Vec::new(),
        }
    }
}

impl ProbeCommand {
    /// Start the probe for `target` with stdout piped.
    pub fn spawn(&self, target: &str) -> Result<Child> {
        Command::new(&self.program)
            .args(&self.args)
            .arg(target)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| PingwatchError::ProbeSpawn {
                target: target.to_string(),
                source,
            })
    }
}

/// Doubling restart delay with an upper bound.
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    initial: Duration,
    max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(INITIAL_BACKOFF, MAX_BACKOFF)
    }
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            current: initial,
            initial,
            max,
        }
    }

    /// The delay to wait now; the following one is doubled.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Run and supervise the probe for `target` until the task is aborted.
///
/// Aborting the returned task kills the running probe process.
pub fn spawn_probe(monitor: Arc<Monitor>, command: ProbeCommand, target: String) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut backoff = Backoff::default();
        let mut restarted = false;

        loop {
            if restarted {
                monitor.probe_restarted(&target);
            }
            restarted = true;

            let started = Instant::now();
            match run_once(&monitor, &command, &target).await {
                Ok(lines) => warn!(target_name = %target, lines, "probe exited"),
                Err(e) => error!(target_name = %target, error = %e, "probe failed"),
            }

            if started.elapsed() >= HEALTHY_RUN {
                backoff.reset();
            }
            let delay = backoff.next_delay();
            debug!(target_name = %target, ?delay, "restarting probe");
            tokio::time::sleep(delay).await;
        }
    })
}

/// Start one probe process and pump its output until it exits.
async fn run_once(monitor: &Monitor, command: &ProbeCommand, target: &str) -> Result<u64> {
    let mut child = command.spawn(target)?;
    info!(target_name = %target, pid = child.id(), "probe started");

    if let Some(stderr) = child.stderr.take() {
        let target = target.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                warn!(target_name = %target, "probe stderr: {}", line);
            }
        });
    }

    let lines = match child.stdout.take() {
        Some(stdout) => pump_lines(stdout, target, monitor).await?,
        None => 0,
    };

    let status = child.wait().await?;
    debug!(target_name = %target, %status, "probe process ended");
    Ok(lines)
}

/// Feed every line of `reader` to the monitor as output for `target`.
///
/// Bytes that are not valid UTF-8 are replaced rather than ending the read.
/// Returns the number of lines that were probe results.
pub async fn pump_lines<R>(reader: R, target: &str, monitor: &Monitor) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut events = 0;
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(events);
        }
        let line = String::from_utf8_lossy(&buf);
        if monitor.handle_line(target, &line).is_some() {
            events += 1;
        }
    }
}
