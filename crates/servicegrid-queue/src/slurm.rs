//! Slurm CLI implementation of [`JobQueue`].

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use servicegrid_state::{JobId, QueueJobState, QueueJobStatus};

use crate::error::{QueueError, QueueResult};
use crate::JobQueue;

/// `squeue` output format: job id, state, node list, time used.
const SQUEUE_FORMAT: &str = "%i|%T|%N|%M";

/// Talks to Slurm through its command line tools.
#[derive(Debug, Clone)]
pub struct SlurmQueue {
    squeue: PathBuf,
    scancel: PathBuf,
    user: Option<String>,
}

impl SlurmQueue {
    pub fn new(squeue: impl Into<PathBuf>, scancel: impl Into<PathBuf>) -> Self {
        Self {
            squeue: squeue.into(),
            scancel: scancel.into(),
            user: None,
        }
    }

    /// Restrict status queries to one user's jobs.
    pub fn with_user(mut self, user: Option<String>) -> Self {
        self.user = user;
        self
    }

    async fn run(&self, program: &Path, args: &[String]) -> QueueResult<String> {
        let command = program.display().to_string();
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| QueueError::Spawn {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(QueueError::Exit {
                command,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl JobQueue for SlurmQueue {
    async fn status(&self, job_ids: &[JobId]) -> QueueResult<Vec<QueueJobStatus>> {
        if job_ids.is_empty() {
            return Ok(Vec::new());
        }

        // Query the whole (user's) queue rather than `--jobs`: squeue fails
        // outright when asked about a purged job id.
        let mut args = vec!["--noheader".to_string(), format!("--format={SQUEUE_FORMAT}")];
        if let Some(ref user) = self.user {
            args.push(format!("--user={user}"));
        }

        let stdout = self.run(&self.squeue, &args).await?;
        let statuses: Vec<QueueJobStatus> = parse_squeue_output(&stdout)
            .into_iter()
            .filter(|s| job_ids.contains(&s.job_id))
            .collect();
        debug!(requested = job_ids.len(), found = statuses.len(), "queue status");
        Ok(statuses)
    }

    async fn cancel(&self, job_id: &str) -> QueueResult<()> {
        self.run(&self.scancel, &[job_id.to_string()]).await?;
        debug!(%job_id, "cancel requested");
        Ok(())
    }
}

/// Parse `squeue --noheader --format=%i|%T|%N|%M` output.
///
/// Lines that do not have four fields or carry an unreadable time are
/// skipped.
pub fn parse_squeue_output(stdout: &str) -> Vec<QueueJobStatus> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let fields: Vec<&str> = line.split('|').map(str::trim).collect();
            let [job_id, state, node, time] = fields.as_slice() else {
                warn!(%line, "skipping malformed squeue line");
                return None;
            };
            let Some(elapsed) = parse_squeue_time(time) else {
                warn!(%line, "skipping squeue line with unreadable time");
                return None;
            };
            let host = first_node(node);
            Some(QueueJobStatus {
                job_id: job_id.to_string(),
                state: QueueJobState::from_slurm(state),
                host,
                elapsed,
            })
        })
        .collect()
}

/// First host of a Slurm node list: `node[01-04]` → `node01`,
/// `gpu03,gpu07` → `gpu03`. Pending jobs show a reason such as
/// `(Resources)` instead, which yields `None`.
pub fn first_node(list: &str) -> Option<String> {
    let list = list.trim();
    if matches!(list, "" | "(null)" | "n/a") || list.starts_with('(') {
        return None;
    }

    let bracket = list.find('[');
    let comma = list.find(',');
    let node = match bracket {
        Some(b) if comma.is_none_or(|c| b < c) => {
            let prefix = &list[..b];
            let inner = &list[b + 1..];
            let range = &inner[..inner.find(']')?];
            let first = range.split(',').next()?.split('-').next()?.trim();
            if prefix.is_empty() || first.is_empty() {
                return None;
            }
            format!("{prefix}{first}")
        }
        _ => match comma {
            Some(c) => list[..c].trim().to_string(),
            None => list.to_string(),
        },
    };
    (!node.is_empty()).then_some(node)
}

/// Parse a Slurm time value.
///
/// Accepts `M:SS`, `H:MM:SS`, `D-HH`, `D-HH:MM` and `D-HH:MM:SS`.
/// `INVALID`, `UNLIMITED` and `N/A` read as zero.
pub fn parse_squeue_time(s: &str) -> Option<Duration> {
    let s = s.trim();
    if matches!(s, "INVALID" | "UNLIMITED" | "N/A" | "NOT_SET") {
        return Some(Duration::ZERO);
    }

    let (days, clock) = match s.split_once('-') {
        Some((d, rest)) => (d.parse::<u64>().ok()?, rest),
        None => (0, s),
    };
    let parts: Vec<u64> = clock
        .split(':')
        .map(|p| p.parse::<u64>().ok())
        .collect::<Option<_>>()?;

    let (h, m, sec) = match (s.contains('-'), parts.as_slice()) {
        // With a day prefix the fields start at hours.
        (true, [h]) => (*h, 0, 0),
        (true, [h, m]) => (*h, *m, 0),
        (_, [h, m, sec]) => (*h, *m, *sec),
        (false, [m, sec]) => (0, *m, *sec),
        (false, [sec]) => (0, 0, *sec),
        _ => return None,
    };
    let secs = days
        .checked_mul(86_400)?
        .checked_add(h.checked_mul(3600)?)?
        .checked_add(m.checked_mul(60)?)?
        .checked_add(sec)?;
    Some(Duration::from_secs(secs))
}
