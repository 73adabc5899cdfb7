//! Child process supervision
//!
//! The supervised child is owned by [`supervise`] for its whole life: every
//! exit path either reaps it or kills and reaps it, and `kill_on_drop` covers
//! the future being dropped mid-await.
//!
//! On unix the child leads its own process group, and every signal goes to the
//! whole group, so helpers the fetcher started (a muxer, a post-processor)
//! never outlive it. Whatever is left of the group when the child exits is
//! killed.

use super::progress::{ExcerptTracker, parse_progress};
use crate::command::Invocation;
use crate::error::FetchError;
use crate::types::Progress;
use futures::StreamExt;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio_util::codec::{AnyDelimiterCodec, FramedRead};
use tokio_util::sync::CancellationToken;

/// Longest single output line kept; longer lines are dropped
const MAX_LINE_BYTES: usize = 1024 * 1024;

/// How long output is still read after the child exits
///
/// A leftover helper may hold the pipes open; the exit status decides the
/// outcome regardless.
const EXIT_DRAIN: Duration = Duration::from_millis(500);

/// Deadline and termination settings for one run
#[derive(Clone, Copy, Debug)]
pub struct ExecutionLimits {
    /// Wall-clock limit for the whole run
    pub timeout: Duration,
    /// Time allowed between the polite termination request and the forced kill
    pub kill_grace: Duration,
}

enum Interrupt {
    TimedOut,
    Cancelled,
}

/// Output lines end at `\n` or `\r`, so carriage-return progress bars stream too
fn line_codec() -> AnyDelimiterCodec {
    AnyDelimiterCodec::new_with_max_length(b"\n\r".to_vec(), Vec::new(), MAX_LINE_BYTES)
}

/// The process group led by a spawned child
///
/// Dropping it SIGKILLs whatever is still in the group.
struct ProcessGroup {
    #[cfg(unix)]
    pgid: Option<libc::pid_t>,
}

impl ProcessGroup {
    fn led_by(pid: Option<u32>) -> Self {
        #[cfg(not(unix))]
        let _ = pid;
        Self {
            #[cfg(unix)]
            pgid: pid
                .and_then(|pid| libc::pid_t::try_from(pid).ok())
                .filter(|pid| *pid > 1),
        }
    }

    /// Send `signal` to every member; false when nobody received it
    #[cfg(unix)]
    fn signal(&self, signal: libc::c_int) -> bool {
        let Some(pgid) = self.pgid else {
            return false;
        };
        // SAFETY: kill(2) takes plain integers. The negated pid addresses the
        // group the child created at spawn, never our own (pgid > 1).
        unsafe { libc::kill(-pgid, signal) == 0 }
    }

    /// Kill every remaining member; later calls do nothing
    ///
    /// Returns whether any process was still there.
    fn kill(&mut self) -> bool {
        #[cfg(unix)]
        let hit = {
            let hit = self.signal(libc::SIGKILL);
            self.pgid = None;
            hit
        };
        #[cfg(not(unix))]
        let hit = false;
        hit
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Run `invocation` to completion, streaming classified lines to `on_line`
pub(crate) async fn supervise(
    invocation: &Invocation,
    limits: ExecutionLimits,
    cancel: &CancellationToken,
    on_line: &mut (dyn for<'l> FnMut(Option<Progress>, &'l str) + Send),
) -> Result<(), FetchError> {
    let spawn_error = |reason: String| FetchError::Spawn {
        program: invocation.program.clone(),
        reason,
    };

    let mut command = Command::new(&invocation.program);
    command
        .args(&invocation.args)
        .current_dir(&invocation.output_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);
    let mut child = command.spawn().map_err(|e| spawn_error(e.to_string()))?;

    let pid = child.id();
    let mut group = ProcessGroup::led_by(pid);
    tracing::debug!(
        executable = %invocation.kind,
        pid = ?pid,
        args = ?invocation.args_lossy(),
        "spawned fetcher"
    );

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| spawn_error("stdout was not captured".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| spawn_error("stderr was not captured".to_string()))?;

    let mut lines = futures::stream::select(
        FramedRead::new(stdout, line_codec()),
        FramedRead::new(stderr, line_codec()),
    );

    let deadline = tokio::time::sleep(limits.timeout);
    tokio::pin!(deadline);
    let mut excerpt = ExcerptTracker::default();
    let mut handle_line = |bytes: &[u8]| {
        let text = String::from_utf8_lossy(bytes);
        let line = text.trim();
        if line.is_empty() {
            return;
        }
        tracing::trace!(executable = %invocation.kind, line, "fetcher output");
        let progress = parse_progress(invocation.kind, line);
        excerpt.observe(line, progress.is_some());
        on_line(progress, line);
    };

    // The exit status decides success, not the pipes closing
    let mut output_open = true;
    let exited = loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break Err(Interrupt::Cancelled),
            _ = &mut deadline => break Err(Interrupt::TimedOut),
            status = child.wait() => break Ok(status),
            next = lines.next(), if output_open => match next {
                Some(Ok(bytes)) => handle_line(&bytes[..]),
                Some(Err(e)) => {
                    tracing::debug!(executable = %invocation.kind, error = %e, "skipping unreadable output line");
                }
                None => output_open = false,
            },
        }
    };

    let interrupted = match exited {
        Ok(status) => {
            let status = status.map_err(|e| spawn_error(e.to_string()))?;
            if output_open {
                let drain = async {
                    while let Some(next) = lines.next().await {
                        if let Ok(bytes) = next {
                            handle_line(&bytes[..]);
                        }
                    }
                };
                if tokio::time::timeout(EXIT_DRAIN, drain).await.is_err() {
                    tracing::debug!(executable = %invocation.kind, "output still open after exit");
                }
            }
            if group.kill() {
                tracing::info!(executable = %invocation.kind, pid = ?pid, "killed processes left behind by fetcher");
            }
            return exit_result(status, &excerpt);
        }
        Err(interrupt) => interrupt,
    };

    terminate(&mut child, &mut group, limits.kill_grace).await;
    match interrupted {
        Interrupt::Cancelled => {
            tracing::info!(executable = %invocation.kind, pid = ?pid, "fetcher cancelled");
            Err(FetchError::Cancelled)
        }
        Interrupt::TimedOut => {
            tracing::warn!(
                executable = %invocation.kind,
                pid = ?pid,
                timeout_secs = limits.timeout.as_secs(),
                "fetcher timed out"
            );
            Err(FetchError::Timeout {
                after: limits.timeout,
            })
        }
    }
}

fn exit_result(status: ExitStatus, excerpt: &ExcerptTracker) -> Result<(), FetchError> {
    if status.success() {
        return Ok(());
    }
    Err(FetchError::NonZeroExit {
        code: status.code(),
        excerpt: excerpt
            .excerpt()
            .unwrap_or_else(|| format!("process exited with {status}")),
    })
}

/// Ask the child's group to stop, then force it after `grace`
///
/// Always reaps the child before returning.
async fn terminate(child: &mut Child, group: &mut ProcessGroup, grace: Duration) {
    #[cfg(unix)]
    if group.signal(libc::SIGTERM) && tokio::time::timeout(grace, child.wait()).await.is_ok() {
        // The leader is gone; helpers it left behind get no further grace
        group.kill();
        return;
    }

    #[cfg(not(unix))]
    let _ = grace;

    group.kill();
    if let Err(e) = child.start_kill() {
        tracing::debug!(error = %e, "kill request failed, child may have exited");
    }
    if let Err(e) = child.wait().await {
        tracing::warn!(error = %e, "failed to reap killed fetcher");
    }
}
