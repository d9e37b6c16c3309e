//! Bounded execution of external helper programs
//!
//! Helpers (`ss`, `lsof`, `systemctl`) run with a wall-clock deadline and an
//! output cap. A reader thread owns the stdout pipe while the calling thread
//! polls the child and keeps sole authority to kill it.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;
use witr_core::{ProbeError, ProbeResult};

use crate::ProbeConfig;

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const REAP_TIMEOUT: Duration = Duration::from_millis(500);

/// Run `program` and return its stdout
///
/// Fails with [`ProbeError::Timeout`] when the deadline passes (the child is
/// killed) and [`ProbeError::CommandFailed`] when it cannot be spawned or
/// exits unsuccessfully. Output past the cap is discarded.
pub fn run_bounded(
    program: &'static str,
    args: &[&str],
    config: &ProbeConfig,
) -> ProbeResult<String> {
    debug!(program, ?args, "running helper");
    let mut child = Command::new(program)
        .args(args)
        .env("LC_ALL", "C")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| ProbeError::CommandFailed {
            program,
            message: e.to_string(),
        })?;

    let stdout = child.stdout.take().ok_or_else(|| ProbeError::CommandFailed {
        program,
        message: "stdout not captured".to_string(),
    })?;

    let cap = config.max_output_bytes as u64;
    let reader = thread::spawn(move || -> std::io::Result<Vec<u8>> {
        let mut stdout = stdout;
        let mut buf = Vec::new();
        (&mut stdout).take(cap).read_to_end(&mut buf)?;
        // keep draining so the child never blocks on a full pipe
        std::io::copy(&mut stdout, &mut std::io::sink())?;
        Ok(buf)
    });

    let deadline = Instant::now() + config.timeout;
    loop {
        if reader.is_finished() {
            let status = reap_or_kill(program, &mut child);
            let buf = match reader.join() {
                Ok(Ok(buf)) => buf,
                Ok(Err(e)) => {
                    return Err(ProbeError::CommandFailed {
                        program,
                        message: e.to_string(),
                    })
                }
                Err(_) => {
                    return Err(ProbeError::CommandFailed {
                        program,
                        message: "output reader panicked".to_string(),
                    })
                }
            };
            return match status {
                Some(s) if s.success() => Ok(String::from_utf8_lossy(&buf).into_owned()),
                Some(s) => Err(ProbeError::CommandFailed {
                    program,
                    message: s.to_string(),
                }),
                None => Err(ProbeError::CommandFailed {
                    program,
                    message: "did not exit after closing stdout".to_string(),
                }),
            };
        }

        if Instant::now() >= deadline {
            debug!(program, "helper timed out, killing");
            let _ = child.kill();
            let _ = reap(&mut child);
            drop(child);
            return Err(ProbeError::Timeout {
                program,
                seconds: config.timeout.as_secs_f64(),
            });
        }

        thread::sleep(POLL_INTERVAL);
    }
}

/// Reap a child whose stdout has closed, killing it if it lingers
///
/// `None` means the child had to be killed; it is still waited on so no
/// zombie is left behind.
fn reap_or_kill(program: &'static str, child: &mut Child) -> Option<ExitStatus> {
    let status = reap(child);
    if status.is_none() {
        debug!(program, "helper closed stdout but kept running, killing");
        let _ = child.kill();
        let _ = reap(child);
    }
    status
}

/// Wait briefly for the child to exit
fn reap(child: &mut Child) -> Option<ExitStatus> {
    let deadline = Instant::now() + REAP_TIMEOUT;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Some(status),
            Ok(None) if Instant::now() < deadline => thread::sleep(POLL_INTERVAL),
            _ => return None,
        }
    }
}
