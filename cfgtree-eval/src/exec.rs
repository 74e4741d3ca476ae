//! Supervision of external action commands.

use std::io::{Read as _, Write as _};
use std::os::fd::{AsRawFd as _, FromRawFd as _, OwnedFd};
use std::process::{Command, Stdio};

use anyhow::{Context as _, Result};
use camino::Utf8PathBuf;
use nix::poll::{poll, PollFd, PollFlags};

const ERRLOC: &str = "_errloc_:";

/// Runs action commands through `sh -c`, draining their combined
/// stdout/stderr incrementally.
///
/// The child is polled every 100 ms so output can be relayed while it
/// runs; once EOF is seen on the pipe the runner waits synchronously for
/// the child itself. Grandchildren holding the pipe's write end are not
/// waited for: the runner exits as soon as the direct child does.
#[derive(Debug, Clone, Default)]
pub struct ActionRunner {
    /// Extra environment for the child (the store roots, edit levels,
    /// `COMMIT_ACTION`, `SIBLING_POSITION`).
    pub envs: Vec<(String, String)>,
    /// Edit location prefixed to the first output as `[location]`.
    pub prepend: Option<String>,
    /// Whether to forward the error-location prefix instead of
    /// stripping it.
    pub forward_errloc: bool,
    /// Per-session log file receiving a copy of all action output.
    pub log_file: Option<Utf8PathBuf>,
}

impl ActionRunner {
    /// Runs `command`, relaying output, and returns its exit status.
    /// A child killed by a signal reports status 1.
    pub fn run(&self, command: &str) -> Result<i32> {
        tracing::debug!(command, "running action");
        let (read_fd, write_fd) =
            nix::unistd::pipe().context("failed to create action pipe")?;
        let read_fd = unsafe { OwnedFd::from_raw_fd(read_fd) };
        let write_fd = unsafe { OwnedFd::from_raw_fd(write_fd) };

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        for (k, v) in &self.envs {
            cmd.env(k, v);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::from(write_fd.try_clone()?));
        cmd.stderr(Stdio::from(write_fd));
        let mut child = cmd.spawn().with_context(|| format!("failed to run {command}"))?;

        let mut first = true;
        let mut wrote = false;
        let mut waited = None;
        let mut pipe = std::fs::File::from(read_fd);
        loop {
            let mut fds = [PollFd::new(pipe.as_raw_fd(), PollFlags::POLLIN)];
            match poll(&mut fds, 100) {
                Ok(0) => {
                    // timeout: check whether the child is done
                    if let Some(status) = child.try_wait()? {
                        waited = Some(status);
                        break;
                    }
                }
                Ok(_) => {
                    let mut buf = [0u8; 4096];
                    let count = pipe.read(&mut buf)?;
                    if count == 0 {
                        break;
                    }
                    self.relay(&buf[..count], &mut first)?;
                    wrote = true;
                }
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => return Err(e).context("failed to poll action output"),
            }
        }
        if wrote {
            println!();
        }
        let status = match waited {
            Some(status) => status,
            None => child.wait()?,
        };
        Ok(status.code().unwrap_or(1))
    }

    // Handles the error-location prefix on the first buffered read: it
    // is either stripped or forwarded, never re-examined later.
    fn relay(&self, chunk: &[u8], first: &mut bool) -> Result<()> {
        let mut out: Vec<u8> = Vec::with_capacity(chunk.len() + 32);
        let mut chunk = chunk;
        if *first {
            *first = false;
            if chunk.len() > ERRLOC.len() && chunk.starts_with(ERRLOC.as_bytes()) {
                // the action prepended its own location; when stripping
                // it the edit location is dropped too
                if !self.forward_errloc {
                    chunk = &chunk[ERRLOC.len()..];
                }
            } else {
                if self.forward_errloc {
                    out.extend_from_slice(ERRLOC.as_bytes());
                }
                if let Some(prepend) = &self.prepend {
                    out.extend_from_slice(format!("[{prepend}]\n").as_bytes());
                }
            }
        }
        out.extend_from_slice(chunk);

        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        handle.write_all(&out)?;
        handle.flush()?;
        if let Some(log) = &self.log_file {
            let mut f = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log)
                .with_context(|| format!("failed to open {log}"))?;
            f.write_all(&out)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_status_reported() {
        let runner = ActionRunner::default();
        assert_eq!(runner.run("exit 0").unwrap(), 0);
        assert_eq!(runner.run("exit 3").unwrap(), 3);
    }

    #[test]
    fn environment_passed() {
        let runner = ActionRunner {
            envs: vec![("COMMIT_ACTION".to_owned(), "SET".to_owned())],
            ..Default::default()
        };
        assert_eq!(runner.run("test \"$COMMIT_ACTION\" = SET").unwrap(), 0);
    }

    #[test]
    fn output_logged() {
        let dir = tempfile::tempdir().unwrap();
        let log = Utf8PathBuf::from_path_buf(dir.path().join("actions.log")).unwrap();
        let runner = ActionRunner {
            log_file: Some(log.clone()),
            ..Default::default()
        };
        runner.run("echo hello-from-action").unwrap();
        let logged = std::fs::read_to_string(&log).unwrap();
        assert!(logged.contains("hello-from-action"));
    }

    #[test]
    fn runner_does_not_wait_for_grandchildren() {
        let runner = ActionRunner::default();
        let start = std::time::Instant::now();
        // the grandchild keeps the pipe open well past the child's exit
        assert_eq!(runner.run("sleep 5 & exit 0").unwrap(), 0);
        assert!(start.elapsed() < std::time::Duration::from_secs(3));
    }
}
