//! Child process handle
//!
//! Narrow wrapper around `tokio::process::Child` exposing exactly what a
//! supervisor needs: the two output pipes, graceful terminate, forced kill and
//! wait. On unix the child is placed in its own process group so terminate and
//! kill reach anything the transcoder forked.

use std::fmt;
use std::io;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, ChildStderr, ChildStdout, Command};

use super::command::LaunchSpec;

/// How a child process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code, `None` if the process was terminated by a signal
    pub code: Option<i32>,
}

impl ProcessExit {
    /// Whether the process exited with code 0
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {}", code),
            None => write!(f, "terminated by signal"),
        }
    }
}

impl From<std::process::ExitStatus> for ProcessExit {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

/// Handle to one running transcoder process
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
    pid: Option<u32>,
    program: String,
}

impl ProcessHandle {
    /// Spawn a process with piped stdout/stderr and a null stdin
    pub fn spawn(spec: &LaunchSpec) -> io::Result<Self> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn()?;
        let pid = child.id();

        tracing::debug!(program = %spec.program, pid = ?pid, "Spawned process");

        Ok(Self {
            child,
            pid,
            program: spec.program.clone(),
        })
    }

    /// OS process id, captured at spawn
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Program name
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Take the primary output pipe (stdout)
    pub fn take_output(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Take the diagnostic pipe (stderr)
    pub fn take_diagnostics(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    /// Ask the process to exit (SIGTERM to its process group)
    pub fn terminate(&mut self) -> io::Result<()> {
        #[cfg(unix)]
        {
            self.signal_group(nix::sys::signal::Signal::SIGTERM)
        }

        #[cfg(not(unix))]
        {
            self.child.start_kill()
        }
    }

    /// Force the process to exit (SIGKILL to its process group)
    pub fn kill(&mut self) -> io::Result<()> {
        #[cfg(unix)]
        {
            self.signal_group(nix::sys::signal::Signal::SIGKILL)
        }

        #[cfg(not(unix))]
        {
            self.child.start_kill()
        }
    }

    #[cfg(unix)]
    fn signal_group(&self, signal: nix::sys::signal::Signal) -> io::Result<()> {
        use nix::errno::Errno;
        use nix::sys::signal::killpg;
        use nix::unistd::Pid;

        let Some(pid) = self.pid else {
            return Ok(());
        };

        match killpg(Pid::from_raw(pid as i32), signal) {
            Ok(()) => Ok(()),
            // Group already gone
            Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(io::Error::from_raw_os_error(e as i32)),
        }
    }

    /// Wait for the process to exit
    pub async fn wait(&mut self) -> io::Result<ProcessExit> {
        self.child.wait().await.map(ProcessExit::from)
    }

    /// Terminate, wait up to `grace`, then kill
    ///
    /// Always reaps the child before returning, so the process is fully
    /// released once this resolves.
    pub async fn shutdown(&mut self, grace: Duration) -> io::Result<ProcessExit> {
        if let Some(status) = self.child.try_wait()? {
            return Ok(status.into());
        }

        if let Err(e) = self.terminate() {
            tracing::warn!(pid = ?self.pid, error = %e, "Failed to terminate process");
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => status.map(ProcessExit::from),
            Err(_) => {
                tracing::warn!(
                    pid = ?self.pid,
                    grace_ms = grace.as_millis() as u64,
                    "Process ignored terminate, killing"
                );
                self.kill()?;
                self.wait().await
            }
        }
    }
}
