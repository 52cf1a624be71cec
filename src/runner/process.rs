use super::{Command, CommandError, ExecutionResult, Program, Runner};
use duct::{cmd, Expression, Handle};
use duct_sh::sh_dangerous;
use log::{debug, info, trace};
use std::{
    path::Path,
    process::Output,
    thread::sleep,
    time::{Duration, Instant},
};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A runner that starts every command as a real subprocess.
///
/// Both the stdout and stderr are captured separately. Commands inherit the
/// environment of the daemon with `CI=true` added, so package managers never
/// wait for interactive input. If a timeout is set, a command running longer
/// is killed and reported as [CommandError::TimedOut]. On unix every command
/// leads its own process group, so the whole group is killed with it.
pub struct ProcessRunner {
    timeout: Option<Duration>,
}

impl ProcessRunner {
    /// Creates a runner that waits for commands indefinitely.
    pub fn new() -> Self {
        ProcessRunner { timeout: None }
    }

    /// Creates a runner that kills commands running longer than the timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        ProcessRunner {
            timeout: Some(timeout),
        }
    }

    fn expression(command: &Command, directory: &Path) -> Option<Expression> {
        let mut expression = match command.program() {
            Program::Exec(args) => {
                let (program, args) = args.split_first()?;
                cmd(program, args)
            }
            // We can run `sh_dangerous`, because the script comes from the user's own configuration.
            Program::Shell(script) => sh_dangerous(script),
        };

        expression = expression.env("CI", "true");
        for (key, value) in command.envs() {
            expression = expression.env(key, value);
        }

        Some(own_process_group(
            expression
                .stdout_capture()
                .stderr_capture()
                .dir(directory)
                .unchecked(),
        ))
    }

    fn wait(&self, command: &Command, expression: Expression) -> Result<Output, CommandError> {
        let handle = expression.start()?;

        let Some(timeout) = self.timeout else {
            return Ok(handle.wait()?.clone());
        };

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(output) = handle.try_wait()? {
                return Ok(output.clone());
            }
            if Instant::now() >= deadline {
                kill_process_group(&handle);
                handle.kill()?;
                return Err(CommandError::TimedOut {
                    command: command.to_string(),
                    timeout,
                });
            }
            sleep(POLL_INTERVAL);
        }
    }
}

#[cfg(unix)]
fn own_process_group(expression: Expression) -> Expression {
    use std::os::unix::process::CommandExt;

    expression.before_spawn(|command| {
        command.process_group(0);
        Ok(())
    })
}

#[cfg(not(unix))]
fn own_process_group(expression: Expression) -> Expression {
    expression
}

/// Kill everything the command started, the group id is the pid of its leader.
#[cfg(unix)]
fn kill_process_group(handle: &Handle) {
    use nix::{
        sys::signal::{killpg, Signal},
        unistd::Pid,
    };

    for pid in handle.pids() {
        if let Err(err) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            debug!("Cannot kill the process group {pid}: {err}.");
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_handle: &Handle) {
    debug!("Process groups are not supported on non-unix systems.");
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner for ProcessRunner {
    fn run(&self, command: &Command, directory: &Path) -> Result<ExecutionResult, CommandError> {
        info!("$ {command}");

        let expression = Self::expression(command, directory).ok_or_else(|| {
            CommandError::Spawn(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty command",
            ))
        })?;
        trace!("Parsed {command} to {expression:?}.");

        let output = self.wait(command, expression)?;

        let stdout = String::from_utf8(output.stdout)
            .map_err(|_| CommandError::NonUtf8Output(command.to_string()))?;
        let stderr = String::from_utf8(output.stderr)
            .map_err(|_| CommandError::NonUtf8Output(command.to_string()))?;
        let stdout = stdout.trim().to_string();
        let stderr = stderr.trim().to_string();

        if output.status.success() {
            Ok(ExecutionResult {
                code: 0,
                stdout,
                stderr,
            })
        } else {
            Err(CommandError::NonZeroExitcode {
                command: command.to_string(),
                code: output.status.code().unwrap_or(-1),
                stderr: if stderr.is_empty() { stdout } else { stderr },
            })
        }
    }
}
