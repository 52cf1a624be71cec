use mockall::automock;
use std::{fmt, path::Path, time::Duration};
use thiserror::Error;

/// A runner that starts real subprocesses with [duct].
pub mod process;

/// The program behind a [Command].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Program {
    /// A program and its arguments, started directly without a shell.
    Exec(Vec<String>),
    /// A user-supplied script, started in a subshell (`/bin/sh` on *nix, `cmd.exe` on Windows).
    Shell(String),
}

/// A command to be started by a [Runner].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    program: Program,
    envs: Vec<(String, String)>,
}

impl Command {
    /// Creates a command from a program name and its arguments.
    pub fn exec<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Command {
            program: Program::Exec(args.into_iter().map(Into::into).collect()),
            envs: vec![],
        }
    }

    /// Creates a command that runs a script in a subshell.
    pub fn shell(script: impl Into<String>) -> Self {
        Command {
            program: Program::Shell(script.into()),
            envs: vec![],
        }
    }

    /// Adds an environment variable on top of the inherited environment.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn envs(&self) -> &[(String, String)] {
        &self.envs
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.program {
            Program::Exec(args) => {
                let joined = shlex::try_join(args.iter().map(String::as_str))
                    .unwrap_or_else(|_| args.join(" "));
                write!(f, "{joined}")
            }
            Program::Shell(script) => write!(f, "{script}"),
        }
    }
}

/// The captured result of a finished command.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecutionResult {
    /// Creates a successful result with the given output, mostly useful in tests.
    pub fn success(stdout: impl Into<String>) -> Self {
        ExecutionResult {
            code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }
}

/// A custom error describing the error cases of running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The underlying process could not be started or waited on.
    #[error("the command cannot run: {0}")]
    Spawn(#[from] std::io::Error),
    /// The command returned a non-zero exit code. The parameters are the command,
    /// the exit code and the captured error output.
    #[error("`{command}` returned non-zero exit code {code} with message: {stderr}")]
    NonZeroExitcode {
        command: String,
        code: i32,
        stderr: String,
    },
    /// The command did not finish in time and was killed.
    #[error("`{command}` did not finish in {timeout:?} and was killed")]
    TimedOut { command: String, timeout: Duration },
    /// The command output contains non-UTF8 characters.
    #[error("`{0}` returned invalid characters")]
    NonUtf8Output(String),
}

impl CommandError {
    /// The captured error output of the command, if there is any.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            CommandError::NonZeroExitcode { stderr, .. } if !stderr.is_empty() => Some(stderr),
            _ => None,
        }
    }
}

/// A runner starts commands synchronously and waits for them to finish.
///
/// Runners may include:
///   - subprocesses ([process::ProcessRunner])
///   - mocks in tests
#[automock]
pub trait Runner {
    /// Run the command in the given directory, failing on a non-zero exit code.
    fn run(&self, command: &Command, directory: &Path) -> Result<ExecutionResult, CommandError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_should_display_exec_commands() {
        let command = Command::exec(["git", "diff", "--name-only", "abc123", "def456"]);

        assert_eq!("git diff --name-only abc123 def456", command.to_string());
    }

    #[test]
    fn it_should_quote_arguments_with_spaces() {
        let command = Command::exec(["git", "commit", "-m", "two words"]);

        assert_ne!("git commit -m two words", command.to_string());
        assert!(command.to_string().contains("two words"));
    }

    #[test]
    fn it_should_display_shell_commands_verbatim() {
        let command = Command::shell("systemctl restart app && echo done");

        assert_eq!("systemctl restart app && echo done", command.to_string());
    }

    #[test]
    fn it_should_collect_environment_variables() {
        let command = Command::shell("true").env("A", "1").env("B", "2");

        assert_eq!(
            &[
                ("A".to_string(), "1".to_string()),
                ("B".to_string(), "2".to_string())
            ],
            command.envs()
        );
    }

    #[test]
    fn it_should_only_expose_non_empty_stderr() {
        let error = CommandError::NonZeroExitcode {
            command: String::from("false"),
            code: 1,
            stderr: String::new(),
        };
        assert_eq!(None, error.stderr());

        let error = CommandError::NonZeroExitcode {
            command: String::from("git pull"),
            code: 1,
            stderr: String::from("CONFLICT"),
        };
        assert_eq!(Some("CONFLICT"), error.stderr());
    }
}
