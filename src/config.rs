use duration_string::DurationString;
use std::{path::PathBuf, time::Duration};
use thiserror::Error;

pub const DEFAULT_REPOSITORY: &str = ".";
pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_INTERVAL_MINUTES: u64 = 30;
pub const DEFAULT_LOG_FILE: &str = "./auto-updater.log";
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Which optional steps of an update are allowed to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    /// Install the dependencies when a manifest or lockfile changed.
    pub install: bool,
    /// Build the project when its sources changed.
    pub build: bool,
    /// Run `make build` whenever there is a Makefile.
    pub make: bool,
    /// Build once before checking for updates, if there is no build output yet.
    pub bootstrap: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Capabilities {
            install: true,
            build: true,
            make: true,
            bootstrap: true,
        }
    }
}

/// Values given on the command line, taking precedence over the environment.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub repository: Option<String>,
    pub branch: Option<String>,
    pub interval_minutes: Option<u64>,
    pub restart_command: Option<String>,
    pub log_file: Option<String>,
    pub command_timeout: Option<Duration>,
}

/// A custom error describing an invalid configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The interval is not a positive number of minutes.
    #[error("interval must be a positive number of minutes, got {0:?}")]
    InvalidInterval(String),
    /// The command timeout cannot be parsed as a duration.
    #[error("command timeout must be a duration like 90s or 10m, got {0:?}")]
    InvalidTimeout(String),
    /// The branch name is empty.
    #[error("branch cannot be empty")]
    EmptyBranch,
}

/// The configuration of the daemon, built once at startup and never changed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// The checkout to keep up to date.
    pub repository: PathBuf,
    pub branch: String,
    /// The delay between the end of a pass and the start of the next one.
    pub interval: Duration,
    /// Shell command restarting the service after an update.
    pub restart_command: Option<String>,
    pub capabilities: Capabilities,
    pub log_file: Option<PathBuf>,
    pub command_timeout: Duration,
    /// The directory of the daemon itself, the restart command runs here.
    pub working_directory: PathBuf,
}

impl Config {
    /// Build the configuration from the defaults, then the environment (read with
    /// `env`) and finally the command line overrides.
    pub fn load<F>(
        env: F,
        overrides: Overrides,
        working_directory: PathBuf,
    ) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // An empty variable counts as unset
        let env = |key: &str| env(key).filter(|value| !value.trim().is_empty());
        let enabled = |key: &str| env(key).as_deref() != Some("false");

        let repository = overrides
            .repository
            .or_else(|| env("REPO_PATH"))
            .unwrap_or_else(|| DEFAULT_REPOSITORY.to_string());

        let branch = overrides
            .branch
            .or_else(|| env("BRANCH"))
            .unwrap_or_else(|| DEFAULT_BRANCH.to_string());
        if branch.trim().is_empty() {
            return Err(ConfigError::EmptyBranch);
        }

        let interval_minutes = match overrides.interval_minutes {
            Some(minutes) => minutes,
            None => match env("INTERVAL_MINUTES") {
                Some(value) => value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidInterval(value))?,
                None => DEFAULT_INTERVAL_MINUTES,
            },
        };
        let interval = match interval_minutes.checked_mul(60) {
            Some(seconds) if seconds > 0 => Duration::from_secs(seconds),
            _ => return Err(ConfigError::InvalidInterval(interval_minutes.to_string())),
        };

        let restart_command = overrides
            .restart_command
            .or_else(|| env("RESTART_CMD"))
            .filter(|command| !command.trim().is_empty());

        let log_file = overrides
            .log_file
            .or_else(|| env("LOG_FILE"))
            .unwrap_or_else(|| DEFAULT_LOG_FILE.to_string());
        let log_file = (!log_file.is_empty()).then(|| PathBuf::from(log_file));

        let command_timeout = match overrides.command_timeout {
            Some(timeout) => timeout,
            None => match env("COMMAND_TIMEOUT") {
                Some(value) => value
                    .trim()
                    .parse::<DurationString>()
                    .map_err(|_| ConfigError::InvalidTimeout(value))?
                    .into(),
                None => DEFAULT_COMMAND_TIMEOUT,
            },
        };

        Ok(Config {
            repository: PathBuf::from(repository),
            branch,
            interval,
            restart_command,
            capabilities: Capabilities {
                install: enabled("RUN_NPM_INSTALL"),
                build: enabled("RUN_NPM_BUILD"),
                make: enabled("RUN_MAKE_BUILD"),
                bootstrap: enabled("BOOTSTRAP_BUILD"),
            },
            log_file,
            command_timeout,
            working_directory,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)], overrides: Overrides) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::load(
            |key| vars.get(key).cloned(),
            overrides,
            PathBuf::from("/srv/daemon"),
        )
    }

    #[test]
    fn it_should_use_the_defaults() -> Result<(), ConfigError> {
        let config = load(&[], Overrides::default())?;

        assert_eq!(PathBuf::from("."), config.repository);
        assert_eq!("main", config.branch);
        assert_eq!(Duration::from_secs(30 * 60), config.interval);
        assert_eq!(None, config.restart_command);
        assert_eq!(Capabilities::default(), config.capabilities);
        assert_eq!(Some(PathBuf::from("./auto-updater.log")), config.log_file);
        assert_eq!(DEFAULT_COMMAND_TIMEOUT, config.command_timeout);
        assert_eq!(PathBuf::from("/srv/daemon"), config.working_directory);

        Ok(())
    }

    #[test]
    fn it_should_read_the_environment() -> Result<(), ConfigError> {
        let config = load(
            &[
                ("REPO_PATH", "/srv/app"),
                ("BRANCH", "production"),
                ("INTERVAL_MINUTES", "5"),
                ("RESTART_CMD", "systemctl restart app"),
                ("RUN_NPM_INSTALL", "false"),
                ("RUN_MAKE_BUILD", "false"),
                ("LOG_FILE", "/var/log/updater.log"),
                ("COMMAND_TIMEOUT", "10m"),
            ],
            Overrides::default(),
        )?;

        assert_eq!(PathBuf::from("/srv/app"), config.repository);
        assert_eq!("production", config.branch);
        assert_eq!(Duration::from_secs(5 * 60), config.interval);
        assert_eq!(
            Some(String::from("systemctl restart app")),
            config.restart_command
        );
        assert_eq!(
            Capabilities {
                install: false,
                build: true,
                make: false,
                bootstrap: true,
            },
            config.capabilities
        );
        assert_eq!(Some(PathBuf::from("/var/log/updater.log")), config.log_file);
        assert_eq!(Duration::from_secs(10 * 60), config.command_timeout);

        Ok(())
    }

    #[test]
    fn it_should_prefer_the_overrides() -> Result<(), ConfigError> {
        let config = load(
            &[
                ("REPO_PATH", "/srv/app"),
                ("BRANCH", "production"),
                ("INTERVAL_MINUTES", "5"),
                ("RESTART_CMD", "systemctl restart app"),
            ],
            Overrides {
                repository: Some(String::from("/srv/other")),
                branch: Some(String::from("staging")),
                interval_minutes: Some(1),
                restart_command: Some(String::from("pm2 restart other")),
                log_file: Some(String::from("other.log")),
                command_timeout: Some(Duration::from_secs(90)),
            },
        )?;

        assert_eq!(PathBuf::from("/srv/other"), config.repository);
        assert_eq!("staging", config.branch);
        assert_eq!(Duration::from_secs(60), config.interval);
        assert_eq!(
            Some(String::from("pm2 restart other")),
            config.restart_command
        );
        assert_eq!(Some(PathBuf::from("other.log")), config.log_file);
        assert_eq!(Duration::from_secs(90), config.command_timeout);

        Ok(())
    }

    #[test]
    fn it_should_only_disable_capabilities_on_false() -> Result<(), ConfigError> {
        let config = load(
            &[
                ("RUN_NPM_INSTALL", "0"),
                ("RUN_NPM_BUILD", "false"),
                ("BOOTSTRAP_BUILD", "false"),
            ],
            Overrides::default(),
        )?;

        assert!(config.capabilities.install);
        assert!(!config.capabilities.build);
        assert!(config.capabilities.make);
        assert!(!config.capabilities.bootstrap);

        Ok(())
    }

    #[test]
    fn it_should_treat_empty_variables_as_unset() -> Result<(), ConfigError> {
        let config = load(
            &[
                ("REPO_PATH", ""),
                ("BRANCH", ""),
                ("INTERVAL_MINUTES", ""),
                ("LOG_FILE", ""),
                ("COMMAND_TIMEOUT", " "),
                ("RUN_NPM_BUILD", ""),
            ],
            Overrides::default(),
        )?;

        assert_eq!(PathBuf::from("."), config.repository);
        assert_eq!("main", config.branch);
        assert_eq!(Duration::from_secs(30 * 60), config.interval);
        assert_eq!(Some(PathBuf::from("./auto-updater.log")), config.log_file);
        assert_eq!(DEFAULT_COMMAND_TIMEOUT, config.command_timeout);
        assert!(config.capabilities.build);

        Ok(())
    }

    #[test]
    fn it_should_disable_the_log_file_with_an_empty_flag() -> Result<(), ConfigError> {
        let config = load(
            &[("LOG_FILE", "/var/log/updater.log")],
            Overrides {
                log_file: Some(String::new()),
                ..Overrides::default()
            },
        )?;

        assert_eq!(None, config.log_file);

        Ok(())
    }

    #[test]
    fn it_should_ignore_an_empty_restart_command() -> Result<(), ConfigError> {
        let config = load(&[("RESTART_CMD", "  ")], Overrides::default())?;

        assert_eq!(None, config.restart_command);

        Ok(())
    }

    #[test]
    fn it_should_fail_on_an_invalid_interval() {
        let result = load(&[("INTERVAL_MINUTES", "often")], Overrides::default());
        assert!(
            matches!(result, Err(ConfigError::InvalidInterval(_))),
            "{result:?} should be InvalidInterval"
        );

        let result = load(
            &[],
            Overrides {
                interval_minutes: Some(0),
                ..Overrides::default()
            },
        );
        assert!(
            matches!(result, Err(ConfigError::InvalidInterval(_))),
            "{result:?} should be InvalidInterval"
        );
    }

    #[test]
    fn it_should_fail_on_an_overflowing_interval() {
        let result = load(
            &[],
            Overrides {
                interval_minutes: Some(u64::MAX),
                ..Overrides::default()
            },
        );
        assert!(
            matches!(result, Err(ConfigError::InvalidInterval(_))),
            "{result:?} should be InvalidInterval"
        );

        let result = load(
            &[("INTERVAL_MINUTES", "18446744073709551615")],
            Overrides::default(),
        );
        assert!(
            matches!(result, Err(ConfigError::InvalidInterval(_))),
            "{result:?} should be InvalidInterval"
        );
    }

    #[test]
    fn it_should_fail_on_an_invalid_timeout() {
        let result = load(&[("COMMAND_TIMEOUT", "forever")], Overrides::default());

        assert!(
            matches!(result, Err(ConfigError::InvalidTimeout(_))),
            "{result:?} should be InvalidTimeout"
        );
    }

    #[test]
    fn it_should_fail_on_an_empty_branch_flag() {
        let result = load(
            &[("BRANCH", "production")],
            Overrides {
                branch: Some(String::from(" ")),
                ..Overrides::default()
            },
        );

        assert!(
            matches!(result, Err(ConfigError::EmptyBranch)),
            "{result:?} should be EmptyBranch"
        );
    }
}
