use auto_updater::config::Overrides;
use duration_string::DurationString;
use gumdrop::Options;

/// Poll a git branch, pull new commits, rebuild and restart the service.
#[derive(Debug, Options)]
pub struct Args {
    /// The git repository to keep up to date (default: $REPO_PATH or ".").
    #[options(meta = "PATH")]
    pub repo: Option<String>,

    /// The branch to follow (default: $BRANCH or "main").
    #[options(meta = "NAME")]
    pub branch: Option<String>,

    /// Minutes to wait between checks (default: $INTERVAL_MINUTES or 30).
    #[options(meta = "MINUTES")]
    pub interval: Option<u64>,

    /// The shell command restarting the service after an update (default: $RESTART_CMD).
    #[options(no_short, meta = "COMMAND")]
    pub restart_cmd: Option<String>,

    /// The file to append the logs to (default: $LOG_FILE or "./auto-updater.log").
    #[options(meta = "PATH")]
    pub log: Option<String>,

    /// Kill every command running longer than this (default: $COMMAND_TIMEOUT or 30m).
    ///
    /// Can be a number postfixed with s(econd), m(inutes), h(ours), d(ays)
    #[options(meta = "DURATION")]
    pub timeout: Option<DurationString>,

    /// Check for updates only once and exit. Useful for cronjobs.
    #[options(no_short)]
    pub once: bool,

    /// Increase verbosity, can be set multiple times (-v debug, -vv tracing)
    #[options(count)]
    pub verbose: u8,

    /// Only print errors.
    #[options()]
    pub quiet: bool,

    /// Print the current version.
    #[options(short = "V")]
    pub version: bool,

    /// Print this help.
    #[options()]
    pub help: bool,
}

impl Args {
    /// The values that take precedence over the environment.
    pub fn overrides(&self) -> Overrides {
        Overrides {
            repository: self.repo.clone(),
            branch: self.branch.clone(),
            interval_minutes: self.interval,
            restart_command: self.restart_cmd.clone(),
            log_file: self.log.clone(),
            command_timeout: self.timeout.clone().map(Into::into),
        }
    }
}

pub fn parse_args() -> Args {
    Args::parse_args_default_or_exit()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn parse(args: &[&str]) -> Args {
        Args::parse_args_default(args).unwrap()
    }

    #[test]
    fn it_should_parse_every_flag() {
        let args = parse(&[
            "--repo",
            "/srv/app",
            "--branch",
            "production",
            "--interval",
            "5",
            "--restart-cmd",
            "systemctl restart app",
            "--log",
            "/var/log/updater.log",
            "--timeout",
            "10m",
        ]);

        let overrides = args.overrides();
        assert_eq!(Some(String::from("/srv/app")), overrides.repository);
        assert_eq!(Some(String::from("production")), overrides.branch);
        assert_eq!(Some(5), overrides.interval_minutes);
        assert_eq!(
            Some(String::from("systemctl restart app")),
            overrides.restart_command
        );
        assert_eq!(Some(String::from("/var/log/updater.log")), overrides.log_file);
        assert_eq!(Some(Duration::from_secs(600)), overrides.command_timeout);
    }

    #[test]
    fn it_should_leave_missing_flags_to_the_environment() {
        let overrides = parse(&[]).overrides();

        assert_eq!(None, overrides.repository);
        assert_eq!(None, overrides.branch);
        assert_eq!(None, overrides.interval_minutes);
        assert_eq!(None, overrides.restart_command);
        assert_eq!(None, overrides.log_file);
        assert_eq!(None, overrides.command_timeout);
    }

    #[test]
    fn it_should_count_verbosity() {
        let args = parse(&["-vv", "--once"]);

        assert_eq!(2, args.verbose);
        assert!(args.once);
    }

    #[test]
    fn it_should_fail_on_an_invalid_interval() {
        assert!(Args::parse_args_default(&["--interval", "often"]).is_err());
    }
}
