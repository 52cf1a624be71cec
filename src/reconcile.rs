use crate::{
    classify::{build_required, dependencies_changed},
    config::Config,
    repository::{
        project::{BuildEntry, Project},
        ChangeSet, CommitRef, Diff, GitRepository,
    },
    runner::{Command, CommandError, Runner},
};
use log::{error, info, warn};
use mockall::automock;
use std::{fmt, path::PathBuf};
use thiserror::Error;

/// The steps of a pass, in the order they run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Precondition,
    Bootstrap,
    Checking,
    Applying,
    Installing,
    Building,
    BuildTooling,
    Restarting,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Precondition => "precondition",
            Stage::Bootstrap => "initial build",
            Stage::Checking => "checking",
            Stage::Applying => "applying",
            Stage::Installing => "installing",
            Stage::Building => "building",
            Stage::BuildTooling => "make build",
            Stage::Restarting => "restarting",
        };
        write!(f, "{name}")
    }
}

/// A custom error describing why a pass failed.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The configured directory is not a git repository.
    #[error("{0} is not a valid git repository")]
    NotARepository(PathBuf),
    /// A command failed at the given stage, the remaining steps were skipped.
    #[error("{stage} failed: {source}")]
    Command {
        stage: Stage,
        #[source]
        source: CommandError,
    },
}

impl ReconcileError {
    pub fn stage(&self) -> Stage {
        match self {
            ReconcileError::NotARepository(_) => Stage::Precondition,
            ReconcileError::Command { stage, .. } => *stage,
        }
    }
}

trait AtStage<T> {
    fn at(self, stage: Stage) -> Result<T, ReconcileError>;
}

impl<T> AtStage<T> for Result<T, CommandError> {
    fn at(self, stage: Stage) -> Result<T, ReconcileError> {
        self.map_err(|source| ReconcileError::Command { stage, source })
    }
}

/// The result of one pass.
#[derive(Debug)]
pub enum UpdateOutcome {
    /// The checkout was already at the remote commit.
    NoChange { commit: CommitRef },
    /// The checkout was updated, built and restarted as configured.
    Updated {
        before: CommitRef,
        after: CommitRef,
        changes: ChangeSet,
    },
    /// A step failed, the remaining steps were skipped.
    Failed(ReconcileError),
}

impl UpdateOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, UpdateOutcome::Failed(_))
    }
}

/// Something that brings the checkout up to date, once per call.
#[automock]
pub trait Reconcile {
    /// Run one pass. Failures are reported in the outcome, never raised.
    fn reconcile(&self) -> UpdateOutcome;
}

/// The update state machine: fetch, compare, stash, pull, install, build and restart.
///
/// Every step runs synchronously through the [Runner]. The first failing step
/// ends the pass, nothing is rolled back.
pub struct Reconciler {
    config: Config,
    runner: Box<dyn Runner>,
}

impl Reconciler {
    pub fn new(config: Config, runner: Box<dyn Runner>) -> Self {
        Reconciler { config, runner }
    }

    fn repository(&self) -> GitRepository<'_> {
        GitRepository::new(&self.config.repository, self.runner.as_ref())
    }

    fn run_in_repository(&self, command: &Command) -> Result<(), CommandError> {
        self.runner.run(command, &self.config.repository)?;
        Ok(())
    }

    fn reconcile_inner(&self) -> Result<UpdateOutcome, ReconcileError> {
        let repo = self.repository();
        let project = Project::new(&self.config.repository);
        let capabilities = self.config.capabilities;
        let branch = self.config.branch.as_str();

        if !repo.is_repository() {
            return Err(ReconcileError::NotARepository(
                self.config.repository.clone(),
            ));
        }

        if capabilities.bootstrap && capabilities.build && !project.has_build_output() {
            if let Some(entry) = project.build_entry() {
                self.bootstrap(&project, entry).at(Stage::Bootstrap)?;
            }
        }

        let before = repo.current_commit().at(Stage::Checking)?;
        info!("Current commit: {}.", before.short());
        repo.fetch_remote(branch).at(Stage::Checking)?;
        let after = repo.remote_commit(branch).at(Stage::Checking)?;
        info!("Remote commit: {}.", after.short());

        if before == after {
            info!("No changes, the service is up to date.");
            return Ok(UpdateOutcome::NoChange { commit: before });
        }

        info!(
            "There are updates, updating {} to {}.",
            before.short(),
            after.short()
        );

        if repo.is_dirty().at(Stage::Applying)? {
            warn!("There are local changes in the working tree, stashing them.");
            repo.stash().at(Stage::Applying)?;
        }
        let pull_output = repo.pull(branch).at(Stage::Applying)?;
        pull_output.lines().for_each(|line| info!("git pull: {line}"));

        let changes = match repo.changed_paths(&before, &after) {
            Diff::Changed(changes) => changes,
            Diff::Unavailable(reason) => {
                warn!("Cannot list the changed files, treating as no changes: {reason}.");
                ChangeSet::default()
            }
        };
        info!("Changed files: {changes}.");

        self.install(&project, &changes).at(Stage::Installing)?;
        self.build(&project, &changes).at(Stage::Building)?;
        self.make(&project).at(Stage::BuildTooling)?;
        self.restart(&before, &after).at(Stage::Restarting)?;

        info!("Update completed successfully.");
        Ok(UpdateOutcome::Updated {
            before,
            after,
            changes,
        })
    }

    /// Build a checkout that was never built, so the service can start.
    fn bootstrap(&self, project: &Project, entry: BuildEntry) -> Result<(), CommandError> {
        warn!("The build output is missing or empty, running the initial build.");
        if self.config.capabilities.install && project.has_manifest() {
            info!("Installing dependencies.");
            self.run_in_repository(&Command::exec(["npm", "install"]))?;
            info!("Dependencies installed.");
        }
        self.run_in_repository(&entry.command())?;
        info!("Initial build completed, the service can start.");
        Ok(())
    }

    fn install(&self, project: &Project, changes: &ChangeSet) -> Result<(), CommandError> {
        if !self.config.capabilities.install {
            info!("Dependency install is disabled, skipping npm install.");
        } else if !project.has_manifest() {
            info!("There is no package.json, skipping npm install.");
        } else if !dependencies_changed(changes) {
            info!("Dependencies did not change, skipping npm install.");
        } else {
            info!("Dependencies changed, running npm install.");
            self.run_in_repository(&Command::exec(["npm", "install", "--omit=dev"]))?;
            info!("npm install completed.");
        }
        Ok(())
    }

    fn build(&self, project: &Project, changes: &ChangeSet) -> Result<(), CommandError> {
        if !self.config.capabilities.build {
            info!("Build is disabled, skipping build.");
            return Ok(());
        }
        let Some(entry) = project.build_entry() else {
            info!("There is no build script or TypeScript config, skipping build.");
            return Ok(());
        };
        if !build_required(changes) {
            info!("Sources did not change, skipping build.");
            return Ok(());
        }

        let command = entry.command();
        info!("Sources changed, running {command}.");
        self.run_in_repository(&command)?;
        info!("{command} completed.");
        Ok(())
    }

    fn make(&self, project: &Project) -> Result<(), CommandError> {
        if !self.config.capabilities.make {
            info!("Make build is disabled, skipping make build.");
        } else if !project.has_makefile() {
            info!("There is no Makefile, skipping make build.");
        } else {
            info!("Makefile found, running make build.");
            self.run_in_repository(&Command::exec(["make", "build"]))?;
            info!("make build completed.");
        }
        Ok(())
    }

    fn restart(&self, before: &CommitRef, after: &CommitRef) -> Result<(), CommandError> {
        let Some(restart_command) = &self.config.restart_command else {
            warn!("There is no restart command configured, restart the service manually.");
            return Ok(());
        };

        info!("Restarting the service.");
        let command = Command::shell(restart_command)
            .env("AUTO_UPDATER_BRANCH", &self.config.branch)
            .env("AUTO_UPDATER_BEFORE_COMMIT", before.as_str())
            .env("AUTO_UPDATER_AFTER_COMMIT", after.as_str());
        self.runner.run(&command, &self.config.working_directory)?;
        info!("Service restarted.");
        Ok(())
    }
}

impl Reconcile for Reconciler {
    fn reconcile(&self) -> UpdateOutcome {
        info!("Checking for updates.");
        match self.reconcile_inner() {
            Ok(outcome) => outcome,
            Err(err) => {
                error!("Update failed, we will not continue: {err}.");
                if let ReconcileError::Command { source, .. } = &err {
                    if let Some(stderr) = source.stderr() {
                        stderr.lines().for_each(|line| error!("stderr: {line}"));
                    }
                }
                UpdateOutcome::Failed(err)
            }
        }
    }
}
