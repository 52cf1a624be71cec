//! Keep a local git checkout in sync with a remote branch, rebuild it and restart the service.
//!
//! ## How it works
//!
//! `auto-updater` is built up from a **scheduler**, a **reconciler** and a **runner**.
//! The scheduler starts a pass right away and then again after every interval,
//! never two at the same time. In every pass the reconciler fetches the branch,
//! compares the commits and, if there are new ones, stashes local changes, pulls,
//! installs the dependencies, builds the project and restarts the service, depending
//! on which files changed. Every git and build command goes through the runner.
//!
//! ```ignore
//! +-----------+       +------------+       +--------+
//! | scheduler | ----> | reconciler | ----> | runner |
//! +-----------+       +------------+       +--------+
//!                            |
//!                            v
//!                      +------------+
//!                      | classifier |
//!                      +------------+
//! ```
//!

/// Decide from the changed files which steps are needed.
pub mod classify;
/// The configuration, built once at startup from defaults, environment and flags.
pub mod config;
/// The update state machine, running one pass (e.g. [fetch, pull and build](reconcile::Reconciler)).
pub mod reconcile;
/// Queries and updates on the local checkout and its project files.
pub mod repository;
/// Starting commands and capturing their output.
pub mod runner;
/// The main program loop, running the passes on a fixed delay.
pub mod schedule;

#[cfg(test)]
mod test_support;
