use crate::runner::{Command, CommandError, Runner};
use log::debug;
use std::{fmt, path::PathBuf};

/// Filesystem checks for the project files inside the checkout.
pub mod project;

/// The remote every branch is fetched from and pulled from.
pub const REMOTE_NAME: &str = "origin";

const SHORT_HASH_LENGTH: usize = 8;

/// A commit hash. Two references are equal if they name the same commit.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CommitRef(String);

impl CommitRef {
    pub fn new(hash: impl Into<String>) -> Self {
        CommitRef(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The first few characters of the hash, for logging.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(SHORT_HASH_LENGTH) {
            Some((end, _)) => &self.0[..end],
            None => &self.0,
        }
    }
}

impl fmt::Display for CommitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Repository-relative paths that differ between two commits.
///
/// The order follows git's output, but only the membership is meaningful.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeSet(Vec<String>);

impl ChangeSet {
    pub fn new(paths: Vec<String>) -> Self {
        ChangeSet(paths)
    }

    /// Parse the output of `git diff --name-only`, one path per line.
    ///
    /// Paths with special or non-ASCII characters are quoted by git, these are unquoted.
    pub fn parse(output: &str) -> Self {
        output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(unquote_path)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.iter().any(|p| p == path)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Undo the C-style quoting of `core.quotePath`, e.g. `"src/caf\303\251.ts"`.
fn unquote_path(line: &str) -> String {
    let Some(quoted) = line
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    else {
        return line.to_string();
    };

    let mut bytes = Vec::with_capacity(quoted.len());
    let mut chars = quoted.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buffer = [0; 4];
            bytes.extend_from_slice(c.encode_utf8(&mut buffer).as_bytes());
            continue;
        }
        match chars.next() {
            Some('a') => bytes.push(0x07),
            Some('b') => bytes.push(0x08),
            Some('t') => bytes.push(b'\t'),
            Some('n') => bytes.push(b'\n'),
            Some('v') => bytes.push(0x0b),
            Some('f') => bytes.push(0x0c),
            Some('r') => bytes.push(b'\r'),
            Some(digit @ '0'..='7') => {
                let mut value = digit as u32 - '0' as u32;
                for _ in 0..2 {
                    match chars.peek() {
                        Some(next @ '0'..='7') => {
                            value = value * 8 + (*next as u32 - '0' as u32);
                            chars.next();
                        }
                        _ => break,
                    }
                }
                bytes.push(value as u8);
            }
            Some(other) => {
                let mut buffer = [0; 4];
                bytes.extend_from_slice(other.encode_utf8(&mut buffer).as_bytes());
            }
            None => bytes.push(b'\\'),
        }
    }

    String::from_utf8_lossy(&bytes).into_owned()
}

impl FromIterator<String> for ChangeSet {
    fn from_iter<T: IntoIterator<Item = String>>(iter: T) -> Self {
        ChangeSet(iter.into_iter().collect())
    }
}

impl fmt::Display for ChangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(", "))
    }
}

/// The result of diffing two commits.
///
/// Computing the diff is best-effort: a failed diff must not abort an otherwise
/// successful update, so it is kept apart from a diff that found nothing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Diff {
    /// The diff succeeded with these paths (possibly none).
    Changed(ChangeSet),
    /// The diff failed, the reason is kept for logging.
    Unavailable(String),
}

impl Diff {
    /// The changed paths, an unavailable diff counts as no changes.
    pub fn into_changes(self) -> ChangeSet {
        match self {
            Diff::Changed(changes) => changes,
            Diff::Unavailable(_) => ChangeSet::default(),
        }
    }
}

/// Read and write access to a local git checkout through the `git` command line.
///
/// Every command runs in the repository directory.
pub struct GitRepository<'a> {
    directory: PathBuf,
    runner: &'a dyn Runner,
}

impl<'a> GitRepository<'a> {
    pub fn new(directory: impl Into<PathBuf>, runner: &'a dyn Runner) -> Self {
        GitRepository {
            directory: directory.into(),
            runner,
        }
    }

    fn git(&self, args: &[&str]) -> Result<String, CommandError> {
        let command = Command::exec(std::iter::once("git").chain(args.iter().copied()));
        let result = self.runner.run(&command, &self.directory)?;
        Ok(result.stdout)
    }

    /// Whether the directory contains the `.git` metadata marker.
    pub fn is_repository(&self) -> bool {
        self.directory.join(".git").exists()
    }

    /// Resolve the commit currently checked out.
    pub fn current_commit(&self) -> Result<CommitRef, CommandError> {
        Ok(CommitRef::new(self.git(&["rev-parse", "HEAD"])?))
    }

    /// Download the refs of the branch, without touching the working tree.
    pub fn fetch_remote(&self, branch: &str) -> Result<(), CommandError> {
        self.git(&["fetch", REMOTE_NAME, branch])?;
        Ok(())
    }

    /// Resolve the tip of the fetched remote branch.
    pub fn remote_commit(&self, branch: &str) -> Result<CommitRef, CommandError> {
        let remote_branch = format!("{REMOTE_NAME}/{branch}");
        Ok(CommitRef::new(self.git(&["rev-parse", &remote_branch])?))
    }

    /// Whether there are uncommitted changes, tracked or untracked.
    pub fn is_dirty(&self) -> Result<bool, CommandError> {
        Ok(!self.git(&["status", "--porcelain"])?.is_empty())
    }

    /// List the paths that differ between the two commits.
    pub fn changed_paths(&self, before: &CommitRef, after: &CommitRef) -> Diff {
        match self.git(&["diff", "--name-only", before.as_str(), after.as_str()]) {
            Ok(output) => Diff::Changed(ChangeSet::parse(&output)),
            Err(err) => {
                debug!("Cannot diff {} and {}: {err}.", before.short(), after.short());
                Diff::Unavailable(err.to_string())
            }
        }
    }

    /// Put the uncommitted changes aside. They are never reapplied automatically.
    pub fn stash(&self) -> Result<(), CommandError> {
        self.git(&["stash"])?;
        Ok(())
    }

    /// Bring the local branch up to the remote branch, returning git's output.
    pub fn pull(&self, branch: &str) -> Result<String, CommandError> {
        self.git(&["pull", REMOTE_NAME, branch])
    }
}
