use crate::runner::Command;
use log::debug;
use serde_json::Value;
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const MANIFEST_FILE: &str = "package.json";
pub const TYPESCRIPT_CONFIG_FILE: &str = "tsconfig.json";
pub const MAKEFILE: &str = "Makefile";
pub const BUILD_OUTPUT_DIRECTORY: &str = "dist";

/// The way the project declares how it should be built.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildEntry {
    /// `package.json` declares a `build` script.
    NpmScript,
    /// There is no build script, but there is a TypeScript configuration.
    TypeScript,
}

impl BuildEntry {
    pub fn command(self) -> Command {
        match self {
            BuildEntry::NpmScript => Command::exec(["npm", "run", "build"]),
            BuildEntry::TypeScript => {
                Command::exec(["npx", "tsc", "--project", TYPESCRIPT_CONFIG_FILE])
            }
        }
    }
}

/// The project files of a checkout, read directly from the filesystem.
pub struct Project {
    root: PathBuf,
}

impl Project {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Project { root: root.into() }
    }

    fn has_file(&self, name: &str) -> bool {
        self.root.join(name).is_file()
    }

    /// Whether there is a `package.json` at the root.
    pub fn has_manifest(&self) -> bool {
        self.has_file(MANIFEST_FILE)
    }

    /// Whether there is a `Makefile` at the root.
    pub fn has_makefile(&self) -> bool {
        self.has_file(MAKEFILE)
    }

    /// Detect how the project should be built, if at all.
    ///
    /// A `build` script in `package.json` wins over a plain `tsconfig.json`.
    /// An unreadable or invalid manifest counts as having no script.
    pub fn build_entry(&self) -> Option<BuildEntry> {
        if self.has_build_script() {
            Some(BuildEntry::NpmScript)
        } else if self.has_file(TYPESCRIPT_CONFIG_FILE) {
            Some(BuildEntry::TypeScript)
        } else {
            None
        }
    }

    fn has_build_script(&self) -> bool {
        let path = self.root.join(MANIFEST_FILE);
        let Ok(contents) = fs::read_to_string(&path) else {
            return false;
        };

        match serde_json::from_str::<Value>(&contents) {
            Ok(manifest) => manifest
                .get("scripts")
                .and_then(|scripts| scripts.get("build"))
                .is_some_and(|build| !build.is_null()),
            Err(err) => {
                debug!("Cannot parse {}: {err}.", path.display());
                false
            }
        }
    }

    /// Whether the build output directory exists and has anything in it.
    pub fn has_build_output(&self) -> bool {
        has_entries(&self.root.join(BUILD_OUTPUT_DIRECTORY))
    }
}

fn has_entries(directory: &Path) -> bool {
    fs::read_dir(directory)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}
