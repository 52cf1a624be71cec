use crate::repository::ChangeSet;
use std::path::Path;

/// Root-level files that declare or pin the project's dependencies.
pub const DEPENDENCY_FILES: &[&str] = &[
    "package.json",
    "package-lock.json",
    "npm-shrinkwrap.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "bun.lockb",
];

/// Extensions of source files that have to be compiled.
pub const SOURCE_EXTENSIONS: &[&str] = &["ts", "tsx", "mts", "cts"];

/// Files that configure the build.
pub const BUILD_CONFIG_FILES: &[&str] = &["tsconfig.json", "tsconfig.build.json"];

/// Directories holding the sources.
pub const SOURCE_DIRECTORIES: &[&str] = &["src/"];

/// Whether any manifest or lockfile changed, meaning the dependencies have to be installed.
pub fn dependencies_changed(changes: &ChangeSet) -> bool {
    changes.iter().any(|path| DEPENDENCY_FILES.contains(&path))
}

/// Whether any source file or build configuration changed, meaning the project has to be rebuilt.
pub fn build_required(changes: &ChangeSet) -> bool {
    changes.iter().any(|path| {
        let has_source_extension = Path::new(path)
            .extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| SOURCE_EXTENSIONS.contains(&extension));

        has_source_extension
            || BUILD_CONFIG_FILES.contains(&path)
            || SOURCE_DIRECTORIES
                .iter()
                .any(|directory| path.starts_with(directory))
    })
}
