//! Script discovery from the filesystem and embedded bundles.

use std::collections::HashMap;
use std::path::PathBuf;

use include_dir::Dir;
use tracing::debug;

use crate::config::{Encoding, EngineConfig, NamingConvention};
use crate::error::{CoreError, CoreResult};
use crate::script::{Category, MigrationScript, ScriptBody};

/// Enumerates migration scripts for a run.
pub trait MigrationLoader: Send + Sync {
    /// Versioned scripts, ascending by version.
    fn versioned_migrations(&self) -> CoreResult<Vec<MigrationScript>>;

    /// Repeatable scripts, in a stable order.
    fn repeatable_migrations(&self) -> CoreResult<Vec<MigrationScript>>;
}

/// Reject duplicate versions, duplicate names and cross-category name
/// collisions before a run works with the script sets.
pub fn verify_unique(
    versioned: &[MigrationScript],
    repeatable: &[MigrationScript],
) -> CoreResult<()> {
    let mut by_version: HashMap<String, &str> = HashMap::new();
    for script in versioned {
        let version = script
            .version()
            .expect("versioned script carries a version")
            .to_string();
        if let Some(previous) = by_version.insert(version.clone(), script.name()) {
            return Err(CoreError::configuration(format!(
                "found more than one script with version {version}: {previous}, {}",
                script.name()
            )));
        }
    }

    let mut by_name: HashMap<&str, Category> = HashMap::new();
    for script in versioned.iter().chain(repeatable.iter()) {
        if by_name.insert(script.name(), script.category()).is_some() {
            return Err(CoreError::configuration(format!(
                "found more than one script named {}",
                script.name()
            )));
        }
    }
    Ok(())
}

/// Loads scripts from one or more directories on disk.
///
/// A directory that does not exist is skipped; files whose names do not
/// match the naming convention are ignored.
pub struct FileLoader {
    locations: Vec<PathBuf>,
    naming: NamingConvention,
    encoding: Encoding,
}

impl FileLoader {
    /// Create a loader over the given directories.
    pub fn new(
        locations: impl IntoIterator<Item = PathBuf>,
        naming: NamingConvention,
        encoding: Encoding,
    ) -> Self {
        Self {
            locations: locations.into_iter().collect(),
            naming,
            encoding,
        }
    }

    /// Create a loader from the engine configuration.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.locations.iter().cloned(),
            config.naming.clone(),
            config.encoding,
        )
    }

    fn scan(&self) -> CoreResult<Vec<MigrationScript>> {
        let mut scripts = Vec::new();
        for location in &self.locations {
            if !location.is_dir() {
                debug!(location = %location.display(), "script location does not exist, skipping");
                continue;
            }
            let mut paths: Vec<PathBuf> = std::fs::read_dir(location)?
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|path| path.is_file())
                .collect();
            paths.sort();

            for path in paths {
                let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                if let Some(script) = MigrationScript::from_file_name(
                    file_name,
                    ScriptBody::File(path.clone()),
                    &self.naming,
                    self.encoding,
                )? {
                    scripts.push(script);
                }
            }
        }
        debug!(count = scripts.len(), "scripts discovered on disk");
        Ok(scripts)
    }
}

impl MigrationLoader for FileLoader {
    fn versioned_migrations(&self) -> CoreResult<Vec<MigrationScript>> {
        let mut scripts: Vec<MigrationScript> = self
            .scan()?
            .into_iter()
            .filter(|s| s.category() == Category::Versioned)
            .collect();
        scripts.sort_by(|a, b| a.version().cmp(&b.version()));
        Ok(scripts)
    }

    fn repeatable_migrations(&self) -> CoreResult<Vec<MigrationScript>> {
        Ok(self
            .scan()?
            .into_iter()
            .filter(|s| s.category() == Category::Repeatable)
            .collect())
    }
}

/// Loads scripts bundled into the binary with [`include_dir`].
///
/// ```rust,ignore
/// use include_dir::{include_dir, Dir};
///
/// static MIGRATIONS: Dir<'static> = include_dir!("$CARGO_MANIFEST_DIR/migrations");
/// let loader = EmbeddedLoader::new(&MIGRATIONS, naming, encoding);
/// ```
pub struct EmbeddedLoader {
    dirs: Vec<&'static Dir<'static>>,
    filters: Vec<String>,
    naming: NamingConvention,
    encoding: Encoding,
}

impl EmbeddedLoader {
    /// Create a loader over one embedded directory.
    pub fn new(dir: &'static Dir<'static>, naming: NamingConvention, encoding: Encoding) -> Self {
        Self {
            dirs: vec![dir],
            filters: Vec::new(),
            naming,
            encoding,
        }
    }

    /// Add another embedded directory.
    pub fn with_dir(mut self, dir: &'static Dir<'static>) -> Self {
        self.dirs.push(dir);
        self
    }

    /// Only load files whose path contains the given fragment.
    pub fn with_filter(mut self, fragment: impl Into<String>) -> Self {
        self.filters.push(fragment.into());
        self
    }

    fn scan(&self) -> CoreResult<Vec<MigrationScript>> {
        let mut files: Vec<&include_dir::File<'static>> = Vec::new();
        for dir in &self.dirs {
            collect_files(*dir, &mut files);
        }
        files.sort_by(|a, b| a.path().cmp(b.path()));

        let mut scripts = Vec::new();
        for file in files {
            let path = file.path().to_string_lossy();
            if !self.filters.is_empty() && !self.filters.iter().any(|f| path.contains(f.as_str())) {
                continue;
            }
            let Some(file_name) = file.path().file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some(script) = MigrationScript::from_file_name(
                file_name,
                ScriptBody::Embedded(file.contents()),
                &self.naming,
                self.encoding,
            )? {
                scripts.push(script);
            }
        }
        Ok(scripts)
    }
}

fn collect_files(dir: &'static Dir<'static>, out: &mut Vec<&'static include_dir::File<'static>>) {
    out.extend(dir.files());
    for sub in dir.dirs() {
        collect_files(sub, out);
    }
}

impl MigrationLoader for EmbeddedLoader {
    fn versioned_migrations(&self) -> CoreResult<Vec<MigrationScript>> {
        let mut scripts: Vec<MigrationScript> = self
            .scan()?
            .into_iter()
            .filter(|s| s.category() == Category::Versioned)
            .collect();
        scripts.sort_by(|a, b| a.version().cmp(&b.version()));
        Ok(scripts)
    }

    fn repeatable_migrations(&self) -> CoreResult<Vec<MigrationScript>> {
        Ok(self
            .scan()?
            .into_iter()
            .filter(|s| s.category() == Category::Repeatable)
            .collect())
    }
}
