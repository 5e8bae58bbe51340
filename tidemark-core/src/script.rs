//! Migration script values and the file-name convention.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::{Encoding, NamingConvention};
use crate::error::{CoreError, CoreResult};
use crate::version::Version;

/// Script category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Applied once, ordered by version.
    Versioned,
    /// Re-applied whenever its checksum changes.
    Repeatable,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Versioned => write!(f, "Versioned"),
            Self::Repeatable => write!(f, "Repeatable"),
        }
    }
}

/// Where a script's body comes from. The body is read on demand so large
/// script sets are not held in memory between discovery and execution.
#[derive(Debug, Clone)]
pub enum ScriptBody {
    /// A file on disk.
    File(PathBuf),
    /// Bytes bundled into the binary.
    Embedded(&'static [u8]),
    /// In-memory text.
    Inline(Arc<str>),
}

impl ScriptBody {
    /// Read the raw bytes.
    pub fn read(&self) -> CoreResult<Vec<u8>> {
        match self {
            Self::File(path) => Ok(std::fs::read(path)?),
            Self::Embedded(bytes) => Ok(bytes.to_vec()),
            Self::Inline(text) => Ok(text.as_bytes().to_vec()),
        }
    }
}

/// An immutable migration script.
#[derive(Debug, Clone)]
pub struct MigrationScript {
    category: Category,
    version: Option<Version>,
    name: String,
    description: String,
    must_repeat_always: bool,
    checksum: String,
    body: ScriptBody,
}

impl MigrationScript {
    /// Create a versioned script.
    pub fn versioned(
        version: Version,
        name: impl Into<String>,
        description: impl Into<String>,
        body: ScriptBody,
        encoding: Encoding,
    ) -> CoreResult<Self> {
        let name = name.into();
        let checksum = body_checksum(&name, &body, encoding)?;
        Ok(Self {
            category: Category::Versioned,
            version: Some(version),
            name,
            description: description.into(),
            must_repeat_always: false,
            checksum,
            body,
        })
    }

    /// Create a repeatable script.
    pub fn repeatable(
        name: impl Into<String>,
        description: impl Into<String>,
        must_repeat_always: bool,
        body: ScriptBody,
        encoding: Encoding,
    ) -> CoreResult<Self> {
        let name = name.into();
        let checksum = body_checksum(&name, &body, encoding)?;
        Ok(Self {
            category: Category::Repeatable,
            version: None,
            name,
            description: description.into(),
            must_repeat_always,
            checksum,
            body,
        })
    }

    /// Build a script from a file name matching the naming convention.
    ///
    /// Returns `Ok(None)` when the name does not carry the configured
    /// suffix or prefix (the file is not a migration script).
    pub fn from_file_name(
        file_name: &str,
        body: ScriptBody,
        naming: &NamingConvention,
        encoding: Encoding,
    ) -> CoreResult<Option<Self>> {
        let Some(stem) = file_name.strip_suffix(naming.suffix.as_str()) else {
            return Ok(None);
        };

        let repeatable_lead = format!("{}{}", naming.repeatable_prefix, naming.separator);
        if let Some(rest) = stem.strip_prefix(repeatable_lead.as_str()) {
            if rest.is_empty() {
                return Err(CoreError::script(file_name, "missing description"));
            }
            let (raw_description, always) = match rest.strip_suffix(naming.repeat_always_marker.as_str()) {
                Some(trimmed) if !naming.repeat_always_marker.is_empty() => (trimmed, true),
                _ => (rest, false),
            };
            let script = Self::repeatable(
                file_name,
                display_description(raw_description),
                always,
                body,
                encoding,
            )?;
            return Ok(Some(script));
        }

        if let Some(rest) = stem.strip_prefix(naming.prefix.as_str()) {
            let Some((version_text, raw_description)) = rest.split_once(naming.separator.as_str())
            else {
                return Err(CoreError::script(
                    file_name,
                    format!("missing '{}' separator", naming.separator),
                ));
            };
            if raw_description.is_empty() {
                return Err(CoreError::script(file_name, "missing description"));
            }
            let version = Version::parse(version_text)
                .map_err(|e| CoreError::script(file_name, e.to_string()))?;
            let script = Self::versioned(
                version,
                file_name,
                display_description(raw_description),
                body,
                encoding,
            )?;
            return Ok(Some(script));
        }

        Ok(None)
    }

    /// Script category.
    pub fn category(&self) -> Category {
        self.category
    }

    /// Version label; present iff the script is versioned.
    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    /// Canonical script name (the file name).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human-readable description derived from the name.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Whether the script requests re-application on every run.
    pub fn must_repeat_always(&self) -> bool {
        self.must_repeat_always
    }

    /// Checksum of the normalized script body.
    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    /// Decode the script body with the given encoding.
    pub fn text(&self, encoding: Encoding) -> CoreResult<String> {
        let bytes = self.body.read()?;
        encoding
            .decode(&bytes)
            .map_err(|e| CoreError::script(&self.name, e.to_string()))
    }
}

fn display_description(raw: &str) -> String {
    raw.replace('_', " ")
}

/// SHA-256 of the body with line endings normalized to `\n`, so the same
/// script hashes identically when checked out on different platforms.
fn body_checksum(name: &str, body: &ScriptBody, encoding: Encoding) -> CoreResult<String> {
    let bytes = body.read()?;
    let text = encoding
        .decode(&bytes)
        .map_err(|e| CoreError::script(name, e.to_string()))?;
    let normalized = text.replace("\r\n", "\n");

    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}
