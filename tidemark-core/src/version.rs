//! Dotted numeric version labels.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{CoreError, CoreResult};

/// A migration version label.
///
/// A label is a sequence of non-negative integer components
/// (`1`, `1.2`, `2.0.13`), totally ordered lexicographically by component,
/// so `1.2 < 1.2.1 < 1.10`. The `Min` and `Max` sentinels bound every
/// label and are used for the default start and target windows.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Version {
    /// Lower than every label.
    #[default]
    Min,
    /// A concrete dotted label.
    Label(Vec<u64>),
    /// Higher than every label.
    Max,
}

impl Version {
    /// Parse a label from text. Components may be separated by `.` or `_`.
    pub fn parse(text: &str) -> CoreResult<Self> {
        if text.is_empty() {
            return Err(CoreError::configuration("empty version label"));
        }
        let components = text
            .split(['.', '_'])
            .map(|part| {
                part.parse::<u64>().map_err(|_| {
                    CoreError::configuration(format!("invalid version label: {text}"))
                })
            })
            .collect::<CoreResult<Vec<u64>>>()?;
        Ok(Self::Label(components))
    }

    /// The label components, when this is not a sentinel.
    pub fn components(&self) -> Option<&[u64]> {
        match self {
            Self::Label(c) => Some(c),
            _ => None,
        }
    }

    /// Whether this is a concrete label rather than a sentinel.
    pub fn is_label(&self) -> bool {
        matches!(self, Self::Label(_))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Min => write!(f, "<min>"),
            Self::Max => write!(f, "<max>"),
            Self::Label(components) => {
                let text = components
                    .iter()
                    .map(|c| c.to_string())
                    .collect::<Vec<_>>()
                    .join(".");
                write!(f, "{text}")
            }
        }
    }
}

impl FromStr for Version {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        match text.as_str() {
            "<min>" => Ok(Self::Min),
            "<max>" => Ok(Self::Max),
            _ => Self::parse(&text).map_err(serde::de::Error::custom),
        }
    }
}
