use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::LauncherError;

/// A build version of up to four numeric components
/// (`major[.minor[.build[.revision]]]`), parsed from loosely formatted
/// strings like `v1.2` or `2.0.13.1`.
///
/// Ordering and equality are component-wise numeric; missing trailing
/// components count as 0, so `1.2` and `1.2.0` compare equal. Formatting
/// preserves the components as parsed, without a leading `v`.
#[derive(Debug, Clone)]
pub struct VersionValue {
    components: Vec<u32>,
}

impl VersionValue {
    pub fn components(&self) -> &[u32] {
        &self.components
    }
}

/// The zero version, used when no version information exists yet.
impl Default for VersionValue {
    fn default() -> Self {
        Self {
            components: vec![0],
        }
    }
}

impl FromStr for VersionValue {
    type Err = LauncherError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let trimmed = text.trim();
        let body = trimmed.strip_prefix('v').unwrap_or(trimmed);
        if body.is_empty() {
            return Err(LauncherError::Parse {
                text: text.to_owned(),
                reason: "empty version string",
            });
        }

        let mut components = Vec::new();
        for part in body.split('.') {
            let value = part.parse::<u32>().map_err(|_| LauncherError::Parse {
                text: text.to_owned(),
                reason: "non-numeric version component",
            })?;
            components.push(value);
        }
        if components.len() > 4 {
            return Err(LauncherError::Parse {
                text: text.to_owned(),
                reason: "more than four version components",
            });
        }

        Ok(Self { components })
    }
}

impl fmt::Display for VersionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .components
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(".");
        f.write_str(&joined)
    }
}

impl Ord for VersionValue {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.components.len().max(other.components.len());
        for i in 0..len {
            let a = self.components.get(i).copied().unwrap_or(0);
            let b = other.components.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => {}
                order => return order,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for VersionValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for VersionValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for VersionValue {}
