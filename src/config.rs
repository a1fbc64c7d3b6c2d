//! Registry configuration loaded from `.defreg.toml`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::fingerprint::VisibilityFilter;

/// Raw TOML structure for `.defreg.toml`.
#[derive(serde::Deserialize)]
struct DefregTomlConfig {
    /// Namespace name → directory, relative to the project root.
    #[serde(default)]
    namespaces: BTreeMap<String, String>,
    /// Externally visible namespaces; empty means everything is public.
    #[serde(default)]
    public: Vec<String>,
}

/// Project configuration: which namespaces exist, where their bundles live,
/// and which of them external clients may see.
#[derive(Debug)]
pub struct RegistryConfig {
    /// Namespace name → bundle directory, relative to the project root.
    pub namespaces: BTreeMap<String, PathBuf>,
    /// Externally visible namespaces; empty means everything is public.
    pub public: Vec<String>,
}

impl RegistryConfig {
    /// Load config from `.defreg.toml` in the given root directory.
    /// A registry needs namespace roots to exist at all, so a missing file
    /// is an error here, and a present-but-malformed file is never silently
    /// defaulted.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigNotFound` if the file doesn't exist,
    /// `Error::Io` for other read failures,
    /// or `Error::TomlDe` if the TOML is malformed.
    pub fn load(root: &Path) -> Result<RegistryConfig, Error> {
        let path = root.join(".defreg.toml");
        let content = match std::fs::read_to_string(&path) {
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::ConfigNotFound { path });
            },
            Err(error) => return Err(Error::Io(error)),
            Ok(content) => content,
        };

        let raw: DefregTomlConfig = toml::from_str(&content)?;
        return Ok(RegistryConfig {
            namespaces: raw
                .namespaces
                .into_iter()
                .map(|(name, dir)| return (name, PathBuf::from(dir)))
                .collect(),
            public: raw.public,
        });
    }

    /// The visibility filter an external client gets: the configured public
    /// namespaces, or everything when none are declared.
    pub fn visibility(&self) -> VisibilityFilter {
        if self.public.is_empty() {
            return VisibilityFilter::All;
        }
        return VisibilityFilter::Namespaces(BTreeSet::from_iter(self.public.iter().cloned()));
    }
}
