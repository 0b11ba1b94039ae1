use crate::error::CxpsError;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

const BUILTIN_CAMPUSES: &[(&str, &str)] = &[
    ("Islamabad", "NU-ISB-123"),
    ("Lahore", "NU-LHR-123"),
    ("Karachi", "NU-KHI-123"),
    ("Peshawar", "NU-PEW-123"),
    ("CFD", "NU-CFD-123"),
    ("Multan", "NU-MLT-123"),
];

#[derive(Debug, Deserialize)]
struct CredentialsFile {
    campuses: HashMap<String, String>,
}

/// Static campus name → shared secret table.
///
/// Loaded once at startup and only read afterwards.
#[derive(Debug, Clone)]
pub struct CredentialDirectory {
    secrets: HashMap<String, String>,
}

impl CredentialDirectory {
    /// Build a directory from explicit `(name, secret)` pairs.
    pub fn from_pairs<I, N, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (N, S)>,
        N: Into<String>,
        S: Into<String>,
    {
        Self {
            secrets: pairs
                .into_iter()
                .map(|(n, s)| (n.into(), s.into()))
                .collect(),
        }
    }

    /// Load a directory from a TOML file with a `[campuses]` table.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unparseable, or has no
    /// `campuses` table.
    pub fn load(path: &Path) -> Result<Self, CxpsError> {
        let contents = std::fs::read_to_string(path)?;
        let file: CredentialsFile = toml::from_str(&contents)?;
        Ok(Self {
            secrets: file.campuses,
        })
    }

    /// Returns `true` only for a known campus whose secret matches exactly.
    #[must_use]
    pub fn verify(&self, campus: &str, secret: &str) -> bool {
        self.secrets.get(campus).is_some_and(|s| s == secret)
    }

    /// Known campus names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.secrets.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of known campuses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    /// Returns `true` if no campus is enrolled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }
}

impl Default for CredentialDirectory {
    fn default() -> Self {
        Self::from_pairs(BUILTIN_CAMPUSES.iter().copied())
    }
}
