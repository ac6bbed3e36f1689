//! Keyring sets: which public keyrings to try, in which order.

use anyhow::{Context, Result};
use sequoia_openpgp::cert::{Cert, CertParser};
use sequoia_openpgp::parse::Parse;
use std::path::{Path, PathBuf};

/// Well-known Debian keyrings: logical name and file name.
pub const WELL_KNOWN_KEYRINGS: [(&str, &str); 6] = [
    ("debian", "debian-keyring.gpg"),
    ("debian-maintainers", "debian-maintainers.gpg"),
    ("debian-emeritus", "emeritus-keyring.gpg"),
    ("debian-emeritus-pgp", "emeritus-keyring.pgp"),
    ("debian-removed", "removed-keys.gpg"),
    ("debian-removed-pgp", "removed-keys.pgp"),
];

/// Advisory shown when a signing key may live in a keyring that was not found.
pub const MISSING_KEYRINGS_HINT: &str = "Some keyrings are missing, install the debian-keyring \
     package or add the keyring directory to DEBHIST_KEYRING_PATH";

/// Environment variable overriding the keyring search directories.
pub const KEYRING_PATH_ENV: &str = "DEBHIST_KEYRING_PATH";

/// A named public keyring file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyring {
    pub name: String,
    pub path: PathBuf,
}

/// Ordered keyrings to try, plus whether some expected keyring is absent.
#[derive(Debug, Clone, Default)]
pub struct KeyringSet {
    keyrings: Vec<Keyring>,
    missing: bool,
}

impl KeyringSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a keyring. Re-adding a name replaces its path in place.
    pub fn push(&mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> &mut Self {
        let name = name.into();
        let path = path.into();
        match self.keyrings.iter_mut().find(|k| k.name == name) {
            Some(existing) => existing.path = path,
            None => self.keyrings.push(Keyring { name, path }),
        }
        self
    }

    pub fn set_missing(&mut self, missing: bool) -> &mut Self {
        self.missing = missing;
        self
    }

    /// One or more expected keyrings could not be located.
    pub fn missing(&self) -> bool {
        self.missing
    }

    pub fn get(&self, name: &str) -> Option<&Keyring> {
        self.keyrings.iter().find(|k| k.name == name)
    }

    /// Keyrings in trial order.
    pub fn iter(&self) -> std::slice::Iter<'_, Keyring> {
        self.keyrings.iter()
    }

    pub fn len(&self) -> usize {
        self.keyrings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keyrings.is_empty()
    }

    /// Resolve every well-known keyring to the first existing file in `dirs`.
    #[tracing::instrument(skip(dirs), fields(dir_count = dirs.len()))]
    pub fn discover<P: AsRef<Path>>(dirs: &[P]) -> Self {
        let mut set = Self::new();
        for (name, file_name) in WELL_KNOWN_KEYRINGS {
            let found = dirs
                .iter()
                .map(|dir| dir.as_ref().join(file_name))
                .find(|path| path.exists());
            match found {
                Some(path) => {
                    tracing::debug!(name, path = %path.display(), "Found keyring");
                    set.push(name, path);
                }
                None => {
                    tracing::debug!(name, "Keyring not found");
                    set.missing = true;
                }
            }
        }
        set
    }
}

impl<'a> IntoIterator for &'a KeyringSet {
    type Item = &'a Keyring;
    type IntoIter = std::slice::Iter<'a, Keyring>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Directories searched for keyrings, most specific first.
///
/// `DEBHIST_KEYRING_PATH` (colon separated) replaces the defaults.
pub fn default_search_dirs() -> Vec<PathBuf> {
    if let Some(paths) = std::env::var_os(KEYRING_PATH_ENV) {
        return std::env::split_paths(&paths)
            .filter(|p| !p.as_os_str().is_empty())
            .collect();
    }
    let mut dirs = Vec::new();
    if let Ok(home) = std::env::var("HOME") {
        let share = PathBuf::from(home).join(".local/share");
        dirs.push(share.join("public-keyrings"));
        dirs.push(share.join("keyrings"));
    }
    dirs.push(PathBuf::from("/usr/share/keyrings"));
    dirs
}

/// Load the OpenPGP certificates of a keyring file.
///
/// Certificates that cannot be parsed are skipped with a warning.
#[tracing::instrument]
pub fn load_keyring_certs(path: &Path) -> Result<Vec<Cert>> {
    let certs: Vec<Cert> = CertParser::from_file(path)
        .with_context(|| format!("Failed to open keyring {}", path.display()))?
        .filter_map(|cert| {
            cert.inspect_err(|e| tracing::warn!(error = %e, "Skipping unreadable certificate"))
                .ok()
        })
        .collect();
    tracing::debug!(count = certs.len(), "Loaded certificates from keyring");
    Ok(certs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_keeps_order_and_replaces_in_place() {
        let mut set = KeyringSet::new();
        set.push("debian", "/a/debian.gpg")
            .push("debian-maintainers", "/a/dm.gpg")
            .push("debian", "/b/debian.gpg");
        let names: Vec<_> = set.iter().map(|k| k.name.as_str()).collect();
        assert_eq!(names, ["debian", "debian-maintainers"]);
        assert_eq!(set.get("debian").unwrap().path, Path::new("/b/debian.gpg"));
        assert!(!set.missing());
    }

    #[test]
    fn discover_takes_first_existing_file() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::write(second.path().join("debian-keyring.gpg"), b"").unwrap();
        std::fs::write(first.path().join("removed-keys.pgp"), b"").unwrap();
        std::fs::write(second.path().join("removed-keys.pgp"), b"").unwrap();

        let set = KeyringSet::discover(&[first.path(), second.path()]);
        assert_eq!(set.len(), 2);
        assert!(set.missing());
        assert_eq!(
            set.get("debian").unwrap().path,
            second.path().join("debian-keyring.gpg")
        );
        assert_eq!(
            set.get("debian-removed-pgp").unwrap().path,
            first.path().join("removed-keys.pgp")
        );
        // trial order follows the well-known list, not the directories
        let names: Vec<_> = set.iter().map(|k| k.name.as_str()).collect();
        assert_eq!(names, ["debian", "debian-removed-pgp"]);
    }

    #[test]
    fn discover_with_all_keyrings_is_not_missing() {
        let dir = tempfile::tempdir().unwrap();
        for (_, file_name) in WELL_KNOWN_KEYRINGS {
            std::fs::write(dir.path().join(file_name), b"").unwrap();
        }
        let set = KeyringSet::discover(&[dir.path()]);
        assert_eq!(set.len(), WELL_KNOWN_KEYRINGS.len());
        assert!(!set.missing());
    }

    #[test]
    fn missing_keyring_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_keyring_certs(&dir.path().join("absent.gpg")).unwrap_err();
        assert!(err.to_string().contains("absent.gpg"));
    }

    #[test]
    #[serial_test::serial]
    fn search_path_variable_replaces_defaults() {
        // SAFETY: serialized with every other test touching the environment.
        unsafe { std::env::set_var(KEYRING_PATH_ENV, "/srv/keyrings::/opt/keyrings") };
        let dirs = default_search_dirs();
        unsafe { std::env::remove_var(KEYRING_PATH_ENV) };
        assert_eq!(dirs, [PathBuf::from("/srv/keyrings"), PathBuf::from("/opt/keyrings")]);
    }

    #[test]
    #[serial_test::serial]
    fn default_search_dirs_end_with_system_keyrings() {
        unsafe { std::env::remove_var(KEYRING_PATH_ENV) };
        let dirs = default_search_dirs();
        assert_eq!(dirs.last().unwrap(), Path::new("/usr/share/keyrings"));
    }
}
