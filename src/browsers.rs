use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Browser-engine family, which decides the key and cipher scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    /// Chromium-derived browsers (Chrome, Edge, Brave, Opera, Vivaldi, Arc)
    Webkit,
    /// Firefox-derived browsers (Firefox, Waterfox, LibreWolf)
    Gecko,
}

impl Family {
    pub fn name(&self) -> &'static str {
        match self {
            Family::Webkit => "webkit",
            Family::Gecko => "gecko",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Login,
    Cookie,
    History,
    Download,
    CreditCard,
    Bookmark,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 6] = [
        ArtifactKind::Login,
        ArtifactKind::Cookie,
        ArtifactKind::History,
        ArtifactKind::Download,
        ArtifactKind::CreditCard,
        ArtifactKind::Bookmark,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ArtifactKind::Login => "login",
            ArtifactKind::Cookie => "cookie",
            ArtifactKind::History => "history",
            ArtifactKind::Download => "download",
            ArtifactKind::CreditCard => "credit_card",
            ArtifactKind::Bookmark => "bookmark",
        }
    }

    /// File inside the profile directory that holds this artifact.
    pub fn file_name(&self, family: Family) -> Option<&'static str> {
        match (family, self) {
            (Family::Webkit, ArtifactKind::Login) => Some("Login Data"),
            (Family::Webkit, ArtifactKind::Cookie) => Some("Cookies"),
            (Family::Webkit, ArtifactKind::History) => Some("History"),
            (Family::Webkit, ArtifactKind::Download) => Some("History"),
            (Family::Webkit, ArtifactKind::CreditCard) => Some("Web Data"),
            (Family::Webkit, ArtifactKind::Bookmark) => Some("Bookmarks"),
            (Family::Gecko, ArtifactKind::Login) => Some("logins.json"),
            (Family::Gecko, ArtifactKind::Cookie) => Some("cookies.sqlite"),
            (Family::Gecko, ArtifactKind::History) => Some("places.sqlite"),
            (Family::Gecko, ArtifactKind::Download) => Some("places.sqlite"),
            (Family::Gecko, ArtifactKind::Bookmark) => Some("places.sqlite"),
            (Family::Gecko, ArtifactKind::CreditCard) => None,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A browser profile directory found on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub family: Family,
    pub path: PathBuf,
}

impl Profile {
    pub fn new(family: Family, path: impl Into<PathBuf>) -> Self {
        Self {
            family,
            path: path.into(),
        }
    }

    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    pub fn artifact_path(&self, kind: ArtifactKind) -> Option<PathBuf> {
        let file = kind.file_name(self.family)?;
        // Chromium 96+ moved the cookie store under Network/
        if self.family == Family::Webkit && kind == ArtifactKind::Cookie {
            let network = self.path.join("Network").join(file);
            if network.exists() {
                return Some(network);
            }
        }
        Some(self.path.join(file))
    }
}

/// Marker files identifying a profile directory of each family.
fn family_marker(dir: &Path) -> Option<Family> {
    if dir.join("key4.db").exists() || dir.join("places.sqlite").exists() {
        Some(Family::Gecko)
    } else if dir.join("Login Data").exists()
        || dir.join("History").exists()
        || dir.join("Cookies").exists()
        || dir.join("Network").join("Cookies").exists()
    {
        Some(Family::Webkit)
    } else {
        None
    }
}

/// Walk a browser data root and collect every profile directory under it.
pub fn discover_profiles(root: &Path, max_depth: usize) -> Vec<Profile> {
    let mut profiles = Vec::new();
    for entry in WalkDir::new(root)
        .max_depth(max_depth)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
    {
        if let Some(family) = family_marker(entry.path()) {
            debug!("Found {} profile at: {:?}", family, entry.path());
            profiles.push(Profile::new(family, entry.path()));
        }
    }
    profiles.sort_by(|a, b| a.path.cmp(&b.path));
    profiles
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_discover_profiles() {
        let root = tempfile::tempdir().unwrap();
        let chrome = root.path().join("Chrome").join("Default");
        let firefox = root.path().join("Firefox").join("Profiles").join("abcd.default");
        let empty = root.path().join("Other");
        fs::create_dir_all(&chrome).unwrap();
        fs::create_dir_all(&firefox).unwrap();
        fs::create_dir_all(&empty).unwrap();
        fs::write(chrome.join("Login Data"), b"").unwrap();
        fs::write(firefox.join("key4.db"), b"").unwrap();

        let found = discover_profiles(root.path(), 5);
        assert_eq!(found.len(), 2);
        assert!(found.contains(&Profile::new(Family::Webkit, &chrome)));
        assert!(found.contains(&Profile::new(Family::Gecko, &firefox)));
    }

    #[test]
    fn test_artifact_files() {
        assert_eq!(ArtifactKind::Login.file_name(Family::Webkit), Some("Login Data"));
        assert_eq!(ArtifactKind::CreditCard.file_name(Family::Gecko), None);
        let p = Profile::new(Family::Gecko, "/tmp/p");
        assert_eq!(p.artifact_path(ArtifactKind::History), Some(PathBuf::from("/tmp/p/places.sqlite")));
        assert_eq!(p.name(), "p");
    }
}
