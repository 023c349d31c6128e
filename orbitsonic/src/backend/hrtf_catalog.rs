//! Named HRTF profiles stored as SOFA files.

use std::path::{Path, PathBuf};

/// A SOFA file that can be selected by name when a backend is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HrtfProfile {
    /// File stem, e.g. `mit_kemar` for `mit_kemar.sofa`
    pub name: String,
    pub path: PathBuf,
}

/// Lists the `*.sofa` files directly inside `dir`, sorted by name.
///
/// A missing directory or unreadable entries simply yield fewer profiles.
pub fn scan(dir: Option<&Path>) -> Vec<HrtfProfile> {
    let Some(dir) = dir else {
        return Vec::new();
    };

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::debug!("Cannot read HRTF directory {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut profiles: Vec<HrtfProfile> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("sofa"))
        })
        .filter_map(|path| {
            let name = path.file_stem()?.to_str()?.to_string();
            Some(HrtfProfile { name, path })
        })
        .collect();

    profiles.sort_by(|a, b| a.name.cmp(&b.name));
    profiles
}

/// Finds the profile matching `preference`.
///
/// An empty preference means the built-in HRTF and returns `None` quietly. An
/// unknown name also returns `None`, with a warning listing what exists.
pub fn resolve<'a>(profiles: &'a [HrtfProfile], preference: &str) -> Option<&'a HrtfProfile> {
    if preference.is_empty() {
        return None;
    }

    let found = profiles.iter().find(|profile| profile.name == preference);
    if found.is_none() {
        let names: Vec<&str> = profiles.iter().map(|p| p.name.as_str()).collect();
        log::warn!(
            "HRTF \"{}\" is not available (found: {:?}), using the default HRTF",
            preference,
            names
        );
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "orbitsonic-hrtf-{}-{}",
            std::process::id(),
            name
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn scan_lists_sofa_files_sorted() {
        let dir = scratch_dir("scan");
        for file in ["kemar.sofa", "alpha.SOFA", "notes.txt"] {
            std::fs::write(dir.join(file), b"").unwrap();
        }
        std::fs::create_dir_all(dir.join("nested.sofa")).unwrap();

        let profiles = scan(Some(&dir));
        std::fs::remove_dir_all(&dir).ok();

        let names: Vec<&str> = profiles.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "kemar"]);
    }

    #[test]
    fn missing_directory_has_no_profiles() {
        assert!(scan(None).is_empty());
        assert!(scan(Some(Path::new("/no/such/hrtf/dir"))).is_empty());
    }

    #[test]
    fn resolve_matches_exact_names_only() {
        let profiles = vec![HrtfProfile {
            name: "kemar".to_string(),
            path: PathBuf::from("kemar.sofa"),
        }];

        assert_eq!(resolve(&profiles, "kemar"), profiles.first());
        assert_eq!(resolve(&profiles, "KEMAR"), None);
        assert_eq!(resolve(&profiles, ""), None);
    }
}
