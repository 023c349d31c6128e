use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SOUND_NUMBER: AtomicU64 = AtomicU64::new(1);

/// Identifier of a created sound.
///
/// Built from a process-wide counter and the source file's base name, e.g.
/// `"3_rain.wav"`, so it is never reused while the process lives. The empty
/// identifier is the "creation failed" value returned by
/// [`OrbitSonicEngine::create_sound`](crate::OrbitSonicEngine::create_sound).
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SoundId(String);

impl SoundId {
    pub(crate) fn generate(path: &Path) -> Self {
        let number = NEXT_SOUND_NUMBER.fetch_add(1, Ordering::Relaxed);
        let path = path.to_string_lossy();
        // Split on both separators so Windows-style paths name the file too
        let file_name = path.rsplit(['/', '\\']).next().unwrap_or_default();
        Self(format!("{number}_{file_name}"))
    }

    pub fn empty() -> Self {
        Self(String::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SoundId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SoundId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SoundId {
    fn from(value: String) -> Self {
        Self(value)
    }
}
