use serde::Serialize;
use std::path::{Path, PathBuf};

/// Errors from song library access.
#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    #[error("song not found: {0}")]
    NotFound(String),
    #[error("invalid song name: {0}")]
    InvalidName(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One entry in the library listing.
#[derive(Debug, Clone, Serialize)]
pub struct SongEntry {
    pub name: String,
    pub size_bytes: u64,
}

/// A flat directory of MIDI files served by bare file name.
#[derive(Debug)]
pub struct SongLibrary {
    root: PathBuf,
}

impl SongLibrary {
    pub fn new(root: impl Into<PathBuf>) -> SongLibrary {
        SongLibrary { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read a song's bytes by name. Names must be bare file names; anything
    /// that could escape the library directory is rejected before touching
    /// the filesystem.
    pub async fn load(&self, name: &str) -> Result<Vec<u8>, LibraryError> {
        validate_name(name)?;
        let path = self.root.join(name);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(LibraryError::NotFound(name.to_string()))
            }
            Err(err) => Err(LibraryError::Io(err)),
        }
    }

    /// List the MIDI files in the library, sorted by name.
    pub async fn list(&self) -> Result<Vec<SongEntry>, LibraryError> {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.root).await?;

        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            let is_midi = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("mid") || e.eq_ignore_ascii_case("midi"));
            if !is_midi {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let meta = entry.metadata().await?;
            entries.push(SongEntry {
                name: name.to_string(),
                size_bytes: meta.len(),
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

fn validate_name(name: &str) -> Result<(), LibraryError> {
    if name.is_empty() || name.contains('/') || name.contains('\\') || name.starts_with('.') {
        return Err(LibraryError::InvalidName(name.to_string()));
    }
    Ok(())
}
