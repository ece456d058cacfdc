//! Media library: the track-identifier collaborator.
//!
//! The synchronization core only needs a list of playable track
//! identifiers; actual byte serving is delegated to `ServeDir` in the
//! HTTP layer. Identifiers are plain file names within the media
//! directory, matching what browser clients use as element labels.

use std::path::{Path, PathBuf};

use crate::error::ChorusResult;
use crate::protocol::TrackId;
use crate::protocol_constants::AUDIO_EXTENSIONS;

/// Lists playable tracks from a single flat media directory.
pub struct MediaLibrary {
    root: PathBuf,
}

impl MediaLibrary {
    /// Creates a library rooted at the given directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The directory tracks are served from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the sorted list of playable track identifiers.
    ///
    /// Re-scans the directory on every call so newly dropped files appear
    /// on the next register without a restart.
    pub async fn list(&self) -> ChorusResult<Vec<TrackId>> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut tracks = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if !has_audio_extension(&path) {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                tracks.push(name.to_string());
            }
        }

        tracks.sort();
        Ok(tracks)
    }
}

fn has_audio_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            AUDIO_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"").unwrap();
    }

    #[tokio::test]
    async fn lists_only_audio_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "b.mp3");
        touch(dir.path(), "a.flac");
        touch(dir.path(), "notes.txt");
        touch(dir.path(), "cover.jpg");
        touch(dir.path(), "LOUD.OGG");

        let library = MediaLibrary::new(dir.path());
        let tracks = library.list().await.unwrap();
        assert_eq!(tracks, vec!["LOUD.OGG", "a.flac", "b.mp3"]);
    }

    #[tokio::test]
    async fn missing_directory_is_a_library_error() {
        let library = MediaLibrary::new("/definitely/not/here");
        assert!(library.list().await.is_err());
    }

    #[tokio::test]
    async fn subdirectories_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("album.mp3")).unwrap();
        touch(dir.path(), "real.mp3");

        let library = MediaLibrary::new(dir.path());
        let tracks = library.list().await.unwrap();
        assert_eq!(tracks, vec!["real.mp3"]);
    }
}
