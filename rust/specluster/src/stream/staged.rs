use crate::errors::StreamError;
use std::path::{
    Path,
    PathBuf,
};

/// A file that is removed on drop unless it was moved into place.
///
/// Streams are written to a staged path and renamed onto their destination
/// only once they are complete, so a destination is either missing, the old
/// complete file, or the new complete file.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    persisted: bool,
}

impl StagedFile {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            persisted: false,
        }
    }

    /// Stages `destination` as `<name>.tmp` inside `dir`.
    /// `dir` must be on the same file system as `destination`.
    pub fn for_destination(destination: &Path, dir: &Path) -> Self {
        let name = destination
            .file_name()
            .map(|x| x.to_string_lossy().to_string())
            .unwrap_or_else(|| "stream".to_string());
        Self::new(dir.join(format!("{}.tmp", name)))
    }

    /// Stages `destination` next to itself.
    pub fn beside(destination: &Path) -> Self {
        let dir = match destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        Self::for_destination(destination, dir)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn persist(mut self, destination: &Path) -> Result<(), StreamError> {
        let io_err = |e: std::io::Error| StreamError::Io {
            source: e,
            context: "Error moving staged cluster file into place",
            path: Some(destination.to_path_buf()),
        };
        if std::fs::rename(&self.path, destination).is_err() {
            // Rename fails across file systems.
            std::fs::copy(&self.path, destination).map_err(io_err)?;
            std::fs::remove_file(&self.path).map_err(io_err)?;
        }
        self.persisted = true;
        Ok(())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.persisted {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dropped_file_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let staged = StagedFile::for_destination(&dir.path().join("out.cls"), dir.path());
        assert_eq!(staged.path(), dir.path().join("out.cls.tmp"));
        std::fs::write(staged.path(), b"partial").unwrap();
        let path = staged.path().to_path_buf();
        drop(staged);
        assert!(!path.exists());
    }

    #[test]
    fn test_beside_uses_destination_dir() {
        let staged = StagedFile::beside(Path::new("out/final.cls"));
        assert_eq!(staged.path(), Path::new("out/final.cls.tmp"));
        let staged = StagedFile::beside(Path::new("final.cls"));
        assert_eq!(staged.path(), Path::new("./final.cls.tmp"));
    }

    #[test]
    fn test_persist_replaces_destination() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("out.cls");
        std::fs::write(&destination, b"old").unwrap();
        let staged = StagedFile::for_destination(&destination, dir.path());
        std::fs::write(staged.path(), b"new").unwrap();
        let path = staged.path().to_path_buf();
        staged.persist(&destination).unwrap();
        assert_eq!(std::fs::read(&destination).unwrap(), b"new");
        assert!(!path.exists());
    }
}
