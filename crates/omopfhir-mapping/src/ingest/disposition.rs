//! What happens to a mapping file once a pass is done with it.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;

/// Default subdirectory of the watched directory for loaded files.
pub const PROCESSED_DIR: &str = "processed";
/// Default subdirectory of the watched directory for rejected files.
pub const REJECTED_DIR: &str = "rejected";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileDisposition {
    Delete,
    MoveTo(PathBuf),
}

impl FileDisposition {
    /// Reads a disposition setting: `delete` (any case) deletes, anything
    /// else is a directory, relative paths resolved against `base`.
    pub fn from_setting(setting: &str, base: &Path) -> Self {
        let setting = setting.trim();
        if setting.eq_ignore_ascii_case("delete") {
            return Self::Delete;
        }
        let dir = Path::new(setting);
        if dir.is_absolute() {
            Self::MoveTo(dir.to_path_buf())
        } else {
            Self::MoveTo(base.join(dir))
        }
    }

    /// Removes `file` from where it is. Returns the new location when moved.
    pub async fn apply(&self, file: &Path) -> io::Result<Option<PathBuf>> {
        match self {
            Self::Delete => {
                fs::remove_file(file).await?;
                Ok(None)
            }
            Self::MoveTo(dir) => {
                fs::create_dir_all(dir).await?;
                let target = free_target(dir, file).await?;
                if fs::rename(file, &target).await.is_err() {
                    // rename fails across filesystems
                    fs::copy(file, &target).await?;
                    fs::remove_file(file).await?;
                }
                Ok(Some(target))
            }
        }
    }
}

/// `dir/<name>`, or `dir/<name>.<n>` for the first free `n`.
async fn free_target(dir: &Path, file: &Path) -> io::Result<PathBuf> {
    let name = file
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let candidate = dir.join(name);
    if !fs::try_exists(&candidate).await? {
        return Ok(candidate);
    }
    let mut n = 1u32;
    loop {
        let mut numbered = name.to_os_string();
        numbered.push(format!(".{n}"));
        let candidate = dir.join(numbered);
        if !fs::try_exists(&candidate).await? {
            return Ok(candidate);
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_setting() {
        let base = Path::new("/data/mappings");
        assert_eq!(FileDisposition::from_setting("DELETE", base), FileDisposition::Delete);
        assert_eq!(
            FileDisposition::from_setting("done", base),
            FileDisposition::MoveTo(PathBuf::from("/data/mappings/done"))
        );
        assert_eq!(
            FileDisposition::from_setting("/archive", base),
            FileDisposition::MoveTo(PathBuf::from("/archive"))
        );
    }

    #[tokio::test]
    async fn test_move_does_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join(PROCESSED_DIR);
        let disposition = FileDisposition::MoveTo(archive.clone());

        for body in ["first", "second"] {
            let file = dir.path().join("map.csv");
            fs::write(&file, body).await.unwrap();
            disposition.apply(&file).await.unwrap();
            assert!(!file.exists());
        }

        assert_eq!(fs::read_to_string(archive.join("map.csv")).await.unwrap(), "first");
        assert_eq!(
            fs::read_to_string(archive.join("map.csv.1")).await.unwrap(),
            "second"
        );
    }

    #[tokio::test]
    async fn test_delete() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("map.csv");
        fs::write(&file, "x").await.unwrap();
        assert_eq!(FileDisposition::Delete.apply(&file).await.unwrap(), None);
        assert!(!file.exists());
    }
}
