use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::core::{ComponentLogger, LogContext, SinkError, SinkResult};
use crate::sink::Sink;

/// Writes output units into the local filesystem.
///
/// Each file is written to a uniquely named temporary file next to its final
/// location and persisted over the target, so readers of the tree never see
/// partial files. Channel names may contain `/` and create subdirectories.
pub struct FsSink {
    label: String,
}

impl FsSink {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl ComponentLogger for FsSink {
    fn log_context(&self) -> LogContext {
        LogContext::new("FsSink", &self.label)
    }
}

impl Sink for FsSink {
    fn write(&self, dir: &str, name: &str, bytes: &[u8]) -> SinkResult {
        let target = Path::new(dir).join(name);
        let parent = target.parent().unwrap_or_else(|| Path::new(dir));
        fs::create_dir_all(parent)
            .map_err(|e| SinkError::unavailable(format!("create {}", parent.display()), e))?;

        let temp = NamedTempFile::new_in(parent)
            .map_err(|e| SinkError::write(format!("temp file in {}", parent.display()), e))?;
        temp.as_file()
            .write_all(bytes)
            .map_err(|e| SinkError::write(format!("write {}", temp.path().display()), e))?;
        temp.persist(&target)
            .map_err(|e| SinkError::write(format!("persist {}", target.display()), e.error))?;

        self.debug(&format!("wrote {} bytes to {}", bytes.len(), target.display()));
        Ok(())
    }

    fn is_local(&self) -> bool {
        true
    }
}

/// Removes `dir` and everything below it. A missing directory is not an error.
pub fn purge_dir(dir: &Path) -> std::io::Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_and_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = format!("{}/data/1000/0/0/", tmp.path().display());
        let sink = FsSink::new("test");

        sink.write(&dir, "a.csv", b"1,2,").unwrap();
        sink.write(&dir, "a.csv", b"3,").unwrap();

        let written = fs::read(format!("{}a.csv", dir)).unwrap();
        assert_eq!(written, b"3,");

        let entries: Vec<_> = fs::read_dir(&dir).unwrap().flatten().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn concurrent_writers_to_one_name() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = format!("{}/data/1/0/0/", tmp.path().display());
        let sink = std::sync::Arc::new(FsSink::new("test"));

        let handles: Vec<_> = (0..4u8)
            .map(|id| {
                let sink = sink.clone();
                let dir = dir.clone();
                std::thread::spawn(move || {
                    let payload = vec![id; 4096];
                    (0..200)
                        .filter(|_| sink.write(&dir, "a.bin", &payload).is_err())
                        .count()
                })
            })
            .collect();
        let failures: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(failures, 0);

        let written = fs::read(format!("{}a.bin", dir)).unwrap();
        assert_eq!(written.len(), 4096);
        assert!(written.iter().all(|b| *b == written[0]));
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 1);
    }

    #[test]
    fn channel_name_with_subdirectory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = format!("{}/data/1/0/0/", tmp.path().display());
        let sink = FsSink::new("test");

        sink.write(&dir, "cam/x.jpg", &[1, 2]).unwrap();
        assert_eq!(fs::read(format!("{}cam/x.jpg", dir)).unwrap(), vec![1, 2]);
    }

    #[test]
    fn blocked_directory_is_unavailable() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("plain");
        fs::write(&file, b"x").unwrap();

        let sink = FsSink::new("test");
        let err = sink
            .write(&format!("{}/sub/", file.display()), "a.csv", b"1")
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn purge_missing_dir_is_ok() {
        let tmp = tempfile::tempdir().unwrap();
        let gone = tmp.path().join("never-created");
        assert!(purge_dir(&gone).is_ok());

        let full = tmp.path().join("full/inner");
        fs::create_dir_all(&full).unwrap();
        purge_dir(&tmp.path().join("full")).unwrap();
        assert!(!tmp.path().join("full").exists());
    }
}
