use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use crate::buffer::DEFAULT_OPAQUE_SUFFIXES;
use crate::core::{TimeUnit, WriterError, WriterResult};

fn default_opaque_suffixes() -> Vec<String> {
    DEFAULT_OPAQUE_SUFFIXES.iter().map(|s| s.to_string()).collect()
}

fn default_shutdown_timeout_ms() -> u64 {
    30_000
}

fn default_shutdown_poll_ms() -> u64 {
    50
}

fn default_workers() -> usize {
    4
}

fn default_timeout_secs() -> u64 {
    10
}

// ---------- Remote ----------
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RemoteConfig {
    pub host: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Queue PUTs to a worker pool instead of sending them inline.
    #[serde(default)]
    pub pooled: bool,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

// ---------- Writer ----------
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WriterConfig {
    pub base_dir: String,
    #[serde(default)]
    pub blocks_per_segment: u64,
    #[serde(default)]
    pub segments_to_keep: u64,
    #[serde(default)]
    pub time_unit: TimeUnit,
    #[serde(default)]
    pub pack: bool,
    #[serde(default)]
    pub zip: bool,
    #[serde(default)]
    pub delete_existing: bool,
    #[serde(default)]
    pub verify_containment: bool,
    #[serde(default)]
    pub async_flush: bool,
    #[serde(default)]
    pub strict_flush: bool,
    /// Flush once a sample lies this many time units past the block start.
    #[serde(default)]
    pub auto_flush: i64,
    #[serde(default = "default_opaque_suffixes")]
    pub opaque_suffixes: Vec<String>,
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
    #[serde(default = "default_shutdown_poll_ms")]
    pub shutdown_poll_ms: u64,
    #[serde(default)]
    pub remote: Option<RemoteConfig>,
}

impl WriterConfig {
    /// Local writer with every option at its default.
    pub fn local(base_dir: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            blocks_per_segment: 0,
            segments_to_keep: 0,
            time_unit: TimeUnit::Millis,
            pack: false,
            zip: false,
            delete_existing: false,
            verify_containment: false,
            async_flush: false,
            strict_flush: false,
            auto_flush: 0,
            opaque_suffixes: default_opaque_suffixes(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            shutdown_poll_ms: default_shutdown_poll_ms(),
            remote: None,
        }
    }

    pub fn segmenting(&self) -> bool {
        self.blocks_per_segment > 0
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn shutdown_poll(&self) -> Duration {
        Duration::from_millis(self.shutdown_poll_ms.max(1))
    }

    pub fn validate(&self) -> WriterResult<()> {
        if self.base_dir.trim().is_empty() {
            return Err(WriterError::config("base_dir must not be empty"));
        }

        match &self.remote {
            Some(remote) => {
                if remote.host.trim().is_empty() {
                    return Err(WriterError::config("remote host must not be empty"));
                }
                if remote.pooled && remote.workers == 0 {
                    return Err(WriterError::config("pooled remote sink needs workers > 0"));
                }
            }
            None => {
                if self.verify_containment {
                    let cwd = std::env::current_dir().map_err(|e| {
                        WriterError::with_context("read working directory", e)
                    })?;
                    verify_containment(Path::new(&self.base_dir), &cwd)?;
                }
            }
        }

        Ok(())
    }
}

/// Lexically resolves `.` and `..` in `path` relative to `cwd`.
fn normalize(path: &Path, cwd: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    };

    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resolves symlinks in the longest existing prefix of an already
/// normalized path and re-appends the part that does not exist yet.
fn resolve_existing(path: &Path) -> PathBuf {
    let mut missing = Vec::new();
    let mut current = path;
    loop {
        if let Ok(real) = current.canonicalize() {
            return missing.iter().rev().fold(real, |acc, part| acc.join(part));
        }
        match (current.file_name(), current.parent()) {
            (Some(name), Some(parent)) => {
                missing.push(name.to_os_string());
                current = parent;
            }
            _ => return path.to_path_buf(),
        }
    }
}

/// Fails unless `path` is `cwd` or lies below it, following symlinks that
/// already exist on disk.
pub fn verify_containment(path: &Path, cwd: &Path) -> WriterResult<()> {
    let cwd = resolve_existing(&normalize(cwd, cwd));
    let resolved = resolve_existing(&normalize(path, &cwd));
    if resolved.starts_with(&cwd) {
        Ok(())
    } else {
        Err(WriterError::config(format!(
            "output path {} is outside of {}",
            resolved.display(),
            cwd.display()
        )))
    }
}

// ---------- Demo ----------
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DemoConfig {
    pub sample_interval_ms: u64,
    pub flush_interval_ms: u64,
    #[serde(default)]
    pub run_secs: Option<u64>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: 100,
            flush_interval_ms: 1_000,
            run_secs: None,
        }
    }
}

// ---------- Root ----------
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub writer: WriterConfig,
    #[serde(default)]
    pub demo: DemoConfig,
}

// ---------- Loader ----------
pub fn load(path: &str) -> anyhow::Result<AppConfig> {
    let txt = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&txt)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_from_toml() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [writer]
            base_dir = "data"
            "#,
        )
        .unwrap();

        let w = &cfg.writer;
        assert_eq!(w.base_dir, "data");
        assert_eq!(w.time_unit, TimeUnit::Millis);
        assert!(!w.segmenting());
        assert!(!w.pack && !w.zip && !w.strict_flush);
        assert!(w.opaque_suffixes.contains(&"bin".to_string()));
        assert_eq!(w.shutdown_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.demo.flush_interval_ms, 1_000);
    }

    #[test]
    fn full_toml() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [writer]
            base_dir = "CTdata/source"
            blocks_per_segment = 10
            segments_to_keep = 3
            time_unit = "seconds"
            pack = true
            zip = true
            auto_flush = 5

            [writer.remote]
            host = "http://localhost:8000"
            user = "u"
            pooled = true

            [demo]
            sample_interval_ms = 10
            flush_interval_ms = 200
            run_secs = 2
            "#,
        )
        .unwrap();

        let w = &cfg.writer;
        assert_eq!(w.time_unit, TimeUnit::Seconds);
        assert!(w.segmenting());
        assert_eq!(w.auto_flush, 5);
        let remote = w.remote.as_ref().unwrap();
        assert!(remote.pooled);
        assert_eq!(remote.workers, 4);
        assert_eq!(remote.password, None);
        assert!(w.validate().is_ok());
        assert_eq!(cfg.demo.run_secs, Some(2));
    }

    #[test]
    fn empty_base_is_config_error() {
        let cfg = WriterConfig::local("  ");
        assert!(matches!(cfg.validate(), Err(WriterError::Config { .. })));
    }

    #[test]
    fn containment() {
        let cwd = Path::new("/work/app");
        assert!(verify_containment(Path::new("data"), cwd).is_ok());
        assert!(verify_containment(Path::new("./data/../other"), cwd).is_ok());
        assert!(verify_containment(Path::new("/work/app"), cwd).is_ok());
        assert!(verify_containment(Path::new("/work/app/x/y"), cwd).is_ok());
        assert!(verify_containment(Path::new("../escape"), cwd).is_err());
        assert!(verify_containment(Path::new("/tmp/data"), cwd).is_err());
        assert!(verify_containment(Path::new("/work/application"), cwd).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn containment_follows_symlinks() {
        let tmp = tempfile::tempdir().unwrap();
        let work = tmp.path().join("work");
        let outside = tmp.path().join("outside");
        std::fs::create_dir_all(work.join("real")).unwrap();
        std::fs::create_dir_all(&outside).unwrap();
        std::os::unix::fs::symlink(&outside, work.join("link")).unwrap();

        assert!(verify_containment(Path::new("real/data"), &work).is_ok());
        assert!(verify_containment(Path::new("not/yet/there"), &work).is_ok());
        assert!(verify_containment(Path::new("link"), &work).is_err());
        assert!(verify_containment(Path::new("link/new/data"), &work).is_err());
    }
}
