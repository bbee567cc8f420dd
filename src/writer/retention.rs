use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// Runs after a segment has been completed.
pub trait RetentionPolicy: Send {
    /// `source_dir` holds one subdirectory per segment. Returns how many
    /// segments were retired.
    fn run(&mut self, source_dir: &Path) -> anyhow::Result<usize>;
}

/// Keeps the newest `keep` full segments plus the active one on disk.
pub struct FsSegmentRetention {
    keep: usize,
    known: BTreeSet<i64>,
}

impl FsSegmentRetention {
    pub fn new(keep: usize) -> Self {
        Self {
            keep,
            known: BTreeSet::new(),
        }
    }

    pub fn known(&self) -> impl Iterator<Item = &i64> {
        self.known.iter()
    }

    fn parse_segment(name: &str) -> Option<i64> {
        name.parse::<i64>().ok()
    }

    /// Segment directory names currently present below `source_dir`.
    fn discover(source_dir: &Path) -> Vec<i64> {
        let entries = match fs::read_dir(source_dir) {
            Ok(e) => e,
            Err(_) => return Vec::new(),
        };

        entries
            .flatten()
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|e| e.file_name().to_str().and_then(Self::parse_segment))
            .collect()
    }
}

impl RetentionPolicy for FsSegmentRetention {
    fn run(&mut self, source_dir: &Path) -> anyhow::Result<usize> {
        if self.keep == 0 {
            return Ok(0);
        }

        let mut found_new = false;
        for segment in Self::discover(source_dir) {
            found_new |= self.known.insert(segment);
        }
        if !found_new {
            return Ok(0);
        }

        let limit = self.keep + 1;
        let excess = self.known.len().saturating_sub(limit);
        let doomed: Vec<i64> = self.known.iter().copied().take(excess).collect();

        for segment in &doomed {
            // dropped from tracking whether or not the delete works
            self.known.remove(segment);
            let path = source_dir.join(segment.to_string());
            match fs::remove_dir_all(&path) {
                Ok(_) => log::info!("[retention] removed {:?}", path),
                Err(err) => log::warn!("[retention] failed {:?}: {}", path, err),
            }
        }

        Ok(doomed.len())
    }
}
