/// Directory names of one flushed block.
///
/// ```text
/// <base>/<sourceStart>/[<segmentRel>/]<blockRel>/<pointRel>/<channel>
/// <base>/<sourceStart>/[<segmentRel>/]<blockRel>.zip
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockLayout {
    base: String,
    pub source_start: i64,
    pub segment_rel: Option<i64>,
    pub block_rel: i64,
}

impl BlockLayout {
    pub fn new(base: &str, source_start: i64, segment_rel: Option<i64>, block_rel: i64) -> Self {
        // a bare "/" base becomes "" and still yields "/<source>/"
        let base = base.replace('\\', "/").trim_end_matches('/').to_string();
        Self {
            base,
            source_start,
            segment_rel,
            block_rel,
        }
    }

    /// Parent directory of the block: source plus optional segment level.
    pub fn parent_dir(&self) -> String {
        let mut dir = format!("{}/{}/", self.base, self.source_start);
        if let Some(segment) = self.segment_rel {
            dir.push_str(&format!("{}/", segment));
        }
        dir
    }

    pub fn source_dir(&self) -> String {
        format!("{}/{}/", self.base, self.source_start)
    }

    pub fn block_dir(&self) -> String {
        format!("{}{}/", self.parent_dir(), self.block_rel)
    }

    pub fn sample_dir(&self, point_rel: i64) -> String {
        format!("{}{}/", self.block_dir(), point_rel)
    }

    pub fn archive_name(&self) -> String {
        format!("{}.zip", self.block_rel)
    }
}

/// Entry name of one sample inside a block archive.
pub fn archive_entry(point_rel: i64, channel: &str) -> String {
    format!("{}/{}", point_rel, channel.replace('\\', "/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsegmented_paths() {
        let layout = BlockLayout::new("out/src/", 1_700_000_000_000, None, 2_500);
        assert_eq!(layout.source_dir(), "out/src/1700000000000/");
        assert_eq!(layout.parent_dir(), "out/src/1700000000000/");
        assert_eq!(layout.block_dir(), "out/src/1700000000000/2500/");
        assert_eq!(layout.sample_dir(0), "out/src/1700000000000/2500/0/");
        assert_eq!(layout.archive_name(), "2500.zip");
    }

    #[test]
    fn segmented_paths() {
        let layout = BlockLayout::new("out", 1_000, Some(4_000), 300);
        assert_eq!(layout.parent_dir(), "out/1000/4000/");
        assert_eq!(layout.sample_dir(17), "out/1000/4000/300/17/");
    }

    #[test]
    fn absolute_base_and_negative_offsets() {
        let layout = BlockLayout::new("/var/log/ct", 5, Some(0), 0);
        assert_eq!(layout.sample_dir(-2), "/var/log/ct/5/0/0/-2/");
    }

    #[test]
    fn archive_entries_use_forward_slash() {
        assert_eq!(archive_entry(0, "a.csv"), "0/a.csv");
        assert_eq!(archive_entry(12, "cam\\x.jpg"), "12/cam/x.jpg");
    }
}
