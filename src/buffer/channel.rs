/// Channel suffixes that are never packed by default.
pub const DEFAULT_OPAQUE_SUFFIXES: &[&str] = &["bin", "jpg", "jpeg", "png", "gif", "wav", "mp3", "txt"];

/// Whether a channel name may be packed, judged by its suffix.
///
/// Names without a suffix are packable. Suffix comparison ignores ASCII case.
pub fn is_packable_name(name: &str, opaque: &[String]) -> bool {
    let suffix = match name.rsplit_once('.') {
        Some((_, suffix)) => suffix,
        None => return true,
    };
    !opaque.iter().any(|o| o.trim_start_matches('.').eq_ignore_ascii_case(suffix))
}

/// Samples buffered for one channel within the open block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEntry {
    timestamps: Vec<i64>,
    payloads: Vec<Vec<u8>>,
    packable: bool,
}

impl ChannelEntry {
    pub fn new(packable: bool) -> Self {
        Self {
            timestamps: Vec::new(),
            payloads: Vec::new(),
            packable,
        }
    }

    /// Records one sample.
    ///
    /// A packable entry keeps a single payload that grows by concatenation and
    /// a single timestamp holding the latest value.
    pub fn push(&mut self, timestamp: i64, payload: &[u8]) {
        if self.packable && !self.payloads.is_empty() {
            self.payloads[0].extend_from_slice(payload);
            self.timestamps[0] = timestamp;
        } else {
            self.timestamps.push(timestamp);
            self.payloads.push(payload.to_vec());
        }
    }

    pub fn packable(&self) -> bool {
        self.packable
    }

    pub fn timestamps(&self) -> &[i64] {
        &self.timestamps
    }

    pub fn payloads(&self) -> &[Vec<u8>] {
        &self.payloads
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn byte_len(&self) -> usize {
        self.payloads.iter().map(Vec::len).sum()
    }

    pub fn samples(&self) -> impl Iterator<Item = (i64, &[u8])> {
        self.timestamps
            .iter()
            .copied()
            .zip(self.payloads.iter().map(Vec::as_slice))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opaque() -> Vec<String> {
        DEFAULT_OPAQUE_SUFFIXES.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn classification_by_suffix() {
        let opaque = opaque();
        assert!(is_packable_name("a.csv", &opaque));
        assert!(is_packable_name("temperature", &opaque));
        assert!(is_packable_name("dir/x.f64", &opaque));
        assert!(!is_packable_name("b.bin", &opaque));
        assert!(!is_packable_name("cam.JPG", &opaque));
        assert!(!is_packable_name("notes.txt", &opaque));
        assert!(is_packable_name("b.bin", &[]));
        assert!(!is_packable_name("b.raw", &[".raw".to_string()]));
    }

    #[test]
    fn packed_entry_concatenates() {
        let mut entry = ChannelEntry::new(true);
        entry.push(10, b"1,");
        entry.push(20, b"2,");
        entry.push(30, b"3,");

        assert_eq!(entry.len(), 1);
        assert_eq!(entry.timestamps(), &[30]);
        assert_eq!(entry.payloads()[0], b"1,2,3,".to_vec());
    }

    #[test]
    fn plain_entry_appends() {
        let mut entry = ChannelEntry::new(false);
        entry.push(10, &[1]);
        entry.push(10, &[2, 3]);

        assert_eq!(entry.len(), 2);
        assert_eq!(entry.byte_len(), 3);
        let samples: Vec<_> = entry.samples().collect();
        assert_eq!(samples, vec![(10, &[1u8][..]), (10, &[2u8, 3][..])]);
    }
}
