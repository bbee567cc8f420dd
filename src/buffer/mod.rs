pub mod channel;
pub mod clock;

use std::collections::BTreeMap;

use crate::core::{WriterError, WriterResult};

pub use channel::{ChannelEntry, DEFAULT_OPAQUE_SUFFIXES, is_packable_name};
pub use clock::{AUTO_TIME, Anchors, Clock};

/// Channel map of the currently open block.
///
/// Channels iterate in name order, which fixes the order of output units.
#[derive(Debug)]
pub struct BlockBuffer {
    channels: BTreeMap<String, ChannelEntry>,
    pack_enabled: bool,
    opaque: Vec<String>,
}

impl BlockBuffer {
    pub fn new(pack_enabled: bool, opaque: Vec<String>) -> Self {
        Self {
            channels: BTreeMap::new(),
            pack_enabled,
            opaque,
        }
    }

    pub fn validate(name: &str, payload: &[u8]) -> WriterResult<()> {
        if name.is_empty() {
            return Err(WriterError::invalid_argument("channel name is empty"));
        }
        if payload.is_empty() {
            return Err(WriterError::invalid_argument(format!(
                "empty payload for channel '{}'",
                name
            )));
        }
        Ok(())
    }

    pub fn add(&mut self, name: &str, timestamp: i64, payload: &[u8]) -> WriterResult<()> {
        Self::validate(name, payload)?;
        let packs = self.packs(name);
        self.channels
            .entry(name.to_string())
            .or_insert_with(|| ChannelEntry::new(packs))
            .push(timestamp, payload);
        Ok(())
    }

    /// Whether samples for `name` are packed in the open block.
    pub fn packs(&self, name: &str) -> bool {
        match self.channels.get(name) {
            Some(entry) => entry.packable(),
            None => self.pack_enabled && is_packable_name(name, &self.opaque),
        }
    }

    pub fn pack_enabled(&self) -> bool {
        self.pack_enabled
    }

    /// Affects channels created after the call.
    pub fn set_pack_enabled(&mut self, enabled: bool) {
        self.pack_enabled = enabled;
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn sample_count(&self) -> usize {
        self.channels.values().map(ChannelEntry::len).sum()
    }

    pub fn channel(&self, name: &str) -> Option<&ChannelEntry> {
        self.channels.get(name)
    }

    /// Moves all buffered channels out, leaving the buffer empty.
    pub fn take(&mut self) -> BTreeMap<String, ChannelEntry> {
        std::mem::take(&mut self.channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(pack: bool) -> BlockBuffer {
        BlockBuffer::new(pack, DEFAULT_OPAQUE_SUFFIXES.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn rejects_empty_arguments() {
        let mut buf = buffer(true);
        assert!(matches!(buf.add("", 1, b"x"), Err(WriterError::InvalidArgument { .. })));
        assert!(matches!(buf.add("a.csv", 1, b""), Err(WriterError::InvalidArgument { .. })));
        assert!(buf.is_empty());
    }

    #[test]
    fn packing_needs_flag_and_suffix() {
        let mut buf = buffer(false);
        buf.add("a.csv", 1, b"1,").unwrap();
        buf.add("a.csv", 2, b"2,").unwrap();
        assert_eq!(buf.channel("a.csv").unwrap().len(), 2);

        let mut buf = buffer(true);
        buf.add("a.csv", 1, b"1,").unwrap();
        buf.add("a.csv", 2, b"2,").unwrap();
        buf.add("b.bin", 2, &[1]).unwrap();
        buf.add("b.bin", 3, &[2]).unwrap();
        assert_eq!(buf.channel("a.csv").unwrap().len(), 1);
        assert_eq!(buf.channel("b.bin").unwrap().len(), 2);
        assert_eq!(buf.sample_count(), 3);
    }

    #[test]
    fn packability_fixed_at_creation() {
        let mut buf = buffer(true);
        buf.add("a.csv", 1, b"1,").unwrap();
        buf.set_pack_enabled(false);
        assert!(buf.packs("a.csv"));
        assert!(!buf.packs("c.csv"));
    }

    #[test]
    fn take_empties() {
        let mut buf = buffer(true);
        buf.add("z", 1, b"1").unwrap();
        buf.add("a", 1, b"1").unwrap();
        let taken = buf.take();
        assert!(buf.is_empty());
        assert_eq!(taken.keys().cloned().collect::<Vec<_>>(), vec!["a", "z"]);
    }
}
