use std::collections::BTreeMap;

/// Location of the newest record for a key.
///
/// `offset` and `len` span the whole record, header included, so a read can
/// re-verify the checksum instead of trusting the raw value bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct KeydirEntry {
    pub segment_id: u64,
    pub offset: u64,
    pub len: u32,
    /// Write time of the record; carried for a future merge pass.
    #[allow(dead_code)]
    pub timestamp: u32,
}

/// In-memory map from key bytes to the on-disk location of the newest value.
///
/// Keys are opaque binary. The keydir is rebuilt from the segment files on
/// open and never persisted; it does not own the segment handles it refers
/// to, only their ids.
#[derive(Debug, Default)]
pub(crate) struct Keydir {
    entries: BTreeMap<Vec<u8>, KeydirEntry>,
}

impl Keydir {
    pub fn get(&self, key: &[u8]) -> Option<&KeydirEntry> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: Vec<u8>, entry: KeydirEntry) {
        self.entries.insert(key, entry);
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<KeydirEntry> {
        self.entries.remove(key)
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> Vec<Vec<u8>> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
