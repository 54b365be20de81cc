//! Street-name interning.
//!
//! Names are stored as one long concatenation with a prefix-sum offset
//! index; each name id covers a (name, destinations, pronunciation, ref)
//! quadruple. Lookup returns read-only substring views into the blob.

use rustc_hash::FxHashMap;

use crate::ids::NameId;

pub const STRINGS_PER_NAME: usize = 4;

#[derive(Default)]
pub struct NameTable {
    blob: String,
    /// Prefix sums into `blob`; `STRINGS_PER_NAME * n + 1` entries.
    offsets: Vec<u32>,
    dedup: FxHashMap<[String; STRINGS_PER_NAME], NameId>,
}

impl NameTable {
    pub fn new() -> Self {
        Self {
            blob: String::new(),
            offsets: vec![0],
            dedup: FxHashMap::default(),
        }
    }

    /// Intern a quadruple, returning the existing id on a repeat.
    pub fn insert(
        &mut self,
        name: &str,
        destinations: &str,
        pronunciation: &str,
        reference: &str,
    ) -> NameId {
        let key = [
            name.to_string(),
            destinations.to_string(),
            pronunciation.to_string(),
            reference.to_string(),
        ];
        if let Some(&id) = self.dedup.get(&key) {
            return id;
        }

        let id = self.len() as NameId;
        for part in &key {
            self.blob.push_str(part);
            self.offsets.push(self.blob.len() as u32);
        }
        self.dedup.insert(key, id);
        id
    }

    fn view(&self, id: NameId, slot: usize) -> &str {
        let index = id as usize * STRINGS_PER_NAME + slot;
        let start = self.offsets[index] as usize;
        let end = self.offsets[index + 1] as usize;
        &self.blob[start..end]
    }

    pub fn name(&self, id: NameId) -> &str {
        self.view(id, 0)
    }

    pub fn destinations(&self, id: NameId) -> &str {
        self.view(id, 1)
    }

    pub fn pronunciation(&self, id: NameId) -> &str {
        self.view(id, 2)
    }

    pub fn reference(&self, id: NameId) -> &str {
        self.view(id, 3)
    }

    pub fn len(&self) -> usize {
        (self.offsets.len() - 1) / STRINGS_PER_NAME
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn blob(&self) -> &str {
        &self.blob
    }

    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }
}
