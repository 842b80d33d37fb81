//! Detects keywords sharing a key signature, via double hashing.
use std::hash::{Hash, Hasher};

use seahash::SeaHasher;

use crate::keyword::KeywordExt;
use crate::NIL;

/// How much larger than the keyword count the table is sized. The slack
/// keeps probe sequences short and guarantees insertion terminates.
const TABLE_MULTIPLE: usize = 10;

/// Open-addressing table keyed on keyword signatures.
///
/// `insert` answers the one question the search keeps asking: has a keyword
/// with this signature (and, unless lengths are ignored, this length) been
/// seen before? The size is a power of two, which turns the modulo of the
/// double-hash probe sequence into a mask and, with the forced-odd
/// increment, makes the sequence visit every slot.
pub struct HashTable {
    slots: Vec<u32>,
    ignore_length: bool,
}

impl HashTable {
    pub fn new(capacity: usize, ignore_length: bool) -> Self {
        let size = (capacity * TABLE_MULTIPLE).next_power_of_two();
        Self {
            slots: vec![NIL; size],
            ignore_length,
        }
    }

    /// Looks up the entry equal to `keywords[id]`, inserting `id` if there
    /// is none. Returns the prior entry's id on a hit.
    pub fn insert(&mut self, id: u32, keywords: &[KeywordExt]) -> Option<u32> {
        let item = &keywords[id as usize];
        let hash = signature_hash(&item.selchars);
        let mask = (self.slots.len() - 1) as u64;
        let mut probe = (hash & mask) as usize;
        let increment = (((hash ^ item.allchars.len() as u64) | 1) & mask) as usize;

        loop {
            let slot = self.slots[probe];
            if slot == NIL {
                break;
            }
            let other = &keywords[slot as usize];
            if other.selchars == item.selchars
                && (self.ignore_length || other.allchars.len() == item.allchars.len())
            {
                return Some(slot);
            }
            probe = (probe + increment) & mask as usize;
        }
        self.slots[probe] = id;
        None
    }
}

fn signature_hash(selchars: &[u32]) -> u64 {
    let mut hasher = SeaHasher::new();
    selchars.hash(&mut hasher);
    hasher.finish()
}
