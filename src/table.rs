//! Label tables for the assembler, built on 32-bit FNV-1a with open
//! addressing and linear probing.

const FNV_OFFSET_BASIS: u32 = 0x811c9dc5;
const FNV_PRIME: u32 = 0x01000193;

const INIT_CAPACITY: usize = 8;
const GROWTH_FACTOR: usize = 2;

/// 32-bit FNV-1a. Probe sequences depend on this exact bit pattern, so it
/// is written out here rather than delegated to a hasher crate.
pub fn fnv1a(data: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for &byte in data {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

enum Slot<V> {
    Empty,
    Tombstone,
    Occupied { key: String, value: V },
}

impl<V> Slot<V> {
    fn is_free(&self) -> bool {
        matches!(self, Slot::Empty | Slot::Tombstone)
    }
}

/// String-keyed hash table. Capacity is always a power of two; the table
/// doubles once it is three-quarters full. Removal leaves a tombstone so
/// probe chains stay intact.
pub struct Table<V> {
    slots: Vec<Slot<V>>,
    used: usize,
}

impl<V> Table<V> {
    pub fn new() -> Self {
        Self {
            slots: (0..INIT_CAPACITY).map(|_| Slot::Empty).collect(),
            used: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.used
    }

    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Inserts into the first free slot on the probe chain. No duplicate
    /// scan is done, so inserting an existing key shadows it: lookups keep
    /// returning the earlier entry.
    pub fn insert(&mut self, key: String, value: V) {
        // used/allocated >= 0.75, checked before the slot is claimed
        if self.used * 4 >= self.slots.len() * 3 {
            self.grow();
        }
        let cap = self.slots.len();
        let index = fnv1a(key.as_bytes()) as usize;
        for i in 0..cap {
            let slot = &mut self.slots[(index + i) & (cap - 1)];
            if slot.is_free() {
                *slot = Slot::Occupied { key, value };
                self.used += 1;
                return;
            }
        }
        unreachable!("growth keeps at least a quarter of the slots free");
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.position(key)
            .map(|at| match &self.slots[at] {
                Slot::Occupied { value, .. } => value,
                _ => unreachable!(),
            })
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        self.position(key)
            .map(|at| match &mut self.slots[at] {
                Slot::Occupied { value, .. } => value,
                _ => unreachable!(),
            })
    }

    pub fn remove(&mut self, key: &str) -> Option<V> {
        let at = self.position(key)?;
        match std::mem::replace(&mut self.slots[at], Slot::Tombstone) {
            Slot::Occupied { value, .. } => {
                self.used -= 1;
                Some(value)
            }
            _ => unreachable!(),
        }
    }

    /// Entries in slot-enumeration order, the same order growth re-inserts
    /// them in. Backpatching iterates this, so emitted bytes do not depend
    /// on declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.slots.iter().filter_map(|slot| match slot {
            Slot::Occupied { key, value } => Some((key.as_str(), value)),
            _ => None,
        })
    }

    /// Probes from the key's hash until an empty slot, skipping tombstones.
    fn position(&self, key: &str) -> Option<usize> {
        let cap = self.slots.len();
        let index = fnv1a(key.as_bytes()) as usize;
        for i in 0..cap {
            let at = (index + i) & (cap - 1);
            match &self.slots[at] {
                Slot::Empty => return None,
                Slot::Tombstone => continue,
                Slot::Occupied { key: found, .. } => {
                    if found == key {
                        return Some(at);
                    }
                }
            }
        }
        None
    }

    fn grow(&mut self) {
        let doubled = (0..self.slots.len() * GROWTH_FACTOR)
            .map(|_| Slot::Empty)
            .collect();
        let old = std::mem::replace(&mut self.slots, doubled);
        self.used = 0;
        for slot in old {
            if let Slot::Occupied { key, value } = slot {
                self.insert(key, value);
            }
        }
    }
}

impl<V> Default for Table<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv_reference_vector() {
        assert_eq!(fnv1a(b"test"), 0xAFD071E5);
    }

    #[test]
    fn insert_and_lookup() {
        let mut table: Table<u16> = Table::new();
        table.insert("main".into(), 0x200);
        table.insert("loop".into(), 0x20A);
        assert_eq!(table.get("main"), Some(&0x200));
        assert_eq!(table.get("loop"), Some(&0x20A));
        assert_eq!(table.get("missing"), None);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn remove_leaves_probe_chain_intact() {
        let mut table: Table<u16> = Table::new();
        for (i, key) in ["a", "b", "c", "d", "e"].iter().enumerate() {
            table.insert((*key).into(), i as u16);
        }
        assert_eq!(table.remove("c"), Some(2));
        assert_eq!(table.get("c"), None);
        assert_eq!(table.get("a"), Some(&0));
        assert_eq!(table.get("e"), Some(&4));
        assert_eq!(table.len(), 4);
        // tombstone is reused by the next insert on that chain
        table.insert("c".into(), 9);
        assert_eq!(table.get("c"), Some(&9));
    }

    #[test]
    fn grows_at_three_quarters_load() {
        let mut table: Table<u16> = Table::new();
        let keys = ["a", "b", "c", "d", "e", "f", "g"];
        for (i, key) in keys.iter().enumerate() {
            table.insert((*key).into(), i as u16);
        }
        // the seventh insert finds 6/8 used and doubles first
        assert_eq!(table.capacity(), 16);
        for (i, key) in keys.iter().enumerate() {
            assert_eq!(table.get(key), Some(&(i as u16)));
        }
    }

    #[test]
    fn duplicate_keys_shadow() {
        let mut table: Table<u16> = Table::new();
        table.insert("start".into(), 1);
        table.insert("start".into(), 2);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("start"), Some(&1));
    }

    #[test]
    fn get_mut_updates_in_place() {
        let mut table: Table<Vec<u16>> = Table::new();
        table.insert("refs".into(), vec![0x206]);
        table.get_mut("refs").unwrap().push(0x20C);
        assert_eq!(table.get("refs"), Some(&vec![0x206, 0x20C]));
    }
}
