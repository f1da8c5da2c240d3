//! The entity interner.
//!
//! Allocates [`ObjectInfo`] records from fixed-size chunks (mirroring the
//! `ObjectArray`/`OBJECT_ARRAY_SIZE` scheme of the C original) and hands out
//! stable [`ObjectHandle`]s instead of pointers, since a handle survives the
//! arena's outer `Vec` growing without unsafe code.

use crate::entity::ObjectInfo;
use crate::error::{ErrorKind, Result};

/// Number of entities per arena chunk (`OBJECT_ARRAY_SIZE` in the original).
const CHUNK_SIZE: usize = 128;

/// A stable handle to an interned [`ObjectInfo`].
///
/// Never invalidated by further allocation: chunks are appended, never
/// moved or freed individually.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObjectHandle(u32);

impl ObjectHandle {
    fn new(index: usize) -> Self {
        ObjectHandle(index as u32)
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Owns the chunked storage of all entities interned for one [`Cache`](crate::cache::Cache),
/// plus the id→handle hash table used to deduplicate re-references to the
/// same DWARF offset.
pub struct ObjectArena<'data> {
    chunks: Vec<Box<[ObjectInfo<'data>; CHUNK_SIZE]>>,
    len: usize,
    hash: Vec<Option<ObjectHandle>>,
    section_start: u64,
    section_end: u64,
}

impl<'data> ObjectArena<'data> {
    /// Creates an arena sized for a `.debug_info`-like section spanning
    /// `[section_start, section_end)`, with the table-sizing rule from §4.1:
    /// `max(251, total_debug_info_bytes / 100)`.
    pub fn new(section_start: u64, section_end: u64, total_debug_info_bytes: u64) -> Self {
        let table_size = std::cmp::max(251, (total_debug_info_bytes / 100) as usize);
        ObjectArena {
            chunks: Vec::new(),
            len: 0,
            hash: vec![None; table_size],
            section_start,
            section_end,
        }
    }

    fn bucket(&self, id: u64) -> usize {
        let h = id.wrapping_add(id >> 8);
        (h % self.hash.len() as u64) as usize
    }

    /// Returns the handle for `id`, interning a fresh placeholder entity if
    /// this is the first time `id` has been referenced.
    ///
    /// Fails with [`ErrorKind::InvalidReference`] when `id` lies outside the
    /// arena's section bounds (I5).
    pub fn intern(&mut self, id: u64) -> Result<ObjectHandle> {
        if let Some(handle) = self.lookup(id) {
            return Ok(handle);
        }
        if id < self.section_start || id > self.section_end {
            return Err(ErrorKind::InvalidReference.into());
        }

        let handle = self.alloc(ObjectInfo::placeholder(id));
        let bucket = self.bucket(id);
        self.get_mut(handle).hash_next = self.hash[bucket];
        self.hash[bucket] = Some(handle);
        Ok(handle)
    }

    /// Looks up an already-interned entity by id without allocating.
    pub fn lookup(&self, id: u64) -> Option<ObjectHandle> {
        let bucket = self.bucket(id);
        let mut cursor = self.hash[bucket];
        while let Some(handle) = cursor {
            let info = self.get(handle);
            if info.id == id {
                return Some(handle);
            }
            cursor = info.hash_next;
        }
        None
    }

    /// Allocates a synthetic entity (fund_type, index_range, mod_pointer,
    /// mod_reference) at a stream-position-derived id that is guaranteed not
    /// to collide with a real DIE offset while attributes of the enclosing
    /// DIE are being decoded (Design Notes, "Synthetic entity IDs"). Does
    /// not touch the id→handle hash table: synthetic entities are never
    /// looked up by id, only referenced structurally.
    pub fn alloc_synthetic(&mut self, info: ObjectInfo<'data>) -> ObjectHandle {
        self.alloc(info)
    }

    fn alloc(&mut self, info: ObjectInfo<'data>) -> ObjectHandle {
        let chunk_idx = self.len / CHUNK_SIZE;
        let slot_idx = self.len % CHUNK_SIZE;
        if chunk_idx == self.chunks.len() {
            self.chunks.push(Box::new(
                [ObjectInfo::default(); CHUNK_SIZE],
            ));
        }
        self.chunks[chunk_idx][slot_idx] = info;
        let handle = ObjectHandle::new(self.len);
        self.len += 1;
        handle
    }

    /// Borrows the entity behind `handle`.
    pub fn get(&self, handle: ObjectHandle) -> &ObjectInfo<'data> {
        let idx = handle.index();
        &self.chunks[idx / CHUNK_SIZE][idx % CHUNK_SIZE]
    }

    /// Mutably borrows the entity behind `handle`.
    pub fn get_mut(&mut self, handle: ObjectHandle) -> &mut ObjectInfo<'data> {
        let idx = handle.index();
        &mut self.chunks[idx / CHUNK_SIZE][idx % CHUNK_SIZE]
    }

    /// Iterates all interned entities in allocation order, including
    /// placeholders.
    pub fn iter(&self) -> impl Iterator<Item = (ObjectHandle, &ObjectInfo<'data>)> {
        (0..self.len).map(move |i| {
            let handle = ObjectHandle::new(i);
            (handle, self.get(handle))
        })
    }

    /// Total number of interned entities (real and placeholder).
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_deduplicates_by_id() {
        let mut arena = ObjectArena::new(0x1000, 0x2000, 500);
        let a = arena.intern(0x1010).unwrap();
        let b = arena.intern(0x1010).unwrap();
        assert_eq!(a, b);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn intern_rejects_out_of_bounds_id() {
        let mut arena = ObjectArena::new(0x1000, 0x2000, 500);
        assert!(arena.intern(0x10).is_err());
        assert!(arena.intern(0x3000).is_err());
    }

    #[test]
    fn allocation_spans_multiple_chunks() {
        let mut arena = ObjectArena::new(0, 10_000, 500);
        let mut handles = Vec::new();
        for id in 0..(CHUNK_SIZE as u64 * 3 + 7) {
            handles.push(arena.intern(id).unwrap());
        }
        for (i, handle) in handles.iter().enumerate() {
            assert_eq!(arena.get(*handle).id, i as u64);
        }
    }

    #[test]
    fn table_sizing_follows_the_documented_rule() {
        let arena = ObjectArena::new(0, 1_000_000, 10_000);
        assert_eq!(arena.hash.len(), 251);
        let arena = ObjectArena::new(0, 1_000_000, 100_000);
        assert_eq!(arena.hash.len(), 1_000);
    }

    #[test]
    fn find_object_matches_p1() {
        let mut arena = ObjectArena::new(0, 10_000, 500);
        let handle = arena.intern(42).unwrap();
        assert_eq!(arena.lookup(42), Some(handle));
        assert_eq!(arena.get(handle).id, 42);
    }
}
