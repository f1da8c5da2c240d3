//! The public-names index.
//!
//! Either read directly from `.debug_pubnames`/`.debug_pubtypes`, or
//! synthesized from externally-visible top-level definitions when those
//! sections are absent.

use gimli::Reader;

use crate::arena::{ObjectArena, ObjectHandle};
use crate::entity::ObjectFlags;
use crate::error::Result;
use crate::line::Slice;
use crate::unit::CompUnit;

/// Hash-table width for [`PubNamesTable`]. The original C source's
/// `SYM_HASH_SIZE` constant lives outside the files retrieved for this
/// rewrite; this picks a comparable fixed width rather than guessing at the
/// original value.
const SYM_HASH_SIZE: usize = 1024;

#[derive(Clone, Copy, Debug)]
struct PubNamesEntry {
    id: u64,
    next: u32,
}

/// A name-hash index over public (externally visible) definitions (§3).
///
/// Entry index `0` is a sentinel: `next == 0` terminates a bucket chain, and
/// no real entry is ever stored there.
#[derive(Debug)]
pub struct PubNamesTable {
    hash: [u32; SYM_HASH_SIZE],
    entries: Vec<PubNamesEntry>,
}

impl Default for PubNamesTable {
    fn default() -> Self {
        PubNamesTable {
            hash: [0; SYM_HASH_SIZE],
            entries: vec![PubNamesEntry { id: 0, next: 0 }],
        }
    }
}

impl PubNamesTable {
    fn insert(&mut self, name: &str, id: u64) {
        let bucket = calc_symbol_name_hash(name) % SYM_HASH_SIZE;
        let index = self.entries.len() as u32;
        self.entries.push(PubNamesEntry {
            id,
            next: self.hash[bucket],
        });
        self.hash[bucket] = index;
    }

    /// Iterates the ids chained under `name`'s bucket, most-recently-added first.
    pub fn lookup<'a>(&'a self, name: &str) -> impl Iterator<Item = u64> + 'a {
        let mut cursor = self.hash[calc_symbol_name_hash(name) % SYM_HASH_SIZE];
        std::iter::from_fn(move || {
            if cursor == 0 {
                return None;
            }
            let entry = self.entries[cursor as usize];
            cursor = entry.next;
            Some(entry.id)
        })
    }
}

/// Folds every byte of `name` into a rolling hash, in the same style as
/// [`crate::line::calc_file_name_hash`] but over the whole string rather
/// than just the basename — public names carry no directory component.
pub fn calc_symbol_name_hash(name: &str) -> usize {
    let mut h: u32 = 0;
    for &byte in name.as_bytes() {
        h = h.wrapping_shl(4).wrapping_add(byte as u32);
        let g = h & 0xf000_0000;
        if g != 0 {
            h ^= g >> 24;
        }
        h &= !g;
    }
    h as usize
}

/// Parses `.debug_pubnames` or `.debug_pubtypes` (same wire format), filing
/// each entry at `debug_info_addr + unit_offset + object_offset` (§4.7).
pub fn load_pub_names(
    data: &[u8],
    debug_info_addr: u64,
    endian: gimli::RunTimeEndian,
    table: &mut PubNamesTable,
) -> Result<()> {
    let mut reader = Slice::new(data, endian);

    while !reader.is_empty() {
        let set_start = reader.clone();
        let unit_length = reader.read_u32()? as u64;
        if unit_length == 0 {
            break;
        }
        let _version = reader.read_u16()?;
        let unit_offset = reader.read_u32()? as u64;
        let _debug_info_length = reader.read_u32()?;

        loop {
            let object_offset = reader.read_u32()? as u64;
            if object_offset == 0 {
                break;
            }
            let name = reader.read_null_terminated_slice()?;
            let name = std::str::from_utf8(name.slice())
                .map_err(|_| crate::error::ErrorKind::InvalidDwarf)?;
            table.insert(name, debug_info_addr + unit_offset + object_offset);
        }

        let consumed = reader.offset_from(&set_start).into_u64();
        if consumed < unit_length + 4 {
            reader.skip(gimli::ReaderOffset::from_u64(unit_length + 4 - consumed)?)?;
        }
    }

    Ok(())
}

/// Builds a [`PubNamesTable`] from externally-visible top-level definitions
/// when no explicit `.debug_pubnames`/`.debug_pubtypes` section exists.
///
/// `children_of` is the lazy-child accessor (§6, `get_dwarf_children`):
/// calling it on a compile unit's root entity forces that unit's direct
/// children to be linked, exactly as the explicit-section path would find
/// them already linked by the walker.
pub fn synthesize_pub_names<'data>(
    arena: &mut ObjectArena<'data>,
    units: &[CompUnit<'data>],
    mut children_of: impl FnMut(&mut ObjectArena<'data>, ObjectHandle) -> Result<Option<ObjectHandle>>,
) -> Result<PubNamesTable> {
    let mut table = PubNamesTable::default();

    for unit in units {
        let mut cursor = children_of(arena, unit.object)?;
        while let Some(handle) = cursor {
            let info = arena.get(handle);
            if info.flags.contains(ObjectFlags::EXTERNAL)
                && info.definition.is_none()
                && info.name.is_some()
            {
                table.insert(info.name.unwrap(), info.id);
            }
            cursor = info.sibling;
        }
    }

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_name_hash_is_stable_and_bounded() {
        let h1 = calc_symbol_name_hash("main");
        let h2 = calc_symbol_name_hash("main");
        assert_eq!(h1, h2);
        assert!(h1 < SYM_HASH_SIZE);
    }

    #[test]
    fn lookup_returns_most_recent_first() {
        let mut table = PubNamesTable::default();
        table.insert("foo", 0x100);
        table.insert("foo", 0x200);
        let ids: Vec<u64> = table.lookup("foo").collect();
        assert_eq!(ids, vec![0x200, 0x100]);
    }

    #[test]
    fn lookup_of_unknown_name_is_empty() {
        let table = PubNamesTable::default();
        assert_eq!(table.lookup("nope").count(), 0);
    }
}
