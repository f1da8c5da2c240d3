//! The reference resolver.
//!
//! Drains a FIFO worklist of pending cross-entity references — type
//! pointers, and `specification`/`abstract_origin`/`extension` back-links —
//! materializing placeholder entities on demand and propagating inherited
//! attributes onto their referents.

use std::collections::VecDeque;

use crate::arena::{ObjectArena, ObjectHandle};
use crate::entity::{ObjectFlags, Tag, INHERITABLE_FLAGS};
use crate::error::{ErrorKind, Result};
use crate::unit::{CompUnit, SectionKind};

/// One entry of the pending-reference worklist.
///
/// `referent` is `None` for a plain type-pointer reference (only
/// materialization is needed); it is `Some` for a
/// `specification`/`abstract_origin`/`extension` back-link, where attributes
/// additionally propagate from `origin` onto `referent`.
#[derive(Clone, Copy, Debug)]
pub struct PendingReference {
    pub section: SectionKind,
    pub origin: ObjectHandle,
    pub referent: Option<ObjectHandle>,
}

/// The FIFO worklist itself (§5, "Ordering guarantees": drainage is FIFO).
#[derive(Debug, Default)]
pub struct ReferenceQueue {
    entries: VecDeque<PendingReference>,
}

impl ReferenceQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: PendingReference) {
        self.entries.push_back(entry);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn find_owning_unit(units: &[CompUnit<'_>], section: SectionKind, id: u64) -> Option<usize> {
    units
        .iter()
        .position(|u| u.desc.section == section && u.contains_section_offset(id))
}

/// Marks `handle` and every enclosing `class_type`/`structure_type` ancestor
/// `external`, per step 4's "walk up class/struct parents" clause.
fn propagate_external_to_ancestors(arena: &mut ObjectArena<'_>, handle: ObjectHandle) {
    let mut cursor = arena.get(handle).parent;
    while let Some(parent) = cursor {
        let info = arena.get(parent);
        let is_aggregate = matches!(
            info.tag,
            Tag::Dwarf(t)
                if t == gimli::constants::DW_TAG_class_type
                    || t == gimli::constants::DW_TAG_structure_type
        );
        if !is_aggregate {
            break;
        }
        arena.get_mut(parent).flags |= ObjectFlags::EXTERNAL;
        cursor = info.parent;
    }
}

/// Drains `queue`, materializing placeholders via `materialize` and applying
/// the propagation rules of §4.5 step 4. `materialize` re-enters the walker
/// at `handle`'s byte position; it may itself push further entries onto
/// `queue` (step 5), so draining continues until the worklist is empty.
pub fn drain<'data>(
    queue: &mut ReferenceQueue,
    arena: &mut ObjectArena<'data>,
    units: &mut [CompUnit<'data>],
    mut materialize: impl FnMut(&mut ObjectArena<'data>, &mut [CompUnit<'data>], &mut ReferenceQueue, ObjectHandle) -> Result<()>,
) -> Result<()> {
    loop {
        let entry = match queue.entries.pop_front() {
            Some(entry) => entry,
            None => break,
        };
        resolve_one(entry, arena, units, queue, &mut materialize)?;
    }
    Ok(())
}

fn resolve_one<'data>(
    entry: PendingReference,
    arena: &mut ObjectArena<'data>,
    units: &mut [CompUnit<'data>],
    queue: &mut ReferenceQueue,
    materialize: &mut impl FnMut(&mut ObjectArena<'data>, &mut [CompUnit<'data>], &mut ReferenceQueue, ObjectHandle) -> Result<()>,
) -> Result<()> {
    let origin = entry.origin;

    // Step 1: find the owning compile unit if not already known.
    if arena.get(origin).comp_unit.is_none() {
        let id = arena.get(origin).id;
        let unit_idx = find_owning_unit(units, entry.section, id).ok_or(ErrorKind::InvalidReference)?;
        arena.get_mut(origin).comp_unit = Some(crate::unit::CompUnitHandle(unit_idx as u32));
    }

    // Step 2: the unit's section must match the reference's recorded section.
    let unit_idx = arena.get(origin).comp_unit.expect("set above").0 as usize;
    if units[unit_idx].desc.section != entry.section {
        return Err(ErrorKind::InvalidDwarf.into());
    }

    // Step 3: materialize a placeholder by re-entering the walker.
    if arena.get(origin).is_placeholder() {
        materialize(arena, units, queue, origin)?;
    }

    // Step 4: propagate attributes onto the referent, if this entry carries one.
    // `origin` is the referenced target (e.g. the earlier declaration a
    // `specification` attribute points at); `referent` is the entity that
    // carries the attribute (e.g. the out-of-line definition). The
    // `specification`/`abstract_origin`/`extension` flag itself was set
    // directly on `referent` by the walker, so it is `referent`'s flags that
    // decide whether this back-link sets `origin.definition`.
    if let Some(referent) = entry.referent {
        let is_specification = arena.get(referent).flags.contains(ObjectFlags::SPECIFICATION);

        if is_specification {
            arena.get_mut(origin).definition = Some(referent);
        }

        if arena.get(referent).name.is_none() {
            let name = arena.get(origin).name;
            arena.get_mut(referent).name = name;
        }
        if arena.get(referent).ty.is_none() {
            let ty = arena.get(origin).ty;
            arena.get_mut(referent).ty = ty;
        }

        let origin_flags = arena.get(origin).flags;
        let inherited = origin_flags & INHERITABLE_FLAGS;
        arena.get_mut(referent).flags |= inherited;

        if arena.get(referent).flags.contains(ObjectFlags::EXTERNAL) {
            propagate_external_to_ancestors(arena, referent);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::{RegIdScope, UnitDescriptor};

    fn make_unit(offset: u64, size: u64) -> CompUnit<'static> {
        let mut arena = ObjectArena::new(0, 0x10000, 100);
        let handle = arena.intern(offset).unwrap();
        CompUnit::new(
            handle,
            UnitDescriptor {
                section: SectionKind::DebugInfo,
                unit_offset: offset,
                unit_size: size,
                version: 4,
                address_size: 8,
            },
            RegIdScope::default(),
        )
    }

    #[test]
    fn specification_sets_definition_and_inherits_name() {
        let mut arena = ObjectArena::new(0, 0x10000, 100);
        let mut units = vec![make_unit(0, 0x1000)];

        let b = arena.intern(0x10).unwrap();
        arena.get_mut(b).tag = Tag::Dwarf(gimli::constants::DW_TAG_subprogram);
        arena.get_mut(b).comp_unit = Some(crate::unit::CompUnitHandle(0));
        arena.get_mut(b).name = Some("x");

        let a = arena.intern(0x20).unwrap();
        arena.get_mut(a).tag = Tag::Dwarf(gimli::constants::DW_TAG_subprogram);
        arena.get_mut(a).comp_unit = Some(crate::unit::CompUnitHandle(0));
        arena.get_mut(a).flags |= ObjectFlags::SPECIFICATION;

        let mut queue = ReferenceQueue::new();
        queue.push(PendingReference {
            section: SectionKind::DebugInfo,
            origin: b,
            referent: Some(a),
        });

        drain(&mut queue, &mut arena, &mut units, |_, _, _, _| {
            panic!("no placeholder expected in this test")
        })
        .unwrap();

        assert_eq!(arena.get(b).definition, Some(a));
        assert_eq!(arena.get(a).name, Some("x"));
    }

    #[test]
    fn external_propagates_to_struct_ancestors() {
        let mut arena = ObjectArena::new(0, 0x10000, 100);
        let mut units = vec![make_unit(0, 0x1000)];

        let strct = arena.intern(0x10).unwrap();
        arena.get_mut(strct).tag = Tag::Dwarf(gimli::constants::DW_TAG_structure_type);
        arena.get_mut(strct).comp_unit = Some(crate::unit::CompUnitHandle(0));

        let member = arena.intern(0x20).unwrap();
        arena.get_mut(member).tag = Tag::Dwarf(gimli::constants::DW_TAG_member);
        arena.get_mut(member).comp_unit = Some(crate::unit::CompUnitHandle(0));
        arena.get_mut(member).parent = Some(strct);
        arena.get_mut(member).flags |= ObjectFlags::EXTERNAL | ObjectFlags::ABSTRACT_ORIGIN;

        let origin = arena.intern(0x30).unwrap();
        arena.get_mut(origin).tag = Tag::Dwarf(gimli::constants::DW_TAG_member);
        arena.get_mut(origin).comp_unit = Some(crate::unit::CompUnitHandle(0));
        arena.get_mut(origin).flags |= ObjectFlags::EXTERNAL;

        let mut queue = ReferenceQueue::new();
        queue.push(PendingReference {
            section: SectionKind::DebugInfo,
            origin,
            referent: Some(member),
        });

        drain(&mut queue, &mut arena, &mut units, |_, _, _, _| Ok(())).unwrap();

        assert!(arena.get(strct).flags.contains(ObjectFlags::EXTERNAL));
    }

    #[test]
    fn unresolved_unit_is_invalid_reference() {
        let mut arena = ObjectArena::new(0, 0x10000, 100);
        let mut units: Vec<CompUnit<'static>> = Vec::new();
        let origin = arena.intern(0x10).unwrap();

        let mut queue = ReferenceQueue::new();
        queue.push(PendingReference {
            section: SectionKind::DebugInfo,
            origin,
            referent: None,
        });

        let err = drain(&mut queue, &mut arena, &mut units, |_, _, _, _| Ok(())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidReference);
    }
}
