//! The `ObjectInfo` entity record and associated synthetic-type helpers.
//!
//! `ObjectInfo` is the Rust analog of `ObjectInfo` in
//! `tcf/services/dwarfcache.c`: one record per DWARF debugging information
//! entry (DIE), plus a handful of synthetic entities (`fund_type`,
//! `index_range`, `mod_pointer`, `mod_reference`) that the DWARF v1
//! compatibility layer materializes on the fly.

use gimli::DwTag;

use crate::arena::ObjectHandle;
use crate::error::{Error, ErrorKind, Result};
use crate::unit::CompUnitHandle;
use crate::v1;

bitflags::bitflags! {
    /// Bits set on [`ObjectInfo::flags`].
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct ObjectFlags: u16 {
        /// `DW_AT_external` was present and true.
        const EXTERNAL = 1 << 0;
        /// `DW_AT_artificial` was present and true.
        const ARTIFICIAL = 1 << 1;
        /// `DW_AT_declaration` was present and true.
        const DECLARATION = 1 << 2;
        /// This entity was reached through a `DW_AT_specification` link.
        const SPECIFICATION = 1 << 3;
        /// This entity was reached through a `DW_AT_abstract_origin` link.
        const ABSTRACT_ORIGIN = 1 << 4;
        /// This entity was reached through a `DW_AT_extension` link.
        const EXTENSION = 1 << 5;
        /// Direct children of this entity are fully linked via
        /// `parent`/`sibling`; no further lazy load is needed.
        const CHILDREN_LOADED = 1 << 6;
    }
}

/// Bits propagated from an origin/specification entity onto its referent.
///
/// `children_loaded`, `declaration` and `specification` are deliberately
/// excluded: each describes a fact about *this* entity's own DIE, not one
/// that should be inherited from the DIE that merely points at it through
/// a reference chain.
pub(crate) const INHERITABLE_FLAGS: ObjectFlags = ObjectFlags::EXTERNAL
    .union(ObjectFlags::ARTIFICIAL)
    .union(ObjectFlags::ABSTRACT_ORIGIN)
    .union(ObjectFlags::EXTENSION);

/// The DWARF tag of an entity, or a marker for one of the synthetic entity
/// kinds this crate's DWARF v1 compatibility layer creates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tag {
    /// Interned but not yet materialized: only its `id` is known.
    Placeholder,
    /// A genuine DWARF tag, read from the `.debug_info` entry.
    Dwarf(DwTag),
    /// `TAG_fund_type`: a DWARF v1 fundamental type, identified by its code.
    FundType(u16),
    /// `TAG_mod_pointer`: "pointer to" modifier.
    ModPointer,
    /// `TAG_mod_reference`: "reference to" modifier.
    ModReference,
    /// `TAG_index_range`: one dimension of a DWARF v1 array subscript.
    IndexRange,
}

impl Default for Tag {
    fn default() -> Self {
        Tag::Placeholder
    }
}

impl Tag {
    /// Whether this entity is a placeholder awaiting materialization (I2).
    pub fn is_placeholder(self) -> bool {
        matches!(self, Tag::Placeholder)
    }

    /// Whether this entity is the kind of procedure body `.debug`/`.debug_info`
    /// defer when they carry a `sibling` attribute. Grounded directly on the
    /// original's `TAG_subroutine`/`TAG_subprogram` case list: v1's
    /// `GLOBAL_SUBROUTINE`/`SUBROUTINE` tags have no DWARF2+ numeric
    /// equivalent (unlike most other v1 tags below `0x0200`), so they're
    /// matched by their own raw codes alongside `DW_TAG_subprogram`.
    pub(crate) fn is_lazy_subprogram(self) -> bool {
        matches!(
            self,
            Tag::Dwarf(t)
                if t == gimli::constants::DW_TAG_subprogram
                    || t == gimli::constants::DW_TAG_inlined_subroutine
                    || t.0 == v1::tag::GLOBAL_SUBROUTINE as u64
                    || t.0 == v1::tag::SUBROUTINE as u64
        )
    }
}

/// DWARF v1 fundamental type codes (`AT_fund_type` payload), see §4.4.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
#[repr(u16)]
pub enum FundType {
    Char = 0x0001,
    SignedChar = 0x0006,
    UnsignedChar = 0x0008,
    Short = 0x0002,
    SignedShort = 0x0007,
    UnsignedShort = 0x0009,
    Integer = 0x0003,
    SignedInteger = 0x0005,
    UnsignedInteger = 0x000a,
    Long = 0x0004,
    SignedLong = 0x000c,
    UnsignedLong = 0x000b,
    Pointer = 0x0010,
    Float = 0x0014,
    DblPrecFloat = 0x0015,
    Complex = 0x0017,
    DblPrecComplex = 0x0018,
    Boolean = 0x0019,
    Void = 0x0012,
}

impl FundType {
    fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            0x0001 => Self::Char,
            0x0006 => Self::SignedChar,
            0x0008 => Self::UnsignedChar,
            0x0002 => Self::Short,
            0x0007 => Self::SignedShort,
            0x0009 => Self::UnsignedShort,
            0x0003 => Self::Integer,
            0x0005 => Self::SignedInteger,
            0x000a => Self::UnsignedInteger,
            0x0004 => Self::Long,
            0x000c => Self::SignedLong,
            0x000b => Self::UnsignedLong,
            0x0010 => Self::Pointer,
            0x0014 => Self::Float,
            0x0015 => Self::DblPrecFloat,
            0x0017 => Self::Complex,
            0x0018 => Self::DblPrecComplex,
            0x0019 => Self::Boolean,
            0x0012 => Self::Void,
            _ => return None,
        })
    }
}

/// Implements §4.4: `fund_type_size(unit, code)`.
///
/// `address_size` is the owning unit's address size; `is_64bit` mirrors an
/// `elf64`-style container check used for the `long`-family rule.
pub fn fund_type_size(code: u16, address_size: u8, is_64bit: bool) -> Result<u8> {
    let ft = FundType::from_code(code).ok_or(ErrorKind::InvalidDwarf)?;
    Ok(match ft {
        FundType::Char | FundType::SignedChar | FundType::UnsignedChar => 1,
        FundType::Short | FundType::SignedShort | FundType::UnsignedShort => 2,
        FundType::Integer | FundType::SignedInteger | FundType::UnsignedInteger => 4,
        FundType::Long | FundType::SignedLong | FundType::UnsignedLong => {
            if is_64bit {
                8
            } else {
                4
            }
        }
        FundType::Pointer => address_size,
        FundType::Float => 4,
        FundType::DblPrecFloat => 8,
        FundType::Complex => 8,
        FundType::DblPrecComplex => 16,
        FundType::Boolean => 4,
        FundType::Void => 0,
    })
}

/// The two low bits of a DWARF v1 array-subscript format byte select how the
/// low/high bound of that dimension is encoded (§4.3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexRangeFmt {
    /// Both bounds are constants.
    ConstConst,
    /// Low bound constant, high bound a block-2 DWARF expression.
    ConstExpr,
    /// Low bound a block-2 DWARF expression, high bound constant.
    ExprConst,
    /// Both bounds are block-2 DWARF expressions.
    ExprExpr,
}

/// Either a constant bound or a borrowed block-2 DWARF expression, as stored
/// on a synthetic `index_range` entity.
#[derive(Clone, Copy, Debug)]
pub enum RangeBound<'data> {
    /// A constant `long` value, sign-extended per §4.3 (`read_long_value`).
    Value(i64),
    /// A raw block of DWARF expression bytes (`FORM_BLOCK2` payload).
    Expr(&'data [u8]),
}

/// Payload carried by a synthetic `index_range` entity.
#[derive(Clone, Copy, Debug)]
pub struct IndexRange<'data> {
    /// The originating format byte's two low bits, preserved for property resolution.
    pub fmt: IndexRangeFmt,
    pub low: RangeBound<'data>,
    pub high: RangeBound<'data>,
}

/// Payload carried by a `compile_unit`/subprogram-like address-range entity.
#[derive(Clone, Copy, Debug, Default)]
pub struct AddrRange {
    pub low_pc: u64,
    pub high_pc: u64,
}

/// The tag-dependent payload of an [`ObjectInfo`] (§3, "Variant payload `u`").
#[derive(Clone, Copy, Debug)]
pub enum Variant<'data> {
    /// No variant payload for this tag.
    None,
    AddrRange(AddrRange),
    FundType(u16),
    Range(IndexRange<'data>),
}

impl Default for Variant<'_> {
    fn default() -> Self {
        Variant::None
    }
}

/// One DWARF debugging-information entry, or a synthetic stand-in for one.
///
/// Invariants I1–I5 (see module docs of [`crate::cache`]) govern which
/// fields are populated at which point in an entity's lifecycle.
#[derive(Debug, Default, Clone, Copy)]
pub struct ObjectInfo<'data> {
    /// Absolute byte offset within the owning section; the interner's primary key.
    pub id: u64,
    pub tag: Tag,
    pub flags: ObjectFlags,
    pub name: Option<&'data str>,
    pub comp_unit: Option<CompUnitHandle>,
    pub parent: Option<ObjectHandle>,
    pub sibling: Option<ObjectHandle>,
    pub children: Option<ObjectHandle>,
    pub ty: Option<ObjectHandle>,
    pub definition: Option<ObjectHandle>,
    /// `DW_AT_byte_size` (or v1 `AT_byte_size`), cached at walk time so the
    /// property resolver's aggregate-byte-size fallback (§4.9) doesn't need
    /// to re-read the wire for the common case.
    pub byte_size: Option<u64>,
    pub variant: Variant<'data>,
    pub(crate) hash_next: Option<ObjectHandle>,
}

impl<'data> ObjectInfo<'data> {
    pub(crate) fn placeholder(id: u64) -> Self {
        ObjectInfo {
            id,
            ..Default::default()
        }
    }

    /// Whether this entity is still an unmaterialized placeholder (I2).
    pub fn is_placeholder(&self) -> bool {
        self.tag.is_placeholder()
    }
}

/// Parses the trailing modifier byte for `mod_fund_type`/`mod_user_def_type`
/// blocks (§4.3). `volatile`/`const` are silently discarded; any other byte
/// is an `InvalidDwarf` error.
pub(crate) fn modifier_tag(byte: u8) -> Result<Option<Tag>> {
    const MOD_VOLATILE: u8 = 1;
    const MOD_CONST: u8 = 2;
    const MOD_POINTER_TO: u8 = 3;
    const MOD_REFERENCE_TO: u8 = 4;

    match byte {
        MOD_VOLATILE | MOD_CONST => Ok(None),
        MOD_POINTER_TO => Ok(Some(Tag::ModPointer)),
        MOD_REFERENCE_TO => Ok(Some(Tag::ModReference)),
        _ => Err(Error::new(ErrorKind::InvalidDwarf)),
    }
}
