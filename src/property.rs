//! The property resolver.
//!
//! Reads a single logical attribute off a single entity, chasing the
//! `specification`/`abstract_origin`/`extension` chain and the synthetic
//! v1-compatibility entities (`fund_type`, `index_range`, `mod_pointer`,
//! `mod_reference`) transparently. The result is a classified raw value;
//! turning a location-class result into an actual address or register
//! requires an external [`ExpressionEvaluator`], kept decoupled from this
//! module so the resolver itself never has to know how a target process's
//! memory or registers are read.

use crate::entity::{ObjectFlags, RangeBound, Tag, Variant};
use crate::error::{Error, ErrorKind, Result};

/// Coarse classification of a DWARF attribute form, per §4.9's
/// "form-based value extraction" table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Form {
    Address,
    Block,
    Data,
    Sdata,
    Udata,
    Flag,
    Reference,
    ExprLoc,
    SecOffset,
    Strp,
    RefSig8,
}

/// One piece of a multi-location DWARF expression result
/// (`DW_OP_piece`/`DW_OP_bit_piece`), filled in by an [`ExpressionEvaluator`].
#[derive(Clone, Copy, Debug)]
pub struct Piece {
    pub register: Option<u16>,
    pub addr: Option<u64>,
    pub size: Option<u64>,
}

/// The result of resolving one attribute of one entity (§4.9, `PropertyValue`).
///
/// `bytes` borrows directly from the originating section buffer for
/// block/exprloc-form values; `value` holds the decoded scalar for
/// data/sdata/udata/flag/address-form values. Exactly one of the two is
/// populated for any value [`numeric_value`] can make sense of.
#[derive(Clone, Debug, Default)]
pub struct PropertyValue<'data> {
    pub form: Option<Form>,
    pub addr: Option<u64>,
    pub size: Option<u64>,
    pub value: Option<u64>,
    pub bytes: Option<&'data [u8]>,
    pub pieces: Option<Vec<Piece>>,
    pub big_endian: bool,
}

impl<'data> PropertyValue<'data> {
    pub fn scalar(form: Form, value: u64, big_endian: bool) -> Self {
        PropertyValue {
            form: Some(form),
            value: Some(value),
            big_endian,
            ..Default::default()
        }
    }

    pub fn block(form: Form, bytes: &'data [u8], big_endian: bool) -> Self {
        PropertyValue {
            form: Some(form),
            size: Some(bytes.len() as u64),
            bytes: Some(bytes),
            big_endian,
            ..Default::default()
        }
    }
}

/// External collaborator: reads target memory, registers, and runtime
/// address mappings during property resolution (§6, "Memory/register/context
/// services").
pub trait MemoryContext {
    fn read_memory(&self, addr: u64, buf: &mut [u8]) -> Result<()>;
    fn read_register(&self, frame: u32, register: u16) -> Result<u64>;
    /// Maps a link-time section-relative address to a runtime one; `section`
    /// is `None` for an already-absolute address.
    fn map_to_runtime_address(&self, section: Option<&str>, addr: u64) -> Result<u64>;
}

/// External collaborator: evaluates a DWARF location expression (§6).
///
/// The original threads the containing object's address through a
/// process-wide `dwarf_expression_obj_addr` global so `DW_OP_push_object_address`
/// has something to push; here it is simply an explicit parameter, since
/// nothing about this crate's resolver needs it to be ambient state.
pub trait ExpressionEvaluator {
    fn evaluate(
        &self,
        mem: &dyn MemoryContext,
        frame: u32,
        obj_addr: Option<u64>,
        value: &mut PropertyValue<'_>,
    ) -> Result<()>;
}

/// Whether `attr`'s value, when block/exprloc-form, is a DWARF expression
/// that [`read_and_evaluate`] should run through an [`ExpressionEvaluator`]
/// rather than returning as a raw block (§4.9).
pub fn is_location_class(attr: gimli::DwAt) -> bool {
    use gimli::constants as c;
    matches!(
        attr,
        c::DW_AT_location
            | c::DW_AT_string_length
            | c::DW_AT_frame_base
            | c::DW_AT_use_location
            | c::DW_AT_data_member_location
            | c::DW_AT_count
            | c::DW_AT_upper_bound
            | c::DW_AT_lower_bound
    )
}

/// §4.9 `numeric_value`: decodes a property's scalar value, whatever form it
/// arrived in. Block/exprloc values are interpreted as fixed-width integers
/// in the unit's byte order, matching the original's "small blocks double as
/// inline constants" rule used for e.g. a constant `DW_AT_data_member_location`.
pub fn numeric_value(value: &PropertyValue<'_>) -> Result<u64> {
    if let Some(v) = value.value {
        return Ok(v);
    }
    if let Some(bytes) = value.bytes {
        if bytes.is_empty() || bytes.len() > 8 {
            return Err(Error::new(ErrorKind::InvalidDataSize));
        }
        let mut buf = [0u8; 8];
        if value.big_endian {
            buf[8 - bytes.len()..].copy_from_slice(bytes);
            return Ok(u64::from_be_bytes(buf));
        }
        buf[..bytes.len()].copy_from_slice(bytes);
        return Ok(u64::from_le_bytes(buf));
    }
    Err(Error::new(ErrorKind::InvalidDataType))
}

/// Synthesizes the value of a v1-compatibility entity's `byte_size`
/// property directly from its tag/variant, short-circuiting the general
/// attribute lookup (§4.9, "Synthetic-entity short-circuits").
pub(crate) fn synthetic_byte_size(
    tag: Tag,
    address_size: u8,
    is_64bit: bool,
) -> Option<Result<PropertyValue<'static>>> {
    match tag {
        Tag::FundType(code) => {
            Some(crate::entity::fund_type_size(code, address_size, is_64bit).map(|size| {
                PropertyValue::scalar(Form::Udata, size as u64, false)
            }))
        }
        Tag::ModPointer | Tag::ModReference => {
            Some(Ok(PropertyValue::scalar(Form::Udata, address_size as u64, false)))
        }
        _ => None,
    }
}

/// Synthesizes the value of a synthetic `index_range` entity's
/// `lower_bound`/`upper_bound` property (§4.3, §4.9).
pub(crate) fn synthetic_bound<'data>(
    variant: Variant<'data>,
    want_lower: bool,
) -> Option<PropertyValue<'data>> {
    let Variant::Range(range) = variant else {
        return None;
    };
    let bound = if want_lower { range.low } else { range.high };
    Some(match bound {
        RangeBound::Value(v) => PropertyValue::scalar(Form::Sdata, v as u64, false),
        RangeBound::Expr(bytes) => PropertyValue::block(Form::ExprLoc, bytes, false),
    })
}

/// Decodes a synthetic `fund_type` entity's own "value" when it is itself
/// the target of a `DW_AT_fund_type`-style lookup rather than a `byte_size`
/// query — used by `FundType::name`-equivalent callers that want the raw
/// code back out.
pub(crate) fn fund_type_code(variant: Variant<'_>) -> Option<u16> {
    match variant {
        Variant::FundType(code) => Some(code),
        _ => None,
    }
}

/// Whether `tag` is one of the pointer-like DWARF kinds whose `byte_size`
/// fallback (§4.9) is the owning unit's address size, once no wire value and
/// no specification/abstract_origin/extension chain produced one.
pub(crate) fn is_pointer_like(tag: Tag) -> bool {
    use gimli::constants as c;
    matches!(tag, Tag::ModPointer | Tag::ModReference)
        || matches!(
            tag,
            Tag::Dwarf(t)
                if t == c::DW_TAG_pointer_type
                    || t == c::DW_TAG_reference_type
                    || t == c::DW_TAG_rvalue_reference_type
                    || t == c::DW_TAG_ptr_to_member_type
        )
}

/// Whether `tag` is one of the aggregate kinds §4.9's `byte_size` fallback
/// derives from child inspection (`structure`, `class`, `union`) rather than
/// from address size.
pub(crate) fn is_aggregate(tag: Tag) -> bool {
    use gimli::constants as c;
    matches!(
        tag,
        Tag::Dwarf(t) if t == c::DW_TAG_structure_type || t == c::DW_TAG_class_type || t == c::DW_TAG_union_type
    )
}

/// Whether `tag` is `DW_TAG_imported_declaration` — such a child is chased
/// to its `DW_AT_import` target rather than judged directly (§4.9).
pub(crate) fn is_imported_declaration(tag: Tag) -> bool {
    matches!(tag, Tag::Dwarf(t) if t == gimli::constants::DW_TAG_imported_declaration)
}

/// Whether a direct child of a zero-size aggregate candidate is itself
/// "without storage": a nested type, a static member function, a template
/// type parameter, or a data member explicitly marked `external` (§4.9).
pub(crate) fn is_allowed_aggregate_member(tag: Tag, flags: ObjectFlags) -> bool {
    use gimli::constants as c;
    match tag {
        Tag::Dwarf(t)
            if t == c::DW_TAG_typedef
                || t == c::DW_TAG_subprogram
                || t == c::DW_TAG_template_type_param
                || t == c::DW_TAG_class_type
                || t == c::DW_TAG_structure_type
                || t == c::DW_TAG_union_type
                || t == c::DW_TAG_enumeration_type =>
        {
            true
        }
        Tag::Dwarf(t) if t == c::DW_TAG_member => flags.contains(ObjectFlags::EXTERNAL),
        _ => false,
    }
}

pub(crate) fn fund_type_name(code: u16) -> Option<&'static str> {
    Some(match code {
        0x0001 => "char",
        0x0006 => "signed char",
        0x0008 => "unsigned char",
        0x0002 => "short",
        0x0007 => "signed short",
        0x0009 => "unsigned short",
        0x0003 => "int",
        0x0005 => "signed int",
        0x000a => "unsigned int",
        0x0004 => "long",
        0x000c => "signed long",
        0x000b => "unsigned long",
        0x0010 => "void *",
        0x0014 => "float",
        0x0015 => "double",
        0x0017 => "complex",
        0x0018 => "double complex",
        0x0019 => "bool",
        0x0012 => "void",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{AddrRange, IndexRange, IndexRangeFmt};

    #[test]
    fn numeric_value_prefers_scalar() {
        let v = PropertyValue::scalar(Form::Udata, 42, false);
        assert_eq!(numeric_value(&v).unwrap(), 42);
    }

    #[test]
    fn numeric_value_decodes_little_endian_block() {
        let bytes = [0x01, 0x02, 0x00, 0x00];
        let v = PropertyValue::block(Form::Block, &bytes, false);
        assert_eq!(numeric_value(&v).unwrap(), 0x0201);
    }

    #[test]
    fn numeric_value_decodes_big_endian_block() {
        let bytes = [0x00, 0x00, 0x01, 0x02];
        let v = PropertyValue::block(Form::Block, &bytes, true);
        assert_eq!(numeric_value(&v).unwrap(), 0x0102);
    }

    #[test]
    fn numeric_value_rejects_empty_block() {
        let v = PropertyValue::block(Form::Block, &[], false);
        assert_eq!(numeric_value(&v).unwrap_err().kind(), ErrorKind::InvalidDataSize);
    }

    #[test]
    fn synthetic_byte_size_covers_fund_type_and_modifiers() {
        let v = synthetic_byte_size(Tag::FundType(0x0004), 8, true).unwrap().unwrap();
        assert_eq!(numeric_value(&v).unwrap(), 8);

        let v = synthetic_byte_size(Tag::ModPointer, 4, false).unwrap().unwrap();
        assert_eq!(numeric_value(&v).unwrap(), 4);

        assert!(synthetic_byte_size(Tag::Dwarf(gimli::constants::DW_TAG_base_type), 8, true).is_none());
    }

    #[test]
    fn synthetic_bound_reads_constant_and_expr_forms() {
        let range = IndexRange {
            fmt: IndexRangeFmt::ConstExpr,
            low: RangeBound::Value(0),
            high: RangeBound::Expr(&[0x9f]),
        };
        let low = synthetic_bound(Variant::Range(range), true).unwrap();
        assert_eq!(numeric_value(&low).unwrap(), 0);

        let high = synthetic_bound(Variant::Range(range), false).unwrap();
        assert_eq!(high.bytes, Some(&[0x9f][..]));

        let not_a_range = Variant::AddrRange(AddrRange::default());
        assert!(synthetic_bound(not_a_range, true).is_none());
    }

    #[test]
    fn fund_type_name_round_trips_known_codes() {
        assert_eq!(fund_type_name(0x0004), Some("long"));
        assert_eq!(fund_type_name(0xffff), None);
    }

    #[test]
    fn pointer_and_reference_tags_are_pointer_like() {
        assert!(is_pointer_like(Tag::Dwarf(gimli::constants::DW_TAG_pointer_type)));
        assert!(is_pointer_like(Tag::Dwarf(gimli::constants::DW_TAG_reference_type)));
        assert!(is_pointer_like(Tag::ModPointer));
        assert!(!is_pointer_like(Tag::Dwarf(gimli::constants::DW_TAG_structure_type)));
    }

    #[test]
    fn aggregate_member_allowlist_accepts_nested_types_and_external_members() {
        assert!(is_allowed_aggregate_member(
            Tag::Dwarf(gimli::constants::DW_TAG_subprogram),
            ObjectFlags::empty()
        ));
        assert!(is_allowed_aggregate_member(
            Tag::Dwarf(gimli::constants::DW_TAG_template_type_param),
            ObjectFlags::empty()
        ));
        assert!(is_allowed_aggregate_member(
            Tag::Dwarf(gimli::constants::DW_TAG_member),
            ObjectFlags::EXTERNAL
        ));
        assert!(!is_allowed_aggregate_member(
            Tag::Dwarf(gimli::constants::DW_TAG_member),
            ObjectFlags::empty()
        ));
    }
}
