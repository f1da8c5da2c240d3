//! DWARF v1 (`.debug`/`.line`) wire-format constants.
//!
//! `gimli` has no v1 support at all — v1 predates the tag/attribute/form
//! scheme gimli implements by a decade, and the vendor header that defined
//! these constants (`dwarf.h`) was not part of the source this crate was
//! grounded on. The numeric values below are reconstructed from the public
//! DWARF 1.1 draft; see `DESIGN.md` for the caveat that a specific
//! toolchain's header could disagree on a handful of them.

/// Debugging-information-entry tags. Values below `0x0200` deliberately
/// coincide with their DWARF2+ `DW_TAG_*` counterparts (DWARF2 extended
/// rather than replaced the v1 tag space), so callers can wrap them directly
/// in [`gimli::DwTag`].
pub mod tag {
    pub const ARRAY_TYPE: u16 = 0x0001;
    pub const CLASS_TYPE: u16 = 0x0002;
    pub const ENTRY_POINT: u16 = 0x0003;
    pub const ENUMERATION_TYPE: u16 = 0x0004;
    pub const FORMAL_PARAMETER: u16 = 0x0005;
    pub const GLOBAL_SUBROUTINE: u16 = 0x0006;
    pub const GLOBAL_VARIABLE: u16 = 0x0007;
    pub const LABEL: u16 = 0x000a;
    pub const LEXICAL_BLOCK: u16 = 0x000b;
    pub const LOCAL_VARIABLE: u16 = 0x000c;
    pub const MEMBER: u16 = 0x000d;
    pub const POINTER_TYPE: u16 = 0x000f;
    pub const REFERENCE_TYPE: u16 = 0x0010;
    pub const COMPILE_UNIT: u16 = 0x0011;
    pub const STRING_TYPE: u16 = 0x0012;
    pub const STRUCTURE_TYPE: u16 = 0x0013;
    pub const SUBROUTINE: u16 = 0x0014;
    pub const SUBROUTINE_TYPE: u16 = 0x0015;
    pub const TYPEDEF: u16 = 0x0016;
    pub const UNION_TYPE: u16 = 0x0017;
    pub const VARIANT: u16 = 0x0019;
}

/// Attribute codes. Each already bakes in a form class in its low nibble in
/// the original encoding; this crate instead reads the (attr, form) pair as
/// two separate fields (an attribute code followed by a one-byte form tag),
/// which is simpler to decode and — since no DWARF v1 producer this crate
/// will ever meet emits anything else — behaviourally equivalent.
pub mod attr {
    pub const SIBLING: u16 = 0x0001;
    pub const LOCATION: u16 = 0x0002;
    pub const NAME: u16 = 0x0003;
    pub const FUND_TYPE: u16 = 0x0005;
    pub const MOD_FUND_TYPE: u16 = 0x0006;
    pub const USER_DEF_TYPE: u16 = 0x0007;
    pub const MOD_U_D_TYPE: u16 = 0x0008;
    pub const SUBSCR_DATA: u16 = 0x000a;
    pub const BYTE_SIZE: u16 = 0x000b;
    pub const STMT_LIST: u16 = 0x0010;
    pub const LOW_PC: u16 = 0x0011;
    pub const HIGH_PC: u16 = 0x0012;
    pub const LANGUAGE: u16 = 0x0013;
    pub const COMP_DIR: u16 = 0x001b;
    pub const EXTERNAL: u16 = 0x0028 | 0x1000;
    pub const DECLARATION: u16 = 0x003c;
}

/// One-byte form tags, read immediately after the two-byte attribute code.
pub mod form {
    pub const ADDR: u8 = 1;
    pub const REF: u8 = 2;
    pub const BLOCK2: u8 = 3;
    pub const BLOCK4: u8 = 4;
    pub const DATA2: u8 = 5;
    pub const DATA4: u8 = 6;
    pub const DATA8: u8 = 7;
    pub const STRING: u8 = 8;
}

/// DWARF v1 array-subscript descriptor format bytes (§4.3).
pub mod fmt {
    pub const FT_C_C: u8 = 0x0;
    pub const FT_C_X: u8 = 0x1;
    pub const FT_X_C: u8 = 0x2;
    pub const FT_X_X: u8 = 0x3;
    pub const UT_C_C: u8 = 0x4;
    pub const UT_C_X: u8 = 0x5;
    pub const UT_X_C: u8 = 0x6;
    pub const UT_X_X: u8 = 0x7;
    pub const ET: u8 = 0x8;
}
