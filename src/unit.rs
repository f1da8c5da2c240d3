//! Compile-unit bookkeeping: the Rust form of `CompUnit`/`FileInfo` (§3).

use crate::arena::ObjectHandle;
use crate::line::LineNumbersState;

/// Which physical section a compile unit (and its entities) live in.
///
/// Old DWARF v1 producers emit a `.debug` section instead of
/// `.debug_info`/`.debug_abbrev`; both are handled by the same walker, but
/// downstream code (line engine, reference resolver) needs to know which one
/// an id belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SectionKind {
    /// DWARF v2+ `.debug_info`.
    DebugInfo,
    /// DWARF v1 `.debug`.
    DebugV1,
}

/// A stable handle to a [`CompUnit`] owned by a [`Cache`](crate::cache::Cache).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CompUnitHandle(pub(crate) u32);

/// The fixed per-compilation-unit header, as parsed by the (external) unit
/// descriptor/entry walker.
#[derive(Clone, Copy, Debug)]
pub struct UnitDescriptor {
    pub section: SectionKind,
    pub unit_offset: u64,
    pub unit_size: u64,
    pub version: u16,
    pub address_size: u8,
}

/// Endianness/machine/ABI scope a register id is interpreted against
/// (consumed by the out-of-scope register-definition layer, carried here so
/// it travels with the unit that produced it).
#[derive(Clone, Copy, Debug, Default)]
pub struct RegIdScope {
    pub big_endian: bool,
    pub machine: u16,
    pub os_abi: u8,
}

/// Per-unit source file record (§3, `FileInfo`).
#[derive(Clone, Copy, Debug, Default)]
pub struct FileInfo<'data> {
    pub name: Option<&'data str>,
    pub dir: Option<&'data str>,
    pub mod_time: u64,
    pub size: u64,
    pub name_hash: u32,
}

/// One DWARF compilation unit (§3, `CompUnit`).
pub struct CompUnit<'data> {
    pub object: ObjectHandle,
    pub desc: UnitDescriptor,

    pub low_pc: u64,
    pub high_pc: u64,
    pub text_section: Option<&'data str>,
    /// `None` is the sentinel "absent" value.
    pub debug_ranges_offset: Option<u64>,
    pub aranges_found: bool,

    pub comp_dir: Option<&'data str>,
    pub language: Option<u16>,
    pub line_info_offset: u64,

    pub files: Vec<FileInfo<'data>>,
    pub dirs: Vec<&'data str>,
    pub states: Vec<LineNumbersState>,
    /// Indices into `states`, sorted by `(file, line, column, address)`.
    pub states_index: Vec<u32>,
    pub line_info_loaded: bool,

    pub base_types: Option<CompUnitHandle>,
    pub reg_id_scope: RegIdScope,
}

impl<'data> CompUnit<'data> {
    pub(crate) fn new(object: ObjectHandle, desc: UnitDescriptor, reg_id_scope: RegIdScope) -> Self {
        CompUnit {
            object,
            desc,
            low_pc: 0,
            high_pc: 0,
            text_section: None,
            debug_ranges_offset: None,
            aranges_found: false,
            comp_dir: None,
            language: None,
            line_info_offset: 0,
            files: Vec::new(),
            dirs: Vec::new(),
            states: Vec::new(),
            states_index: Vec::new(),
            line_info_loaded: false,
            base_types: None,
            reg_id_scope,
        }
    }

    /// Whether `offset` (relative to the unit's section) falls within this
    /// unit's byte span — used by the reference resolver's unit lookup
    /// (§4.5, step 1).
    pub fn contains_section_offset(&self, offset: u64) -> bool {
        offset >= self.desc.unit_offset && offset < self.desc.unit_offset + self.desc.unit_size
    }
}
