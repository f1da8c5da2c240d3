//! The object-file collaborator, narrowed to the handful of facts the cache
//! actually needs: section bytes, endianness, and the address-size/format
//! facts that change how those bytes are read.
//!
//! One object implements this once per underlying container (ELF, Mach-O,
//! ...) and the rest of this crate is generic over it.

pub use gimli::RunTimeEndian as Endian;

/// Bytes and format facts about the object file backing a [`Cache`](crate::cache::Cache).
///
/// Section names are given without leading punctuation (`"debug_info"`, not
/// `".debug_info"`), so the same implementor can serve containers that spell
/// section names differently.
pub trait Sections<'data> {
    /// Whether the file targets a big-endian machine.
    fn endianity(&self) -> Endian;

    /// Byte size of a target address (4 or 8).
    fn address_size(&self) -> u8;

    /// Whether this is a 64-bit object container (`file->elf64` in the
    /// original), used by the `long`-family fundamental-type size rule (§4.4).
    fn is_64bit(&self) -> bool;

    /// ELF `e_machine`/equivalent, carried for register-id scoping.
    fn machine(&self) -> u16;

    /// ELF `e_ident[EI_OSABI]`/equivalent, carried for register-id scoping.
    fn os_abi(&self) -> u8;

    /// Returns the raw bytes of a named section, if present.
    fn section_data(&self, name: &str) -> Option<&'data [u8]>;

    /// Determines whether the named section is present.
    fn has_section(&self, name: &str) -> bool {
        self.section_data(name).is_some()
    }
}
