//! A lazy, queryable index over DWARF debugging information.
//!
//! [`Cache`](crate::cache::Cache) builds an in-memory index of a single
//! object file's DWARF debug sections — compile units, types, subprograms,
//! address ranges, public names and line tables — deferring the expensive
//! parts (subprogram bodies, line programs) until a caller actually asks for
//! them. Both the classic DWARF v1 `.debug`/`.line` section pair and
//! DWARF v2 through v4's `.debug_info`/`.debug_abbrev` family are supported;
//! a given object uses exactly one or the other.
//!
//! The cache itself knows nothing about object-file containers: callers
//! implement [`sections::Sections`] once per container format (ELF, Mach-O,
//! ...) and hand it to [`cache::Cache::new`].
//!
//! # Background
//!
//! This crate intentionally narrows its scope to the debug-information
//! index itself. Evaluating a `DW_AT_location` expression against live
//! target memory and registers, or mapping a symbolic name back to a
//! runtime address, are the job of the [`property::MemoryContext`] and
//! [`property::ExpressionEvaluator`] traits a caller supplies — this crate
//! only classifies and caches the raw attribute values those traits need.

#![warn(missing_docs)]

mod arena;
mod entity;
mod error;
mod line;
mod pubnames;
mod ranges;
mod resolver;
mod unit;
mod v1;
mod walker;

pub mod cache;
pub mod property;
pub mod sections;

pub use crate::arena::ObjectHandle;
pub use crate::cache::Cache;
pub use crate::entity::{
    AddrRange, FundType, IndexRange, IndexRangeFmt, ObjectFlags, ObjectInfo, RangeBound, Tag,
    Variant,
};
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::pubnames::PubNamesTable;
pub use crate::ranges::UnitAddressRange;
pub use crate::unit::{CompUnit, CompUnitHandle, FileInfo, RegIdScope, SectionKind};
