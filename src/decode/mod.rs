//! The section dispatcher: validates the module preamble, then loops over sections,
//! enforcing the exact-byte-consumption invariant on each before handing off to the
//! per-section decoder.

mod code;
mod data;
mod elements;
mod exports;
mod functions;
mod globals;
mod imports;
mod memories;
mod start;
mod tables;
mod types;

use crate::context::LanguageContext;
use crate::error::{DecodeError, DecodeResult};
use crate::exec::{BlockNode, ExecutionNodeFactory, PlainNodeFactory};
use crate::reader::ByteReader;
use crate::symbol_table::SymbolTable;

const MAGIC: u32 = 0x6D73_6100;
const VERSION: u32 = 0x0000_0001;

const SECTION_CUSTOM: u8 = 0;
const SECTION_TYPE: u8 = 1;
const SECTION_IMPORT: u8 = 2;
const SECTION_FUNCTION: u8 = 3;
const SECTION_TABLE: u8 = 4;
const SECTION_MEMORY: u8 = 5;
const SECTION_GLOBAL: u8 = 6;
const SECTION_EXPORT: u8 = 7;
const SECTION_START: u8 = 8;
const SECTION_ELEMENT: u8 = 9;
const SECTION_CODE: u8 = 10;
const SECTION_DATA: u8 = 11;

pub fn read_preamble(reader: &mut ByteReader) -> DecodeResult<()> {
    let magic = reader.read4()?;
    if magic != MAGIC {
        return Err(DecodeError::malformed(format!("invalid MAGIC {:#010X}", magic)));
    }
    let version = reader.read4()?;
    if version != VERSION {
        return Err(DecodeError::malformed("Invalid VERSION"));
    }
    Ok(())
}

/// Decodes every section in `bytes` after the preamble, dispatching to the per-section
/// decoder and enforcing that each section consumes exactly its declared byte length.
pub fn dispatch_sections(
    reader: &mut ByteReader,
    module_name: &str,
    symbol_table: &mut SymbolTable,
    ctx: &mut LanguageContext,
) -> DecodeResult<()> {
    let mut factory = PlainNodeFactory;
    while !reader.is_eof() {
        decode_one_section(reader, module_name, symbol_table, ctx, &mut factory)?;
    }
    Ok(())
}

fn decode_one_section(
    reader: &mut ByteReader,
    module_name: &str,
    symbol_table: &mut SymbolTable,
    ctx: &mut LanguageContext,
    factory: &mut dyn ExecutionNodeFactory<Node = BlockNode>,
) -> DecodeResult<()> {
    let section_id = reader.read1()?;
    let declared_size = reader.read_unsigned_int32()?;
    let section_start = reader.offset();

    match section_id {
        SECTION_CUSTOM => {
            reader.read_bytes(declared_size as usize)?;
        }
        SECTION_TYPE => types::decode(reader, symbol_table)?,
        SECTION_IMPORT => imports::decode(reader, module_name, symbol_table, ctx)?,
        SECTION_FUNCTION => functions::decode(reader, symbol_table)?,
        SECTION_TABLE => tables::decode(reader, symbol_table, ctx)?,
        SECTION_MEMORY => memories::decode(reader, symbol_table, ctx)?,
        SECTION_GLOBAL => globals::decode(reader, symbol_table, ctx)?,
        SECTION_EXPORT => exports::decode(reader, symbol_table)?,
        SECTION_START => start::decode(reader, symbol_table)?,
        SECTION_ELEMENT => elements::decode(reader, module_name, symbol_table, ctx)?,
        SECTION_CODE => code::decode(reader, symbol_table, factory)?,
        SECTION_DATA => data::decode(reader, symbol_table, ctx)?,
        other => return Err(DecodeError::malformed(format!("unknown section id {:#04X}", other))),
    }

    let consumed = (reader.offset() - section_start) as u32;
    if consumed != declared_size {
        return Err(DecodeError::malformed(format!(
            "section {:#04X}: declared size {} but consumed {} byte(s)",
            section_id, declared_size, consumed
        )));
    }
    Ok(())
}

/// Walks section headers from the start of the module body, skipping each payload, until
/// it finds `target_id` or runs out of sections. Used by the reset procedures, which need
/// to re-decode a single section of the original buffer without re-running the whole
/// module.
pub fn try_jump_to_section(reader: &mut ByteReader, target_id: u8) -> DecodeResult<bool> {
    reader.set_offset(8); // past the preamble
    while !reader.is_eof() {
        let section_id = reader.read1()?;
        let declared_size = reader.read_unsigned_int32()?;
        if section_id == target_id {
            return Ok(true);
        }
        reader.read_bytes(declared_size as usize)?;
    }
    Ok(false)
}

/// Re-evaluates every global initializer against the original buffer and rewrites the
/// process-wide globals array, without touching resolution bookkeeping that only the
/// linker owns. Rejects resetting a global whose declared state can't be recomputed
/// locally: a mutable import (its value may have diverged at runtime) or a `global.get`
/// chain that still depends on an unresolved import.
pub fn reset_global_state(bytes: &[u8], symbol_table: &SymbolTable, ctx: &mut LanguageContext) -> DecodeResult<()> {
    for index in 0..symbol_table.max_global_index() {
        if symbol_table.global_is_imported(index) && symbol_table.global_mutability(index) == crate::types::Mutability::Var {
            return Err(DecodeError::linker(format!(
                "cannot reset global {}: it is a mutable import",
                index
            )));
        }
        if symbol_table.unresolved_global_backrefs.contains_key(&symbol_table.global_address(index)) {
            return Err(DecodeError::linker(format!(
                "cannot reset global {}: its initializer still depends on an unresolved global",
                index
            )));
        }
    }

    let mut reader = ByteReader::new(bytes);
    if !try_jump_to_section(&mut reader, SECTION_GLOBAL)? {
        return Ok(());
    }
    globals::replay(&mut reader, symbol_table, ctx)
}

/// Zeroes the module's memory (if any) and replays the data section against the original
/// buffer to restore its initial contents.
pub fn reset_memory_state(bytes: &[u8], symbol_table: &SymbolTable, ctx: &mut LanguageContext) -> DecodeResult<()> {
    if symbol_table.memory_count() == 0 {
        return Ok(());
    }
    ctx.memory.clear();

    let mut reader = ByteReader::new(bytes);
    if !try_jump_to_section(&mut reader, SECTION_DATA)? {
        return Ok(());
    }
    data::decode(&mut reader, symbol_table, ctx)
}
