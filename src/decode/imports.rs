//! Import section (id 2): functions, the (at most one) table, the (at most one) memory,
//! and globals, all imported by `(module, member)` name pair.

use crate::context::LanguageContext;
use crate::error::{DecodeError, DecodeResult};
use crate::reader::ByteReader;
use crate::symbol_table::{Resolution, SymbolTable};
use crate::types::{ElementType, ExternalKind, Limits, Mutability};

use super::types::read_value_type;

pub fn decode(
    reader: &mut ByteReader,
    module_name: &str,
    symbol_table: &mut SymbolTable,
    ctx: &mut LanguageContext,
) -> DecodeResult<()> {
    let count = reader.read_unsigned_int32()?;
    for _ in 0..count {
        decode_one(reader, module_name, symbol_table, ctx)?;
    }
    Ok(())
}

fn decode_one(
    reader: &mut ByteReader,
    module_name: &str,
    symbol_table: &mut SymbolTable,
    ctx: &mut LanguageContext,
) -> DecodeResult<()> {
    let source_module = reader.read_name()?;
    let source_member = reader.read_name()?;
    let kind_byte = reader.read1()?;
    let kind = ExternalKind::from_byte(kind_byte)
        .ok_or_else(|| DecodeError::malformed(format!("invalid import kind {:#04X}", kind_byte)))?;

    match kind {
        ExternalKind::Function => {
            let type_index = reader.read_unsigned_int32()?;
            symbol_table.import_function(source_module, source_member, type_index);
        }
        ExternalKind::Table => {
            let elem_byte = reader.read1()?;
            if elem_byte != ElementType::TAG_FUNCREF {
                return Err(DecodeError::malformed(format!(
                    "invalid table element type {:#04X}, only funcref is supported",
                    elem_byte
                )));
            }
            let (initial, maximum) = read_limits(reader)?;
            symbol_table.import_table(initial, maximum)?;
            ctx.table.allocate(Limits { initial, maximum })?;
        }
        ExternalKind::Memory => {
            let (initial, maximum) = read_limits(reader)?;
            symbol_table.import_memory(initial, maximum)?;
            ctx.memory.allocate(Limits { initial, maximum })?;
        }
        ExternalKind::Global => {
            let value_type = read_value_type(reader)?;
            let mutability_byte = reader.read1()?;
            let mutability = Mutability::from_byte(mutability_byte)
                .ok_or_else(|| DecodeError::malformed(format!("invalid mutability byte {:#04X}", mutability_byte)))?;
            let global_index =
                symbol_table.declare_global(ctx.globals, value_type, mutability, Resolution::ImportedUnresolved, true);
            ctx.linker.import_global(
                module_name,
                global_index,
                &source_module,
                &source_member,
                value_type,
                mutability,
            );
        }
    }
    Ok(())
}

/// `flags` byte (`0x00` = `initial` only, `0x01` = `initial` and `maximum`) followed by one
/// or two `varuint32`s. Any other flag byte is malformed.
pub(crate) fn read_limits(reader: &mut ByteReader) -> DecodeResult<(u32, Option<u32>)> {
    let flags = reader.read1()?;
    match flags {
        0x00 => {
            let initial = reader.read_unsigned_int32()?;
            Ok((initial, None))
        }
        0x01 => {
            let initial = reader.read_unsigned_int32()?;
            let maximum = reader.read_unsigned_int32()?;
            Ok((initial, Some(maximum)))
        }
        other => Err(DecodeError::malformed(format!("invalid limits flag {:#04X}", other))),
    }
}
