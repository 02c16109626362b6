//! Export section (id 7): `(name, kind, index)` triples.

use crate::error::{DecodeError, DecodeResult};
use crate::reader::ByteReader;
use crate::symbol_table::SymbolTable;
use crate::types::ExternalKind;

pub fn decode(reader: &mut ByteReader, symbol_table: &mut SymbolTable) -> DecodeResult<()> {
    let count = reader.read_unsigned_int32()?;
    for _ in 0..count {
        decode_one(reader, symbol_table)?;
    }
    Ok(())
}

fn decode_one(reader: &mut ByteReader, symbol_table: &mut SymbolTable) -> DecodeResult<()> {
    let name = reader.read_name()?;
    let kind_byte = reader.read1()?;
    let kind = ExternalKind::from_byte(kind_byte)
        .ok_or_else(|| DecodeError::malformed(format!("invalid export kind {:#04X}", kind_byte)))?;
    let index = reader.read_unsigned_int32()?;

    match kind {
        ExternalKind::Function => symbol_table.export_function(name, index),
        ExternalKind::Table => {
            if !symbol_table.table_exists() || index != 0 {
                return Err(DecodeError::malformed(format!(
                    "table export {:?} must reference table index 0 of an existing table",
                    name
                )));
            }
            symbol_table.export_table(name);
        }
        // Memory exports are parsed for byte-consumption correctness but dropped: the
        // symbol table does not model them.
        ExternalKind::Memory => {}
        ExternalKind::Global => symbol_table.export_global(name, index),
    }
    Ok(())
}
