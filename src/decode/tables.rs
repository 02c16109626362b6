//! Table section (id 4): at most one table, always of `funcref` element type.

use crate::context::LanguageContext;
use crate::error::{DecodeError, DecodeResult};
use crate::reader::ByteReader;
use crate::symbol_table::SymbolTable;
use crate::types::{ElementType, Limits};

use super::imports::read_limits;

pub fn decode(
    reader: &mut ByteReader,
    symbol_table: &mut SymbolTable,
    ctx: &mut LanguageContext,
) -> DecodeResult<()> {
    let count = reader.read_unsigned_int32()?;
    for _ in 0..count {
        if symbol_table.table_exists() {
            return Err(DecodeError::malformed("at most one table per module"));
        }
        let elem_byte = reader.read1()?;
        if elem_byte != ElementType::TAG_FUNCREF {
            return Err(DecodeError::malformed(format!(
                "invalid table element type {:#04X}, only funcref is supported",
                elem_byte
            )));
        }
        let (initial, maximum) = read_limits(reader)?;
        symbol_table.allocate_table(initial, maximum)?;
        ctx.table.allocate(Limits { initial, maximum })?;
    }
    Ok(())
}
