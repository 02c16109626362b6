//! Memory section (id 5): at most one linear memory.

use crate::context::LanguageContext;
use crate::error::{DecodeError, DecodeResult};
use crate::reader::ByteReader;
use crate::symbol_table::SymbolTable;
use crate::types::Limits;

use super::imports::read_limits;

pub fn decode(
    reader: &mut ByteReader,
    symbol_table: &mut SymbolTable,
    ctx: &mut LanguageContext,
) -> DecodeResult<()> {
    let count = reader.read_unsigned_int32()?;
    for _ in 0..count {
        if symbol_table.memory_count() > 0 {
            return Err(DecodeError::malformed("at most one memory per module"));
        }
        let (initial, maximum) = read_limits(reader)?;
        symbol_table.allocate_memory(initial, maximum)?;
        ctx.memory.allocate(Limits { initial, maximum })?;
    }
    Ok(())
}
