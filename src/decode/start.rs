//! Start section (id 8): a single function index, invoked once after linking.

use crate::error::DecodeResult;
use crate::reader::ByteReader;
use crate::symbol_table::SymbolTable;

pub fn decode(reader: &mut ByteReader, symbol_table: &mut SymbolTable) -> DecodeResult<()> {
    let index = reader.read_unsigned_int32()?;
    symbol_table.set_start_function(index);
    Ok(())
}
