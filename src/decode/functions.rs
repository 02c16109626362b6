//! Function section (id 3): declares the type of each locally defined function. Declared
//! functions are paired with their bodies by position when the code section is decoded.

use crate::error::DecodeResult;
use crate::reader::ByteReader;
use crate::symbol_table::SymbolTable;

pub fn decode(reader: &mut ByteReader, symbol_table: &mut SymbolTable) -> DecodeResult<()> {
    let count = reader.read_unsigned_int32()?;
    for _ in 0..count {
        let type_index = reader.read_unsigned_int32()?;
        symbol_table.declare_function(type_index);
    }
    Ok(())
}
