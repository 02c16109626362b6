//! Type section (id 1): function signatures.

use crate::error::{DecodeError, DecodeResult};
use crate::reader::ByteReader;
use crate::symbol_table::SymbolTable;
use crate::types::{BlockType, ValueType};

const FUNC_TYPE_TAG: u8 = 0x60;
const RESULT_SINGLE: u32 = 1;

pub fn decode(reader: &mut ByteReader, symbol_table: &mut SymbolTable) -> DecodeResult<()> {
    let count = reader.read_unsigned_int32()?;
    for _ in 0..count {
        decode_one(reader, symbol_table)?;
    }
    Ok(())
}

fn decode_one(reader: &mut ByteReader, symbol_table: &mut SymbolTable) -> DecodeResult<()> {
    let tag = reader.read1()?;
    if tag != FUNC_TYPE_TAG {
        return Err(DecodeError::malformed(format!(
            "expected function type tag {:#04X}, found {:#04X}",
            FUNC_TYPE_TAG, tag
        )));
    }

    let param_count = reader.read_unsigned_int32()?;
    let mut params = Vec::with_capacity(param_count as usize);
    for _ in 0..param_count {
        params.push(read_value_type(reader)?);
    }

    let results = read_result_types(reader)?;

    let type_index = symbol_table.allocate_function_type(params.len() as u32, results.len() as u32);
    for (i, ty) in params.into_iter().enumerate() {
        symbol_table.register_function_type_parameter_type(type_index, i as u32, ty);
    }
    for (i, ty) in results.into_iter().enumerate() {
        symbol_table.register_function_type_return_type(type_index, i as u32, ty);
    }
    Ok(())
}

/// Producers have been observed to encode an empty result list either as the bare `0x40`
/// void marker or as a zero-length vector; both are accepted here. A vector of length one
/// is the only non-empty shape this module version supports.
fn read_result_types(reader: &mut ByteReader) -> DecodeResult<Vec<ValueType>> {
    if reader.peek1(0)? == BlockType::TAG_VOID {
        reader.read1()?;
        return Ok(Vec::new());
    }

    let count = reader.read_unsigned_int32()?;
    match count {
        0 => Ok(Vec::new()),
        RESULT_SINGLE => Ok(vec![read_value_type(reader)?]),
        _ => Err(DecodeError::malformed(format!(
            "function type result arity {} exceeds the supported maximum of 1",
            count
        ))),
    }
}

pub(crate) fn read_value_type(reader: &mut ByteReader) -> DecodeResult<ValueType> {
    let byte = reader.read1()?;
    ValueType::from_byte(byte).ok_or_else(|| DecodeError::malformed(format!("invalid value type {:#04X}", byte)))
}
