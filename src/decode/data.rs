//! Data section (id 11): byte segments written into the module's (single) linear memory.
//!
//! `global.get` offsets are an explicitly unimplemented open question upstream: this
//! decoder fails fast with a `LINKER` error rather than silently accepting bytes it cannot
//! place correctly.

use crate::context::LanguageContext;
use crate::error::{DecodeError, DecodeResult};
use crate::reader::ByteReader;
use crate::symbol_table::SymbolTable;

const OP_I32_CONST: u8 = 0x41;
const OP_GLOBAL_GET: u8 = 0x23;
const OP_END: u8 = 0x0B;

pub fn decode(reader: &mut ByteReader, symbol_table: &SymbolTable, ctx: &mut LanguageContext) -> DecodeResult<()> {
    let count = reader.read_unsigned_int32()?;
    for _ in 0..count {
        decode_one(reader, symbol_table, ctx)?;
    }
    Ok(())
}

fn decode_one(reader: &mut ByteReader, symbol_table: &SymbolTable, ctx: &mut LanguageContext) -> DecodeResult<()> {
    let memory_index = reader.read_unsigned_int32()?;
    if memory_index != 0 {
        return Err(DecodeError::malformed(format!(
            "data segment memory index {} is not supported, only memory 0 exists",
            memory_index
        )));
    }

    let base = decode_offset_expr(reader)?;

    let byte_count = reader.read_unsigned_int32()?;
    let bytes = reader.read_bytes(byte_count as usize)?.to_vec();

    if symbol_table.memory_count() == 0 {
        return Err(DecodeError::malformed("data segment requires a declared or imported memory"));
    }

    ctx.memory.validate_address(base, bytes.len() as u32)?;
    for (i, byte) in bytes.into_iter().enumerate() {
        ctx.memory.store_i32_8(base + i as u32, byte)?;
    }
    Ok(())
}

fn decode_offset_expr(reader: &mut ByteReader) -> DecodeResult<u32> {
    let opcode = reader.read1()?;
    let offset = match opcode {
        OP_I32_CONST => {
            let (v, _) = reader.read_signed_int32()?;
            v as u32
        }
        OP_GLOBAL_GET => {
            return Err(DecodeError::linker(
                "global.get is not supported as a data segment offset expression",
            ));
        }
        other => {
            return Err(DecodeError::malformed(format!(
                "invalid data segment offset expression opcode {:#04X}",
                other
            )));
        }
    };

    let end = reader.read1()?;
    if end != OP_END {
        return Err(DecodeError::malformed(format!(
            "data segment offset expression must end with END, found {:#04X}",
            end
        )));
    }
    Ok(offset)
}
