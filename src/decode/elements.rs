//! Element section (id 9): function-index segments written into the module's (single)
//! table, either immediately (`i32.const` offset) or deferred to the linker (`global.get`
//! offset, resolved once the referenced global becomes constant).

use crate::context::LanguageContext;
use crate::error::{DecodeError, DecodeResult};
use crate::reader::ByteReader;
use crate::symbol_table::SymbolTable;

const OP_I32_CONST: u8 = 0x41;
const OP_GLOBAL_GET: u8 = 0x23;
const OP_END: u8 = 0x0B;

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

enum Offset {
    Constant(u32),
    GlobalIndex(u32),
}

fn decode_one(
    reader: &mut ByteReader,
    module_name: &str,
    symbol_table: &mut SymbolTable,
    ctx: &mut LanguageContext,
) -> DecodeResult<()> {
    let table_index = reader.read_unsigned_int32()?;
    if table_index != 0 {
        return Err(DecodeError::malformed(format!(
            "element segment table index {} is not supported, only table 0 exists",
            table_index
        )));
    }

    let offset = decode_offset_expr(reader)?;

    let func_count = reader.read_unsigned_int32()?;
    let mut contents = Vec::with_capacity(func_count as usize);
    for _ in 0..func_count {
        contents.push(reader.read_unsigned_int32()?);
    }

    if !symbol_table.table_exists() {
        return Err(DecodeError::malformed("element segment requires a declared or imported table"));
    }

    match offset {
        Offset::Constant(base) => {
            for (i, function_index) in contents.into_iter().enumerate() {
                ctx.table.set_function(base + i as u32, function_index)?;
            }
        }
        Offset::GlobalIndex(global_index) => {
            ctx.linker.try_initialize_elements(module_name, global_index, contents);
        }
    }
    Ok(())
}

fn decode_offset_expr(reader: &mut ByteReader) -> DecodeResult<Offset> {
    let opcode = reader.read1()?;
    let offset = match opcode {
        OP_I32_CONST => {
            let (v, _) = reader.read_signed_int32()?;
            Offset::Constant(v as u32)
        }
        OP_GLOBAL_GET => Offset::GlobalIndex(reader.read_unsigned_int32()?),
        other => {
            return Err(DecodeError::malformed(format!(
                "invalid element segment offset expression opcode {:#04X}",
                other
            )));
        }
    };

    let end = reader.read1()?;
    if end != OP_END {
        return Err(DecodeError::malformed(format!(
            "element segment offset expression must end with END, found {:#04X}",
            end
        )));
    }
    Ok(offset)
}
