//! Global section (id 6): the two-phase constant-initializer protocol.
//!
//! A global's initializer is a single constant instruction. Numeric consts resolve
//! immediately. A `global.get` of an already-resolved imported global resolves immediately
//! too, by copying the source value in. A `global.get` of a not-yet-resolved imported
//! global cannot resolve here: the new global is left `UNRESOLVED_GET` with a
//! back-reference for the linker to complete out of band.

use crate::context::LanguageContext;
use crate::error::{DecodeError, DecodeResult};
use crate::reader::ByteReader;
use crate::symbol_table::{Resolution, SymbolTable};
use crate::types::{Mutability, ValueType};

use super::types::read_value_type;

const OP_I32_CONST: u8 = 0x41;
const OP_I64_CONST: u8 = 0x42;
const OP_F32_CONST: u8 = 0x43;
const OP_F64_CONST: u8 = 0x44;
const OP_GLOBAL_GET: u8 = 0x23;
const OP_END: u8 = 0x0B;

pub fn decode(
    reader: &mut ByteReader,
    symbol_table: &mut SymbolTable,
    ctx: &mut LanguageContext,
) -> DecodeResult<()> {
    let count = reader.read_unsigned_int32()?;
    for _ in 0..count {
        decode_one(reader, symbol_table, ctx)?;
    }
    Ok(())
}

fn decode_one(reader: &mut ByteReader, symbol_table: &mut SymbolTable, ctx: &mut LanguageContext) -> DecodeResult<()> {
    let value_type = read_value_type(reader)?;
    let mutability_byte = reader.read1()?;
    let mutability = Mutability::from_byte(mutability_byte)
        .ok_or_else(|| DecodeError::malformed(format!("invalid mutability byte {:#04X}", mutability_byte)))?;

    let init = decode_init_expr(reader, value_type, symbol_table, ctx)?;

    let address = symbol_table.declare_global(ctx.globals, value_type, mutability, init.resolution, false);
    ctx.globals.store_long(address, init.raw_value);
    if let Some(source_index) = init.backref {
        symbol_table.unresolved_global_backrefs.insert(address, source_index);
    }
    Ok(())
}

/// Re-evaluates this section's initializers against the already-populated symbol table and
/// rewrites the existing global slots, instead of declaring new ones. Used by
/// `reset_global_state`, which has already rejected any global this can't safely recompute.
pub(crate) fn replay(reader: &mut ByteReader, symbol_table: &SymbolTable, ctx: &mut LanguageContext) -> DecodeResult<()> {
    let count = reader.read_unsigned_int32()?;
    let imported = symbol_table.max_global_index() - count;
    for i in 0..count {
        let global_index = imported + i;
        let value_type = read_value_type(reader)?;
        let _mutability_byte = reader.read1()?;
        let init = decode_init_expr(reader, value_type, symbol_table, ctx)?;
        let address = symbol_table.global_address(global_index);
        ctx.globals.store_long(address, init.raw_value);
    }
    Ok(())
}

struct InitResult {
    resolution: Resolution,
    raw_value: i64,
    backref: Option<u32>,
}

/// A single instruction followed by `END`. Legal producers: the four numeric `const`
/// opcodes, or `global.get` of an already-imported global.
fn decode_init_expr(
    reader: &mut ByteReader,
    value_type: ValueType,
    symbol_table: &SymbolTable,
    ctx: &mut LanguageContext,
) -> DecodeResult<InitResult> {
    let opcode = reader.read1()?;
    let init = match opcode {
        OP_I32_CONST => {
            let (v, _) = reader.read_signed_int32()?;
            InitResult { resolution: Resolution::Declared, raw_value: (v as u32) as i64, backref: None }
        }
        OP_I64_CONST => {
            let (v, _) = reader.read_signed_int64()?;
            InitResult { resolution: Resolution::Declared, raw_value: v, backref: None }
        }
        OP_F32_CONST => {
            let bits = reader.read_float32_as_int32()?;
            InitResult { resolution: Resolution::Declared, raw_value: bits as i64, backref: None }
        }
        OP_F64_CONST => {
            let bits = reader.read_float64_as_int64()?;
            InitResult { resolution: Resolution::Declared, raw_value: bits as i64, backref: None }
        }
        OP_GLOBAL_GET => decode_global_get(reader, value_type, symbol_table, ctx)?,
        other => {
            return Err(DecodeError::malformed(format!(
                "invalid constant expression opcode {:#04X}",
                other
            )));
        }
    };

    let end = reader.read1()?;
    if end != OP_END {
        return Err(DecodeError::malformed(format!(
            "constant expression must be a single instruction followed by END, found {:#04X}",
            end
        )));
    }

    Ok(init)
}

fn decode_global_get(
    reader: &mut ByteReader,
    value_type: ValueType,
    symbol_table: &SymbolTable,
    ctx: &mut LanguageContext,
) -> DecodeResult<InitResult> {
    let source_index = reader.read_unsigned_int32()?;
    if source_index >= symbol_table.max_global_index() {
        return Err(DecodeError::malformed(format!(
            "global.get in initializer references undeclared global {}",
            source_index
        )));
    }
    if !symbol_table.global_is_imported(source_index) {
        return Err(DecodeError::malformed(format!(
            "global.get in initializer must reference an imported global, found local global {}",
            source_index
        )));
    }

    match symbol_table.global_resolution(source_index) {
        Resolution::Resolved | Resolution::ImportedResolved => {
            let source_type = symbol_table.global_value_type(source_index);
            if source_type != value_type {
                return Err(DecodeError::linker(format!(
                    "global.get initializer type mismatch: declared {:?}, source global {} is {:?}",
                    value_type, source_index, source_type
                )));
            }
            let address = symbol_table.global_address(source_index);
            let value = ctx.globals.load_as_long(address);
            Ok(InitResult { resolution: Resolution::Declared, raw_value: value, backref: None })
        }
        _ => Ok(InitResult { resolution: Resolution::UnresolvedGet, raw_value: 0, backref: Some(source_index) }),
    }
}
