//! Code section (id 10): function bodies, decoded with the abstract stack interpreter.
//!
//! Root-node registration ("sweep 1" in the design notes) is folded into the single pass
//! below: a [`CallNode`] stub only needs the callee's numeric index, so there is nothing to
//! pre-register before bodies are decoded — forward `CALL`s resolve against the index space
//! alone, never against an already-materialized callee.

use crate::error::{DecodeError, DecodeResult};
use crate::exec::{BlockNode, BranchTable, BranchTarget, CallNode, CodeEntry, ExecutionNodeFactory, ExecutionState, PoolDeltas};
use crate::reader::ByteReader;
use crate::symbol_table::SymbolTable;
use crate::types::{BlockType, Mutability, ValueType};

const OP_UNREACHABLE: u8 = 0x00;
const OP_NOP: u8 = 0x01;
const OP_BLOCK: u8 = 0x02;
const OP_LOOP: u8 = 0x03;
const OP_IF: u8 = 0x04;
const OP_ELSE: u8 = 0x05;
const OP_END: u8 = 0x0B;
const OP_BR: u8 = 0x0C;
const OP_BR_IF: u8 = 0x0D;
const OP_BR_TABLE: u8 = 0x0E;
const OP_RETURN: u8 = 0x0F;
const OP_CALL: u8 = 0x10;
const OP_CALL_INDIRECT: u8 = 0x11;
const OP_DROP: u8 = 0x1A;
const OP_SELECT: u8 = 0x1B;
const OP_LOCAL_GET: u8 = 0x20;
const OP_LOCAL_SET: u8 = 0x21;
const OP_LOCAL_TEE: u8 = 0x22;
const OP_GLOBAL_GET: u8 = 0x23;
const OP_GLOBAL_SET: u8 = 0x24;
const OP_MEMORY_SIZE: u8 = 0x3F;
const OP_MEMORY_GROW: u8 = 0x40;
const OP_I32_CONST: u8 = 0x41;
const OP_I64_CONST: u8 = 0x42;
const OP_F32_CONST: u8 = 0x43;
const OP_F64_CONST: u8 = 0x44;

/// `i32.load` .. `i64.load32_u`: 14 opcodes, each `align:u32` then `offset:u32`, pop address
/// push value.
const LOAD_FAMILY: std::ops::RangeInclusive<u8> = 0x28..=0x35;
/// `i32.store` .. `i64.store32`: 9 opcodes, each `align:u32` then `offset:u32`, pop value
/// and address.
const STORE_FAMILY: std::ops::RangeInclusive<u8> = 0x36..=0x3E;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminator {
    End,
    Else,
}

pub fn decode(
    reader: &mut ByteReader,
    symbol_table: &mut SymbolTable,
    factory: &mut dyn ExecutionNodeFactory<Node = BlockNode>,
) -> DecodeResult<()> {
    let count = reader.read_unsigned_int32()?;
    let imported = symbol_table.imported_function_count();
    let declared = symbol_table.functions.len() as u32 - imported;
    if count != declared {
        return Err(DecodeError::malformed(format!(
            "code section declares {} bodies but the function section declared {}",
            count, declared
        )));
    }

    for i in 0..count {
        let function_index = imported + i;
        decode_entry(reader, function_index, symbol_table, factory)?;
    }
    Ok(())
}

fn decode_entry(
    reader: &mut ByteReader,
    function_index: u32,
    symbol_table: &mut SymbolTable,
    factory: &mut dyn ExecutionNodeFactory<Node = BlockNode>,
) -> DecodeResult<()> {
    let declared_size = reader.read_unsigned_int32()?;
    let entry_start = reader.offset();

    let type_index = symbol_table.function(function_index).type_index;
    let return_length = symbol_table.function_type_return_type_length(type_index);

    let mut local_types: Vec<u8> = symbol_table.function_types[type_index as usize]
        .params
        .iter()
        .map(|ty| ty.to_byte())
        .collect();

    let local_group_count = reader.read_unsigned_int32()?;
    for _ in 0..local_group_count {
        let group_count = reader.read_unsigned_int32()?;
        let ty = super::types::read_value_type(reader)?;
        local_types.extend(std::iter::repeat(ty.to_byte()).take(group_count as usize));
    }

    let function_return_type = match return_length {
        0 => BlockType::Void,
        _ => BlockType::Value(
            symbol_table.function_types[type_index as usize]
                .return_type()
                .expect("return_length > 0 implies a result type is present"),
        ),
    };

    let mut state = ExecutionState::new();
    let (body, terminator) = decode_block_body(
        reader,
        &mut state,
        &local_types,
        symbol_table,
        function_return_type,
        factory,
    )?;
    if terminator != Terminator::End {
        return Err(DecodeError::malformed("function body must terminate with END"));
    }

    let consumed = (reader.offset() - entry_start) as u32;
    if consumed != declared_size {
        return Err(DecodeError::malformed(format!(
            "code entry {}: declared size {} but consumed {} byte(s)",
            function_index, declared_size, consumed
        )));
    }

    let code_entry = CodeEntry {
        local_types,
        byte_constants: state.byte_constants.clone(),
        int_constants: state.int_constants.clone(),
        long_constants: state.long_constants.clone(),
        branch_tables: state.branch_tables.clone(),
        max_stack_size: state.max_stack_size(),
        body,
    };
    symbol_table.set_function_code(function_index, code_entry);
    Ok(())
}

fn read_block_type(reader: &mut ByteReader) -> DecodeResult<BlockType> {
    let byte = reader.read1()?;
    if byte == BlockType::TAG_VOID {
        return Ok(BlockType::Void);
    }
    let value_type = ValueType::from_byte(byte)
        .ok_or_else(|| DecodeError::malformed(format!("invalid block type {:#04X}", byte)))?;
    Ok(BlockType::Value(value_type))
}

/// Decodes one control-flow scope's instruction sequence until `END` or `ELSE`. Nested
/// `BLOCK`/`LOOP`/`IF` constructs each contribute their own child node(s); everything else
/// only mutates `state` and its constant pools.
#[allow(clippy::too_many_arguments)]
fn decode_block_body(
    reader: &mut ByteReader,
    state: &mut ExecutionState,
    locals: &[u8],
    symbol_table: &SymbolTable,
    function_return_type: BlockType,
    factory: &mut dyn ExecutionNodeFactory<Node = BlockNode>,
) -> DecodeResult<(BlockNode, Terminator)> {
    let start_offset = reader.offset();
    let pool_marks = state.pool_marks();
    let mut children: Vec<BlockNode> = Vec::new();
    let mut calls: Vec<CallNode> = Vec::new();

    let terminator = loop {
        let opcode = reader.read1()?;
        match opcode {
            OP_END => break Terminator::End,
            OP_ELSE => break Terminator::Else,
            OP_UNREACHABLE | OP_NOP => {}

            OP_BLOCK => {
                let block_type = read_block_type(reader)?;
                state.enter_scope(block_type.return_length());
                let (node, term) =
                    decode_block_body(reader, state, locals, symbol_table, function_return_type, factory)?;
                state.exit_scope();
                expect_terminator(term, Terminator::End, "block")?;
                children.push(node);
            }

            OP_LOOP => {
                let block_type = read_block_type(reader)?;
                let start_stack = state.stack_size();
                state.enter_scope(0);
                let (node, term) =
                    decode_block_body(reader, state, locals, symbol_table, function_return_type, factory)?;
                state.exit_scope();
                expect_terminator(term, Terminator::End, "loop")?;
                state.set_stack_size(start_stack + block_type.return_length());
                children.push(node);
            }

            OP_IF => {
                let block_type = read_block_type(reader)?;
                state.pop(1)?;
                let start_after_pop = state.stack_size();
                let return_length = block_type.return_length();

                state.enter_scope(return_length);
                let (true_node, term) =
                    decode_block_body(reader, state, locals, symbol_table, function_return_type, factory)?;
                state.exit_scope();
                state.set_stack_size(start_after_pop + return_length);

                let false_node = if term == Terminator::Else {
                    state.enter_scope(return_length);
                    let (node, term2) =
                        decode_block_body(reader, state, locals, symbol_table, function_return_type, factory)?;
                    state.exit_scope();
                    expect_terminator(term2, Terminator::End, "if (false branch)")?;
                    state.set_stack_size(start_after_pop + return_length);
                    node
                } else {
                    if return_length != 0 {
                        return Err(DecodeError::malformed("non-void if must have an else branch"));
                    }
                    factory.make_block(Vec::new(), Vec::new(), 0, PoolDeltas::default())
                };

                children.push(true_node);
                children.push(false_node);
            }

            OP_BR => {
                let (depth, bytes) = reader.read_unsigned_int32_sized()?;
                emit_branch(state, depth, bytes)?;
            }
            OP_BR_IF => {
                state.pop(1)?;
                let (depth, bytes) = reader.read_unsigned_int32_sized()?;
                emit_branch(state, depth, bytes)?;
            }
            OP_BR_TABLE => decode_br_table(reader, state)?,

            OP_RETURN => {
                let scope_depth = state.scope_depth();
                state.emit_long(scope_depth as i64);
                state.emit_int(function_return_type.return_length() as i32);
            }

            OP_CALL => {
                let (function_index, bytes) = reader.read_unsigned_int32_sized()?;
                let type_index = symbol_table.function(function_index).type_index;
                let argc = symbol_table.function_type_argument_count(type_index);
                let retc = symbol_table.function_type_return_type_length(type_index);
                state.pop(argc)?;
                state.push(retc);
                state.emit_long(function_index as i64);
                state.emit_byte(bytes as u8);
                calls.push(CallNode::Direct { function_index });
            }
            OP_CALL_INDIRECT => {
                let (type_index, bytes) = reader.read_unsigned_int32_sized()?;
                let argc = symbol_table.function_type_argument_count(type_index);
                let retc = symbol_table.function_type_return_type_length(type_index);
                state.pop(argc + 1)?;
                state.push(retc);
                state.emit_long(type_index as i64);
                state.emit_byte(bytes as u8);
                calls.push(CallNode::Indirect { type_index });
                let reserved = reader.read1()?;
                if reserved != 0x00 {
                    return Err(DecodeError::malformed(format!(
                        "call_indirect reserved table index byte must be 0x00, found {:#04X}",
                        reserved
                    )));
                }
            }

            OP_DROP => state.pop(1)?,
            OP_SELECT => {
                state.pop(3)?;
                state.push(1);
            }

            OP_LOCAL_GET => {
                let (index, bytes) = reader.read_unsigned_int32_sized()?;
                check_local_index(locals, index)?;
                state.push(1);
                state.emit_long(index as i64);
                state.emit_byte(bytes as u8);
            }
            OP_LOCAL_SET => {
                let (index, bytes) = reader.read_unsigned_int32_sized()?;
                check_local_index(locals, index)?;
                state.pop(1)?;
                state.emit_long(index as i64);
                state.emit_byte(bytes as u8);
            }
            OP_LOCAL_TEE => {
                let (index, bytes) = reader.read_unsigned_int32_sized()?;
                check_local_index(locals, index)?;
                state.pop(1)?;
                state.push(1);
                state.emit_long(index as i64);
                state.emit_byte(bytes as u8);
            }
            OP_GLOBAL_GET => {
                let (index, bytes) = reader.read_unsigned_int32_sized()?;
                check_global_index(symbol_table, index)?;
                state.push(1);
                state.emit_long(index as i64);
                state.emit_byte(bytes as u8);
            }
            OP_GLOBAL_SET => {
                let (index, bytes) = reader.read_unsigned_int32_sized()?;
                check_global_index(symbol_table, index)?;
                if symbol_table.global_mutability(index) != Mutability::Var {
                    return Err(DecodeError::malformed(format!(
                        "global.set target {} is not mutable",
                        index
                    )));
                }
                state.pop(1)?;
                state.emit_long(index as i64);
                state.emit_byte(bytes as u8);
            }

            op if LOAD_FAMILY.contains(&op) => {
                emit_memarg(reader, state)?;
                state.pop(1)?;
                state.push(1);
            }
            op if STORE_FAMILY.contains(&op) => {
                emit_memarg(reader, state)?;
                state.pop(2)?;
            }

            OP_MEMORY_SIZE => {
                expect_reserved_byte(reader)?;
                state.push(1);
            }
            OP_MEMORY_GROW => {
                expect_reserved_byte(reader)?;
                state.pop(1)?;
                state.push(1);
            }

            OP_I32_CONST => {
                let (value, bytes) = reader.read_signed_int32()?;
                state.emit_long(value as i64);
                state.emit_byte(bytes as u8);
                state.push(1);
            }
            OP_I64_CONST => {
                let (value, bytes) = reader.read_signed_int64()?;
                state.emit_long(value);
                state.emit_byte(bytes as u8);
                state.push(1);
            }
            OP_F32_CONST => {
                let bits = reader.read_float32_as_int32()?;
                state.emit_long(bits as i64);
                state.push(1);
            }
            OP_F64_CONST => {
                let bits = reader.read_float64_as_int64()?;
                state.emit_long(bits as i64);
                state.push(1);
            }

            other => match numeric_arity(other) {
                Some((pop, push)) => {
                    state.pop(pop)?;
                    state.push(push);
                }
                None => return Err(DecodeError::malformed(format!("unknown opcode {:#04X}", other))),
            },
        }
    };

    let consumed_bytes = (reader.offset() - start_offset) as u32;
    let pool_deltas = state.pool_deltas_since(pool_marks);
    let node = factory.make_block(children, calls, consumed_bytes, pool_deltas);
    Ok((node, terminator))
}

fn expect_terminator(found: Terminator, expected: Terminator, context: &str) -> DecodeResult<()> {
    if found != expected {
        return Err(DecodeError::malformed(format!("unexpected ELSE terminating a {}", context)));
    }
    Ok(())
}

fn expect_reserved_byte(reader: &mut ByteReader) -> DecodeResult<()> {
    let byte = reader.read1()?;
    if byte != 0x00 {
        return Err(DecodeError::malformed(format!(
            "reserved byte must be 0x00, found {:#04X}",
            byte
        )));
    }
    Ok(())
}

fn check_local_index(locals: &[u8], index: u32) -> DecodeResult<()> {
    if index as usize >= locals.len() {
        return Err(DecodeError::malformed(format!(
            "local index {} out of range (only {} local(s) declared)",
            index,
            locals.len()
        )));
    }
    Ok(())
}

fn check_global_index(symbol_table: &SymbolTable, index: u32) -> DecodeResult<()> {
    if index >= symbol_table.max_global_index() {
        return Err(DecodeError::malformed(format!(
            "global index {} out of range (only {} global(s) declared)",
            index,
            symbol_table.max_global_index()
        )));
    }
    Ok(())
}

fn emit_branch(state: &mut ExecutionState, depth: u32, depth_bytes: u32) -> DecodeResult<()> {
    let target_stack_state = state.stack_state_at_depth(depth)?;
    let target_return_length = state.continuation_return_length_at_depth(depth)?;
    state.emit_long(depth as i64);
    state.emit_byte(depth_bytes as u8);
    state.emit_int(target_stack_state as i32);
    state.emit_int(target_return_length as i32);
    Ok(())
}

fn decode_br_table(reader: &mut ByteReader, state: &mut ExecutionState) -> DecodeResult<()> {
    let target_count = reader.read_unsigned_int32()?;
    let mut targets = Vec::with_capacity((target_count + 1) as usize);
    let mut uniform_return_length: Option<u32> = None;

    for _ in 0..target_count {
        let label_depth = reader.read_unsigned_int32()?;
        let target_stack_state = state.stack_state_at_depth(label_depth)?;
        let return_length = state.continuation_return_length_at_depth(label_depth)?;
        check_uniform_arity(&mut uniform_return_length, return_length)?;
        targets.push(BranchTarget { label_depth, target_stack_state });
    }

    let default_label_depth = reader.read_unsigned_int32()?;
    let default_target_stack_state = state.stack_state_at_depth(default_label_depth)?;
    let default_return_length = state.continuation_return_length_at_depth(default_label_depth)?;
    check_uniform_arity(&mut uniform_return_length, default_return_length)?;
    targets.push(BranchTarget { label_depth: default_label_depth, target_stack_state: default_target_stack_state });

    state.pop(1)?;
    state.emit_branch_table(BranchTable { default_return_length: default_return_length as i32, targets });
    Ok(())
}

fn check_uniform_arity(expected: &mut Option<u32>, found: u32) -> DecodeResult<()> {
    match *expected {
        Some(e) if e != found => Err(DecodeError::malformed(format!(
            "br_table targets disagree on return arity: expected {}, found {}",
            e, found
        ))),
        _ => {
            *expected = Some(found);
            Ok(())
        }
    }
}

/// `align` hint (discarded, byte-length recorded) followed by `offset` (value and
/// byte-length both recorded).
fn emit_memarg(reader: &mut ByteReader, state: &mut ExecutionState) -> DecodeResult<()> {
    let (_align, align_bytes) = reader.read_unsigned_int32_sized()?;
    state.emit_byte(align_bytes as u8);
    let (offset, offset_bytes) = reader.read_unsigned_int32_sized()?;
    state.emit_long(offset as i64);
    state.emit_byte(offset_bytes as u8);
    Ok(())
}

/// Arity of the numeric instructions (comparisons, unary/binary arithmetic, conversions)
/// that carry no immediates: `0x45..=0xBF` with no gaps in this module version.
fn numeric_arity(opcode: u8) -> Option<(u32, u32)> {
    match opcode {
        0x45 => Some((1, 1)),          // i32.eqz
        0x46..=0x4F => Some((2, 1)),   // i32 comparisons
        0x50 => Some((1, 1)),          // i64.eqz
        0x51..=0x5A => Some((2, 1)),   // i64 comparisons
        0x5B..=0x60 => Some((2, 1)),   // f32 comparisons
        0x61..=0x66 => Some((2, 1)),   // f64 comparisons
        0x67..=0x69 => Some((1, 1)),   // i32.clz/ctz/popcnt
        0x6A..=0x78 => Some((2, 1)),   // i32 binary
        0x79..=0x7B => Some((1, 1)),   // i64.clz/ctz/popcnt
        0x7C..=0x8A => Some((2, 1)),   // i64 binary
        0x8B..=0x91 => Some((1, 1)),   // f32 unary
        0x92..=0x98 => Some((2, 1)),   // f32 binary
        0x99..=0x9F => Some((1, 1)),   // f64 unary
        0xA0..=0xA6 => Some((2, 1)),   // f64 binary
        0xA7..=0xBB => Some((1, 1)),   // conversions
        0xBC..=0xBF => Some((1, 1)),   // reinterpretations
        _ => None,
    }
}
