//! The abstract stack interpreter and the execution-node / constant-pool data it builds.
//!
//! This is the heart of the function-body decoder: while opcodes are read, the operand
//! stack is simulated so that the moment a branch is parsed, its target's entry stack
//! depth and continuation arity are already known. That is what makes branches out of
//! nested blocks decodable in a single forward pass.

use crate::error::{DecodeError, DecodeResult};

/// A branch target inside a `br_table` side table: which enclosing scope it unwinds to
/// (`label_depth`, as originally encoded) and the operand-stack depth to truncate to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchTarget {
    pub label_depth: u32,
    pub target_stack_state: u32,
}

/// Side table for one `br_table` instruction: `[default_return_length, (target)×(N+1)]`.
/// All targets (including the default) share the same return-length arity, verified at
/// decode time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchTable {
    pub default_return_length: i32,
    pub targets: Vec<BranchTarget>,
}

/// Lengths of the four append-only pools consumed by one control-flow scope, recorded as
/// deltas so that a block node can report exactly how many pool entries it produced
/// (invariant: these deltas sum to the pools' total growth across the whole function).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolDeltas {
    pub byte_constants: u32,
    pub int_constants: u32,
    pub long_constants: u32,
    pub branch_tables: u32,
}

/// A reference to a not-yet-materialized call. The real call node is constructed lazily
/// on first execution because the callee may not exist yet at decode time: `CALL` can
/// forward-reference a function later in the same module, and in a linked multi-module
/// setting the callee may live in a module not yet decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallNode {
    Direct { function_index: u32 },
    Indirect { type_index: u32 },
}

/// The opaque execution-node tree handed off to the (out of scope) execution engine.
/// `body` on a [`crate::exec::CodeEntry`] is the root of one of these per function; the
/// engine's interpretation of it is not part of this crate's contract.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockNode {
    pub children: Vec<BlockNode>,
    pub calls: Vec<CallNode>,
    pub consumed_bytes: u32,
    pub pool_deltas: PoolDeltas,
}

/// Constructs execution nodes on behalf of the engine. The decoder is the only caller;
/// engines that need a different in-memory representation than [`BlockNode`] implement
/// this instead of consuming the default.
pub trait ExecutionNodeFactory {
    type Node;

    fn make_block(
        &mut self,
        children: Vec<Self::Node>,
        calls: Vec<CallNode>,
        consumed_bytes: u32,
        pool_deltas: PoolDeltas,
    ) -> Self::Node;
}

/// Default factory producing the concrete [`BlockNode`] tree; used whenever no execution
/// engine supplies its own factory (e.g. the decoder's own test suite).
#[derive(Debug, Default)]
pub struct PlainNodeFactory;

impl ExecutionNodeFactory for PlainNodeFactory {
    type Node = BlockNode;

    fn make_block(
        &mut self,
        children: Vec<BlockNode>,
        calls: Vec<CallNode>,
        consumed_bytes: u32,
        pool_deltas: PoolDeltas,
    ) -> BlockNode {
        BlockNode {
            children,
            calls,
            consumed_bytes,
            pool_deltas,
        }
    }
}

/// Per-function decode output.
#[derive(Debug, Clone)]
pub struct CodeEntry {
    /// Parameter types followed by declared locals, one byte per slot.
    pub local_types: Vec<u8>,
    pub byte_constants: Vec<u8>,
    pub int_constants: Vec<i32>,
    pub long_constants: Vec<i64>,
    pub branch_tables: Vec<BranchTable>,
    pub max_stack_size: u32,
    pub body: BlockNode,
}

/// The abstract interpreter's working memory for one function-body decode.
///
/// Lives only for the duration of decoding a single code entry; the four pools it
/// appends to end up on the finished [`CodeEntry`].
#[derive(Debug, Default)]
pub struct ExecutionState {
    stack_size: u32,
    max_stack_size: u32,
    stack_state_snapshots: Vec<u32>,
    continuation_return_lengths: Vec<u32>,
    pub byte_constants: Vec<u8>,
    pub int_constants: Vec<i32>,
    pub long_constants: Vec<i64>,
    pub branch_tables: Vec<BranchTable>,
}

impl ExecutionState {
    pub fn new() -> ExecutionState {
        ExecutionState::default()
    }

    pub fn stack_size(&self) -> u32 {
        self.stack_size
    }

    pub fn max_stack_size(&self) -> u32 {
        self.max_stack_size
    }

    /// Forcibly sets the simulated stack depth, used by loops and non-void `if`s to
    /// correct the abstract stack back to "as if no branch had occurred" after decoding
    /// a sub-block, since early branches out of the block would otherwise desynchronize
    /// the simulation for the remainder of the enclosing scope.
    pub fn set_stack_size(&mut self, size: u32) {
        self.stack_size = size;
        if size > self.max_stack_size {
            self.max_stack_size = size;
        }
    }

    pub fn push(&mut self, n: u32) {
        self.stack_size += n;
        if self.stack_size > self.max_stack_size {
            self.max_stack_size = self.stack_size;
        }
    }

    pub fn pop(&mut self, n: u32) -> DecodeResult<()> {
        if n > self.stack_size {
            return Err(DecodeError::malformed(format!(
                "operand stack underflow: attempted to pop {} value(s), only {} present",
                n, self.stack_size
            )));
        }
        self.stack_size -= n;
        Ok(())
    }

    /// Snapshots the current stack depth and the block's continuation arity on entry to
    /// a new control scope (loops pass 0: branches to a loop header never carry a value).
    pub fn enter_scope(&mut self, continuation_return_length: u32) {
        self.stack_state_snapshots.push(self.stack_size);
        self.continuation_return_lengths.push(continuation_return_length);
    }

    pub fn exit_scope(&mut self) {
        self.stack_state_snapshots.pop();
        self.continuation_return_lengths.pop();
    }

    pub fn scope_depth(&self) -> u32 {
        self.stack_state_snapshots.len() as u32
    }

    /// Stack depth at entry of the block `depth` levels out from the innermost (0 = the
    /// block a bare `br 0` would target).
    pub fn stack_state_at_depth(&self, depth: u32) -> DecodeResult<u32> {
        let idx = self.depth_to_index(depth)?;
        Ok(self.stack_state_snapshots[idx])
    }

    pub fn continuation_return_length_at_depth(&self, depth: u32) -> DecodeResult<u32> {
        let idx = self.depth_to_index(depth)?;
        Ok(self.continuation_return_lengths[idx])
    }

    fn depth_to_index(&self, depth: u32) -> DecodeResult<usize> {
        self.stack_state_snapshots
            .len()
            .checked_sub(1 + depth as usize)
            .ok_or_else(|| {
                DecodeError::malformed(format!(
                    "branch depth {} exceeds the current block nesting ({})",
                    depth,
                    self.stack_state_snapshots.len()
                ))
            })
    }

    pub fn emit_byte(&mut self, value: u8) {
        self.byte_constants.push(value);
    }

    pub fn emit_int(&mut self, value: i32) {
        self.int_constants.push(value);
    }

    pub fn emit_long(&mut self, value: i64) {
        self.long_constants.push(value);
    }

    pub fn emit_branch_table(&mut self, table: BranchTable) {
        self.branch_tables.push(table);
    }

    /// Snapshot of the current pool lengths, used to compute a block's [`PoolDeltas`]
    /// once it finishes decoding.
    pub fn pool_marks(&self) -> PoolDeltas {
        PoolDeltas {
            byte_constants: self.byte_constants.len() as u32,
            int_constants: self.int_constants.len() as u32,
            long_constants: self.long_constants.len() as u32,
            branch_tables: self.branch_tables.len() as u32,
        }
    }

    pub fn pool_deltas_since(&self, marks: PoolDeltas) -> PoolDeltas {
        PoolDeltas {
            byte_constants: self.byte_constants.len() as u32 - marks.byte_constants,
            int_constants: self.int_constants.len() as u32 - marks.int_constants,
            long_constants: self.long_constants.len() as u32 - marks.long_constants,
            branch_tables: self.branch_tables.len() as u32 - marks.branch_tables,
        }
    }
}
