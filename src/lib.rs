//! Decoder and static analyzer for the WebAssembly binary module format (module version 1).
//!
//! Consumes an opaque byte buffer and produces a fully populated symbol table plus, for
//! every function, a preprocessed body: an abstract-stack-interpreted tree of execution
//! nodes annotated with per-opcode constant pools and control-flow side tables. Execution
//! semantics, the cross-module linker, and runtime table/memory objects are out of scope —
//! this crate only talks to them through the narrow trait seams in [`context`].

mod context;
mod decode;
mod error;
mod exec;
mod module;
mod reader;
mod symbol_table;
mod types;

pub use context::{GlobalsArray, LanguageContext, Linker, MemoryController, TableController};
pub use error::{DecodeError, DecodeResult};
pub use exec::{BlockNode, BranchTable, BranchTarget, CallNode, CodeEntry, ExecutionNodeFactory, PlainNodeFactory, PoolDeltas};
pub use module::Module;
pub use symbol_table::{
    Export, FunctionRecord, FunctionSignature, GlobalRecord, MemoryRecord, Resolution, SymbolTable, TableRecord,
};
pub use types::{BlockType, ElementType, ExternalKind, Limits, Mutability, ValueType};
