//! External collaborators. These traits are the narrow seams through which the decoder
//! talks to subsystems that are explicitly out of scope for this crate: the execution
//! engine's runtime tables/memories, the process-wide globals array, and the cross-module
//! linker. The decoder never blocks on them and never sees more than one module.

use crate::error::DecodeResult;
use crate::types::{Limits, Mutability, ValueType};

/// The process-wide globals array. Global addresses returned by
/// [`crate::symbol_table::SymbolTable::declare_global`] index into it. Owned by the embedder
/// and shared across every [`Module`](crate::module::Module) it decodes, so that two modules
/// linked against each other never hand out the same address.
pub trait GlobalsArray {
    /// Reserves and returns the next free address. Must never return an address already
    /// handed out to this or any other module sharing the array.
    fn allocate(&mut self) -> u32;
    fn load_as_long(&self, address: u32) -> i64;
    fn store_long(&mut self, address: u32, value: i64);
}

/// The runtime table object backing a module's (at most one) table: allocated at
/// table-section decode time, written into by the element section.
pub trait TableController {
    fn allocate(&mut self, limits: Limits) -> DecodeResult<()>;
    fn set_function(&mut self, offset: u32, function_index: u32) -> DecodeResult<()>;
}

/// The runtime linear memory backing a module's (at most one) memory: allocated at
/// memory-section decode time, written into by the data section, and re-zeroed by
/// `reset_memory_state`.
pub trait MemoryController {
    fn allocate(&mut self, limits: Limits) -> DecodeResult<()>;
    fn validate_address(&self, base: u32, length: u32) -> DecodeResult<()>;
    fn store_i32_8(&mut self, address: u32, byte: u8) -> DecodeResult<()>;
    fn clear(&mut self);
}

/// The cross-module linker. Both operations are pure book-keeping: they never block and
/// never observe more than the one module currently being decoded.
pub trait Linker {
    /// Declares that `importing_module`'s global at `global_index` is an import of
    /// `source_module::source_member`. Resolution (if any) happens later, out of band.
    fn import_global(
        &mut self,
        importing_module: &str,
        global_index: u32,
        source_module: &str,
        source_member: &str,
        value_type: ValueType,
        mutability: Mutability,
    );

    /// Defers writing `contents` into `importing_module`'s table at an offset carried by
    /// the global `global_index`, until that global resolves to a constant.
    fn try_initialize_elements(&mut self, importing_module: &str, global_index: u32, contents: Vec<u32>);
}

/// Groups the module's external collaborators for the duration of one `read_module` call,
/// mirroring the "language context" the decoder is handed by its embedder.
pub struct LanguageContext<'a> {
    pub linker: &'a mut dyn Linker,
    pub globals: &'a mut dyn GlobalsArray,
    pub table: &'a mut dyn TableController,
    pub memory: &'a mut dyn MemoryController,
}
