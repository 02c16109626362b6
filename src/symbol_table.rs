//! The symbol table: the decoder's single output data structure, aside from the per-function
//! execution-node trees hung off each [`FunctionRecord`].

use std::collections::HashMap;

use crate::context::GlobalsArray;
use crate::error::{DecodeError, DecodeResult};
use crate::exec::CodeEntry;
use crate::types::{ElementType, ExternalKind, Mutability, ValueType};

/// A function signature: parameter types followed by result types (at most one result in
/// this module version).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSignature {
    pub params: Vec<ValueType>,
    pub results: Vec<ValueType>,
}

impl FunctionSignature {
    pub fn return_type(&self) -> Option<ValueType> {
        self.results.first().copied()
    }
}

#[derive(Debug)]
pub struct FunctionRecord {
    pub type_index: u32,
    pub code: Option<CodeEntry>,
    pub is_imported: bool,
    pub module_name: Option<String>,
    pub member_name: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct TableRecord {
    pub element_type: ElementType,
    pub initial_size: u32,
    pub max_size: Option<u32>,
    pub is_imported: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct MemoryRecord {
    pub initial_pages: u32,
    pub max_pages: Option<u32>,
    pub is_imported: bool,
}

/// Lifecycle tag for a declared global, per the two-phase initialization protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Initialized by a numeric const instruction, or by a `global.get` of an already
    /// resolved imported global whose value has been copied in.
    Declared,
    /// An imported global whose source has not been resolved by the linker yet.
    ImportedUnresolved,
    /// An imported global whose source has been resolved by the linker.
    ImportedResolved,
    /// Initialized by `global.get` of an imported global that was not yet resolved at
    /// decode time; `unresolved_global_backrefs` records what it is waiting on.
    UnresolvedGet,
    /// Fully resolved: either declared outright, or an import/`global.get` chain that has
    /// since been completed by the linker.
    Resolved,
}

#[derive(Debug, Clone, Copy)]
pub struct GlobalRecord {
    pub value_type: ValueType,
    pub mutability: Mutability,
    pub resolution: Resolution,
    pub address: u32,
    pub is_imported: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct Export {
    pub kind: ExternalKind,
    pub index: u32,
}

#[derive(Debug, Default)]
pub struct SymbolTable {
    pub function_types: Vec<FunctionSignature>,
    pub functions: Vec<FunctionRecord>,
    pub tables: Option<TableRecord>,
    pub memories: Option<MemoryRecord>,
    pub globals: Vec<GlobalRecord>,
    pub exports: HashMap<String, Export>,
    pub start_function_index: Option<u32>,
    /// Maps a global index initialized by an unresolved `global.get` to the index of the
    /// imported global it is waiting on.
    pub unresolved_global_backrefs: HashMap<u32, u32>,
}

impl SymbolTable {
    pub fn new() -> SymbolTable {
        SymbolTable::default()
    }

    // -- types --------------------------------------------------------------------

    pub fn allocate_function_type(&mut self, params_len: u32, result_len: u32) -> u32 {
        let index = self.function_types.len() as u32;
        self.function_types.push(FunctionSignature {
            params: vec![ValueType::I32; params_len as usize],
            results: vec![ValueType::I32; result_len as usize],
        });
        index
    }

    pub fn register_function_type_parameter_type(&mut self, type_index: u32, param_index: u32, ty: ValueType) {
        self.function_types[type_index as usize].params[param_index as usize] = ty;
    }

    pub fn register_function_type_return_type(&mut self, type_index: u32, result_index: u32, ty: ValueType) {
        self.function_types[type_index as usize].results[result_index as usize] = ty;
    }

    pub fn function_type_argument_count(&self, type_index: u32) -> u32 {
        self.function_types[type_index as usize].params.len() as u32
    }

    pub fn function_type_return_type_length(&self, type_index: u32) -> u32 {
        self.function_types[type_index as usize].results.len() as u32
    }

    // -- functions ------------------------------------------------------------------

    pub fn import_function(&mut self, module_name: impl Into<String>, member_name: impl Into<String>, type_index: u32) -> u32 {
        let index = self.functions.len() as u32;
        self.functions.push(FunctionRecord {
            type_index,
            code: None,
            is_imported: true,
            module_name: Some(module_name.into()),
            member_name: Some(member_name.into()),
        });
        index
    }

    pub fn declare_function(&mut self, type_index: u32) -> u32 {
        let index = self.functions.len() as u32;
        self.functions.push(FunctionRecord {
            type_index,
            code: None,
            is_imported: false,
            module_name: None,
            member_name: None,
        });
        index
    }

    pub fn function(&self, index: u32) -> &FunctionRecord {
        &self.functions[index as usize]
    }

    pub fn set_function_code(&mut self, index: u32, code: CodeEntry) {
        self.functions[index as usize].code = Some(code);
    }

    pub fn imported_function_count(&self) -> u32 {
        self.functions.iter().take_while(|f| f.is_imported).count() as u32
    }

    // -- tables / memories ------------------------------------------------------------

    pub fn import_table(&mut self, initial: u32, maximum: Option<u32>) -> DecodeResult<()> {
        if self.tables.is_some() {
            return Err(DecodeError::malformed("at most one table per module"));
        }
        self.tables = Some(TableRecord {
            element_type: ElementType::FuncRef,
            initial_size: initial,
            max_size: maximum,
            is_imported: true,
        });
        Ok(())
    }

    pub fn allocate_table(&mut self, initial: u32, maximum: Option<u32>) -> DecodeResult<()> {
        if self.tables.is_some() {
            return Err(DecodeError::malformed("at most one table per module"));
        }
        self.tables = Some(TableRecord {
            element_type: ElementType::FuncRef,
            initial_size: initial,
            max_size: maximum,
            is_imported: false,
        });
        Ok(())
    }

    pub fn table_exists(&self) -> bool {
        self.tables.is_some()
    }

    pub fn table_count(&self) -> u32 {
        self.tables.is_some() as u32
    }

    pub fn import_memory(&mut self, initial: u32, maximum: Option<u32>) -> DecodeResult<()> {
        if self.memories.is_some() {
            return Err(DecodeError::malformed("at most one memory per module"));
        }
        self.memories = Some(MemoryRecord {
            initial_pages: initial,
            max_pages: maximum,
            is_imported: true,
        });
        Ok(())
    }

    pub fn allocate_memory(&mut self, initial: u32, maximum: Option<u32>) -> DecodeResult<()> {
        if self.memories.is_some() {
            return Err(DecodeError::malformed("at most one memory per module"));
        }
        self.memories = Some(MemoryRecord {
            initial_pages: initial,
            max_pages: maximum,
            is_imported: false,
        });
        Ok(())
    }

    pub fn memory_count(&self) -> u32 {
        self.memories.is_some() as u32
    }

    pub fn memory(&self) -> Option<&MemoryRecord> {
        self.memories.as_ref()
    }

    // -- globals ----------------------------------------------------------------------

    /// Declares a global and allocates its address from `globals`, the process-wide globals
    /// array shared with whatever other modules the embedder has linked against it. Addresses
    /// are never reused, even across modules: this is what lets two modules sharing one
    /// `GlobalsArray` coexist without one module's globals stomping another's.
    pub fn declare_global(
        &mut self,
        globals: &mut dyn GlobalsArray,
        value_type: ValueType,
        mutability: Mutability,
        resolution: Resolution,
        is_imported: bool,
    ) -> u32 {
        let address = globals.allocate();
        self.globals.push(GlobalRecord {
            value_type,
            mutability,
            resolution,
            address,
            is_imported,
        });
        address
    }

    pub fn global_mutability(&self, index: u32) -> Mutability {
        self.globals[index as usize].mutability
    }

    pub fn global_value_type(&self, index: u32) -> ValueType {
        self.globals[index as usize].value_type
    }

    pub fn global_is_imported(&self, index: u32) -> bool {
        self.globals[index as usize].is_imported
    }

    pub fn global_address(&self, index: u32) -> u32 {
        self.globals[index as usize].address
    }

    pub fn global_resolution(&self, index: u32) -> Resolution {
        self.globals[index as usize].resolution
    }

    /// Called by the linker's resume hook once a global it was waiting on resolves. Reached
    /// through [`crate::module::Module::symbol_table_mut`]; callers are also responsible for
    /// removing the corresponding entry from `unresolved_global_backrefs` once they've copied
    /// the resolved value into the globals array.
    pub fn set_global_resolution(&mut self, index: u32, resolution: Resolution) {
        self.globals[index as usize].resolution = resolution;
    }

    /// Number of globals declared so far; grows strictly monotonically.
    pub fn max_global_index(&self) -> u32 {
        self.globals.len() as u32
    }

    // -- exports / start ---------------------------------------------------------------

    pub fn export_function(&mut self, name: String, index: u32) {
        self.exports.insert(name, Export { kind: ExternalKind::Function, index });
    }

    pub fn export_table(&mut self, name: String) {
        self.exports.insert(name, Export { kind: ExternalKind::Table, index: 0 });
    }

    pub fn export_global(&mut self, name: String, index: u32) {
        self.exports.insert(name, Export { kind: ExternalKind::Global, index });
    }

    pub fn set_start_function(&mut self, index: u32) {
        self.start_function_index = Some(index);
    }
}
