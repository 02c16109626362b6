//! The module: the root container handed back to the embedder once decoding succeeds.

use crate::context::LanguageContext;
use crate::decode;
use crate::error::DecodeResult;
use crate::reader::ByteReader;
use crate::symbol_table::SymbolTable;

/// A fully decoded WebAssembly module.
///
/// The original byte buffer is retained alongside the symbol table: `reset_global_state`
/// and `reset_memory_state` both need to re-scan it to restore initial values, since
/// nothing downstream of the decoder keeps a source-level representation of the
/// initializer and data expressions once they have been interpreted once.
#[derive(Debug)]
pub struct Module {
    name: String,
    bytes: Vec<u8>,
    symbol_table: SymbolTable,
}

impl Module {
    /// Decodes `bytes` into a fully populated module. On any error the half-built module is
    /// discarded; there is no partial result.
    pub fn read_module(name: impl Into<String>, bytes: Vec<u8>, ctx: &mut LanguageContext) -> DecodeResult<Module> {
        let name = name.into();
        let mut symbol_table = SymbolTable::new();

        let mut reader = ByteReader::new(&bytes);
        decode::read_preamble(&mut reader)?;
        decode::dispatch_sections(&mut reader, &name, &mut symbol_table, ctx)?;

        Ok(Module { name, bytes, symbol_table })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol_table(&self) -> &SymbolTable {
        &self.symbol_table
    }

    /// Mutable access to the symbol table, for the linker's resume hook: resolving an
    /// `ImportedUnresolved`/`UnresolvedGet` global (via `set_global_resolution`) and clearing
    /// its entry in `unresolved_global_backrefs` once that global's value has been written
    /// into the globals array. Everything else about the symbol table is meant to be read-only
    /// from outside this crate.
    pub fn symbol_table_mut(&mut self) -> &mut SymbolTable {
        &mut self.symbol_table
    }

    /// Re-derives every global's initial value from the original buffer and rewrites the
    /// globals array. Invoked by embedders that want to re-run a module from a clean state.
    pub fn reset_global_state(&self, ctx: &mut LanguageContext) -> DecodeResult<()> {
        decode::reset_global_state(&self.bytes, &self.symbol_table, ctx)
    }

    /// Zeroes the module's memory (if any) and replays the data section to restore it.
    pub fn reset_memory_state(&self, ctx: &mut LanguageContext) -> DecodeResult<()> {
        decode::reset_memory_state(&self.bytes, &self.symbol_table, ctx)
    }
}
