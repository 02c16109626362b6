//! Minimal stand-ins for the decoder's external collaborators, used only by this crate's
//! own integration tests. A real embedder would back these with an actual globals array,
//! runtime tables/memories, and a cross-module linker.

use wasm_decode::{
    DecodeError, DecodeResult, GlobalsArray, LanguageContext, Limits, Linker, MemoryController, Mutability,
    TableController, ValueType,
};

#[derive(Debug, Default)]
pub struct FakeGlobals {
    pub slots: Vec<i64>,
    next_address: u32,
}

impl GlobalsArray for FakeGlobals {
    fn allocate(&mut self) -> u32 {
        let address = self.next_address;
        self.next_address += 1;
        address
    }

    fn load_as_long(&self, address: u32) -> i64 {
        self.slots[address as usize]
    }

    fn store_long(&mut self, address: u32, value: i64) {
        let idx = address as usize;
        if idx >= self.slots.len() {
            self.slots.resize(idx + 1, 0);
        }
        self.slots[idx] = value;
    }
}

#[derive(Debug, Default)]
pub struct FakeTable {
    pub limits: Option<Limits>,
    pub functions: std::collections::HashMap<u32, u32>,
}

impl TableController for FakeTable {
    fn allocate(&mut self, limits: Limits) -> DecodeResult<()> {
        self.limits = Some(limits);
        Ok(())
    }

    fn set_function(&mut self, offset: u32, function_index: u32) -> DecodeResult<()> {
        self.functions.insert(offset, function_index);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FakeMemory {
    pub limits: Option<Limits>,
    pub bytes: Vec<u8>,
}

const PAGE_SIZE: usize = 65536;

impl MemoryController for FakeMemory {
    fn allocate(&mut self, limits: Limits) -> DecodeResult<()> {
        self.bytes = vec![0u8; limits.initial as usize * PAGE_SIZE];
        self.limits = Some(limits);
        Ok(())
    }

    fn validate_address(&self, base: u32, length: u32) -> DecodeResult<()> {
        let end = base as u64 + length as u64;
        if end > self.bytes.len() as u64 {
            return Err(DecodeError::malformed(format!(
                "data segment [{}, {}) overflows memory of {} byte(s)",
                base,
                end,
                self.bytes.len()
            )));
        }
        Ok(())
    }

    fn store_i32_8(&mut self, address: u32, byte: u8) -> DecodeResult<()> {
        self.bytes[address as usize] = byte;
        Ok(())
    }

    fn clear(&mut self) {
        for byte in self.bytes.iter_mut() {
            *byte = 0;
        }
    }
}

#[derive(Debug, Default)]
pub struct FakeLinker {
    pub imported_globals: Vec<(String, u32, String, String, ValueType, Mutability)>,
    pub deferred_elements: Vec<(String, u32, Vec<u32>)>,
}

impl Linker for FakeLinker {
    fn import_global(
        &mut self,
        importing_module: &str,
        global_index: u32,
        source_module: &str,
        source_member: &str,
        value_type: ValueType,
        mutability: Mutability,
    ) {
        self.imported_globals.push((
            importing_module.to_string(),
            global_index,
            source_module.to_string(),
            source_member.to_string(),
            value_type,
            mutability,
        ));
    }

    fn try_initialize_elements(&mut self, importing_module: &str, global_index: u32, contents: Vec<u32>) {
        self.deferred_elements.push((importing_module.to_string(), global_index, contents));
    }
}

#[derive(Default)]
pub struct Fakes {
    pub globals: FakeGlobals,
    pub table: FakeTable,
    pub memory: FakeMemory,
    pub linker: FakeLinker,
}

impl Fakes {
    pub fn context(&mut self) -> LanguageContext<'_> {
        LanguageContext {
            linker: &mut self.linker,
            globals: &mut self.globals,
            table: &mut self.table,
            memory: &mut self.memory,
        }
    }
}
