//! End-to-end scenarios decoding literal module bytes, mirroring the boundary behaviors
//! and worked examples a faithful decoder is expected to satisfy.

mod support;

use assert_matches::assert_matches;
use support::Fakes;
use wasm_decode::{DecodeError, GlobalsArray, Module, Resolution};

const PREAMBLE: [u8; 8] = [0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00];

fn module_bytes(sections: &[&[u8]]) -> Vec<u8> {
    let mut bytes = PREAMBLE.to_vec();
    for section in sections {
        bytes.extend_from_slice(section);
    }
    bytes
}

#[test]
fn preamble_only_decodes_to_an_empty_module() -> anyhow::Result<()> {
    let mut fakes = Fakes::default();
    let module = Module::read_module("m", PREAMBLE.to_vec(), &mut fakes.context())?;

    let table = module.symbol_table();
    assert!(table.function_types.is_empty());
    assert!(table.functions.is_empty());
    assert!(!table.table_exists());
    assert_eq!(table.memory_count(), 0);
    assert!(table.globals.is_empty());
    assert!(table.exports.is_empty());
    assert!(table.start_function_index.is_none());
    Ok(())
}

#[test]
fn wrong_version_is_malformed() {
    let bytes = vec![0x00, 0x61, 0x73, 0x6D, 0x02, 0x00, 0x00, 0x00];
    let mut fakes = Fakes::default();
    let err = Module::read_module("m", bytes, &mut fakes.context()).unwrap_err();
    assert_matches!(err, DecodeError::Malformed(_));
}

#[test]
fn truncated_preamble_is_malformed() {
    let bytes = vec![0x00, 0x61, 0x73, 0x6D, 0x01, 0x00];
    let mut fakes = Fakes::default();
    let err = Module::read_module("m", bytes, &mut fakes.context()).unwrap_err();
    assert_matches!(err, DecodeError::Malformed(_));
}

#[test]
fn one_signature_with_no_params_and_no_results() -> anyhow::Result<()> {
    // type section: count=1, tag=0x60, 0 params, 0 results (empty-vector encoding)
    let bytes = module_bytes(&[&[0x01, 0x04, 0x01, 0x60, 0x00, 0x00]]);
    let mut fakes = Fakes::default();
    let module = Module::read_module("m", bytes, &mut fakes.context())?;

    let sig = &module.symbol_table().function_types[0];
    assert!(sig.params.is_empty());
    assert!(sig.results.is_empty());
    Ok(())
}

#[test]
fn result_vector_encodings_all_agree() {
    // 0x40 (void tag), 0x00 (empty vector), and 0x01 0x7F (single i32) must all decode to
    // the same empty-vs-one-result shape.
    let void_tag = module_bytes(&[&[0x01, 0x04, 0x01, 0x60, 0x00, 0x40]]);
    let empty_vec = module_bytes(&[&[0x01, 0x04, 0x01, 0x60, 0x00, 0x00]]);
    let single_i32 = module_bytes(&[&[0x01, 0x05, 0x01, 0x60, 0x00, 0x01, 0x7F]]);

    let mut fakes = Fakes::default();
    assert!(Module::read_module("m", void_tag, &mut fakes.context())
        .unwrap()
        .symbol_table()
        .function_types[0]
        .results
        .is_empty());

    let mut fakes = Fakes::default();
    assert!(Module::read_module("m", empty_vec, &mut fakes.context())
        .unwrap()
        .symbol_table()
        .function_types[0]
        .results
        .is_empty());

    let mut fakes = Fakes::default();
    let module = Module::read_module("m", single_i32, &mut fakes.context()).unwrap();
    assert_eq!(module.symbol_table().function_types[0].results.len(), 1);
}

#[test]
fn result_arity_above_one_is_rejected() {
    let bytes = module_bytes(&[&[0x01, 0x06, 0x01, 0x60, 0x00, 0x02, 0x7F, 0x7F]]);
    let mut fakes = Fakes::default();
    let err = Module::read_module("m", bytes, &mut fakes.context()).unwrap_err();
    assert_matches!(err, DecodeError::Malformed(_));
}

#[test]
fn declared_function_with_empty_body_has_zero_max_stack() -> anyhow::Result<()> {
    let type_section = [0x01u8, 0x05, 0x01, 0x60, 0x01, 0x7F, 0x00];
    let function_section = [0x03u8, 0x02, 0x01, 0x00];
    let code_section = [0x0Au8, 0x04, 0x01, 0x02, 0x00, 0x0B];
    let bytes = module_bytes(&[&type_section, &function_section, &code_section]);

    let mut fakes = Fakes::default();
    let module = Module::read_module("m", bytes, &mut fakes.context())?;
    let table = module.symbol_table();

    assert_eq!(table.functions.len(), 1);
    let code = table.functions[0].code.as_ref().unwrap();
    assert_eq!(code.max_stack_size, 0);
    assert_eq!(code.local_types, vec![0x7F]);
    assert!(code.body.children.is_empty());
    Ok(())
}

#[test]
fn i32_const_populates_long_pool_and_byte_length() {
    let type_section = [0x01u8, 0x05, 0x01, 0x60, 0x00, 0x01, 0x7F];
    let function_section = [0x03u8, 0x02, 0x01, 0x00];
    // locals=0, i32.const 7, end
    let code_section = [0x0Au8, 0x06, 0x01, 0x04, 0x00, 0x41, 0x07, 0x0B];
    let bytes = module_bytes(&[&type_section, &function_section, &code_section]);

    let mut fakes = Fakes::default();
    let module = Module::read_module("m", bytes, &mut fakes.context()).unwrap();
    let code = module.symbol_table().functions[0].code.as_ref().unwrap();

    assert_eq!(code.long_constants, vec![7]);
    assert_eq!(code.byte_constants, vec![1]);
    assert_eq!(code.max_stack_size, 1);
}

#[test]
fn max_stack_size_tracks_the_high_water_mark_not_the_final_depth() {
    let type_section = [0x01u8, 0x05, 0x01, 0x60, 0x00, 0x01, 0x7F];
    let function_section = [0x03u8, 0x02, 0x01, 0x00];
    // locals=0, i32.const 1, i32.const 2, i32.add, end
    let code_section = [0x0Au8, 0x09, 0x01, 0x07, 0x00, 0x41, 0x01, 0x41, 0x02, 0x6A, 0x0B];
    let bytes = module_bytes(&[&type_section, &function_section, &code_section]);

    let mut fakes = Fakes::default();
    let module = Module::read_module("m", bytes, &mut fakes.context()).unwrap();
    let code = module.symbol_table().functions[0].code.as_ref().unwrap();

    assert_eq!(code.long_constants, vec![1, 2]);
    assert_eq!(code.max_stack_size, 2);
}

#[test]
fn forward_call_resolves_against_the_index_space_not_decode_order() {
    let type_section = [0x01u8, 0x04, 0x01, 0x60, 0x00, 0x00];
    let function_section = [0x03u8, 0x03, 0x02, 0x00, 0x00];
    // fn0: locals=0, call 1, end -- fn1: locals=0, end
    let code_section = [0x0Au8, 0x09, 0x02, 0x04, 0x00, 0x10, 0x01, 0x0B, 0x02, 0x00, 0x0B];
    let bytes = module_bytes(&[&type_section, &function_section, &code_section]);

    let mut fakes = Fakes::default();
    let module = Module::read_module("m", bytes, &mut fakes.context()).unwrap();
    let code = module.symbol_table().functions[0].code.as_ref().unwrap();
    assert_eq!(code.body.calls.len(), 1);
}

#[test]
fn table_with_invalid_limits_prefix_is_malformed() {
    let table_section = [0x04u8, 0x03, 0x01, 0x70, 0x02];
    let bytes = module_bytes(&[&table_section]);
    let mut fakes = Fakes::default();
    let err = Module::read_module("m", bytes, &mut fakes.context()).unwrap_err();
    assert_matches!(err, DecodeError::Malformed(_));
}

#[test]
fn at_most_one_table_per_module() {
    let table_section = [0x04u8, 0x07, 0x02, 0x70, 0x00, 0x00, 0x70, 0x00, 0x00];
    let bytes = module_bytes(&[&table_section]);
    let mut fakes = Fakes::default();
    let err = Module::read_module("m", bytes, &mut fakes.context()).unwrap_err();
    assert_matches!(err, DecodeError::Malformed(_));
}

#[test]
fn at_most_one_memory_per_module() {
    let memory_section = [0x05u8, 0x04, 0x02, 0x00, 0x00, 0x00];
    let bytes = module_bytes(&[&memory_section]);
    let mut fakes = Fakes::default();
    let err = Module::read_module("m", bytes, &mut fakes.context()).unwrap_err();
    assert_matches!(err, DecodeError::Malformed(_));
}

#[test]
fn global_get_of_unresolved_import_is_left_pending() {
    // import section: global "env"."g": i32, const
    let import_section = [
        0x02u8, 0x0A, 0x01, 0x03, b'e', b'n', b'v', 0x01, b'g', 0x03, 0x7F, 0x00,
    ];
    // global section: i32 const global initialized by `global.get 0`
    let global_section = [0x06u8, 0x06, 0x01, 0x7F, 0x00, 0x23, 0x00, 0x0B];
    let bytes = module_bytes(&[&import_section, &global_section]);

    let mut fakes = Fakes::default();
    let module = Module::read_module("m", bytes, &mut fakes.context()).unwrap();
    let table = module.symbol_table();

    assert_eq!(table.globals.len(), 2);
    assert_eq!(table.global_resolution(1), Resolution::UnresolvedGet);
    let address = table.global_address(1);
    assert_eq!(table.unresolved_global_backrefs.get(&address), Some(&0));
    assert_eq!(fakes.globals.slots[address as usize], 0);
}

#[test]
fn global_get_must_reference_an_imported_global() {
    // global0: i32 const 5 (locally declared, not imported)
    // global1: i32 initialized by `global.get 0` -- illegal, 0 is not an import
    let global_section = [
        0x06u8, 0x0B, 0x02, 0x7F, 0x00, 0x41, 0x05, 0x0B, 0x7F, 0x00, 0x23, 0x00, 0x0B,
    ];
    let bytes = module_bytes(&[&global_section]);
    let mut fakes = Fakes::default();
    let err = Module::read_module("m", bytes, &mut fakes.context()).unwrap_err();
    assert_matches!(err, DecodeError::Malformed(_));
}

#[test]
fn section_size_mismatch_is_malformed() {
    // type section claims 5 bytes of payload but the decoder only consumes 4 of them.
    let bytes = module_bytes(&[&[0x01, 0x05, 0x01, 0x60, 0x00, 0x00]]);
    let mut fakes = Fakes::default();
    let err = Module::read_module("m", bytes, &mut fakes.context()).unwrap_err();
    assert_matches!(err, DecodeError::Malformed(_));
}

#[test]
fn br_table_targets_must_agree_on_return_arity() {
    // A value-returning block nested inside a void block; `br_table` targeting both
    // disagrees on return arity and must be rejected before the default label is even
    // read.
    let type_section = [0x01u8, 0x04, 0x01, 0x60, 0x00, 0x00];
    let function_section = [0x03u8, 0x02, 0x01, 0x00];
    // locals=0
    // block (result i32)   ;; depth 1, continuation arity 1
    //   block               ;; depth 0, continuation arity 0
    //     i32.const 0       ;; br_table selector
    //     br_table [0, 1] <default elided, error fires before it's read>
    let entry_body: &[u8] = &[
        0x00, // locals
        0x02, 0x7F, // outer block, result i32
        0x02, 0x40, // inner block, void
        0x41, 0x00, // i32.const 0 (selector)
        0x0E, 0x02, 0x00, 0x01, // br_table: 2 targets, label 0, label 1 (mismatch here)
    ];
    let mut code_section = vec![0x0Au8, (2 + entry_body.len()) as u8, 0x01, entry_body.len() as u8];
    code_section.extend_from_slice(entry_body);

    let bytes = module_bytes(&[&type_section, &function_section, &code_section]);
    let mut fakes = Fakes::default();
    let err = Module::read_module("m", bytes, &mut fakes.context()).unwrap_err();
    assert_matches!(err, DecodeError::Malformed(_));
}

#[test]
fn data_segment_with_global_get_offset_is_a_linker_error() {
    // data segment offset expression is `global.get`, which fails at decode before even
    // reading the index it would have referenced.
    let data_section = [0x0Bu8, 0x03, 0x01, 0x00, 0x23];
    let bytes = module_bytes(&[&data_section]);

    let mut fakes = Fakes::default();
    let err = Module::read_module("m", bytes, &mut fakes.context()).unwrap_err();
    assert_matches!(err, DecodeError::Linker(_));
}

#[test]
fn data_segment_writes_bytes_at_the_constant_offset() {
    let memory_section = [0x05u8, 0x03, 0x01, 0x00, 0x01];
    let data_section = [0x0Bu8, 0x08, 0x01, 0x00, 0x41, 0x02, 0x0B, 0x02, 0xAA, 0xBB];
    let bytes = module_bytes(&[&memory_section, &data_section]);

    let mut fakes = Fakes::default();
    let module = Module::read_module("m", bytes, &mut fakes.context()).unwrap();
    assert_eq!(fakes.memory.bytes[2], 0xAA);
    assert_eq!(fakes.memory.bytes[3], 0xBB);
    drop(module);
}

#[test]
fn element_segment_writes_function_indices_at_the_constant_offset() {
    let type_section = [0x01u8, 0x04, 0x01, 0x60, 0x00, 0x00];
    let table_section = [0x04u8, 0x04, 0x01, 0x70, 0x00, 0x00];
    let function_section = [0x03u8, 0x03, 0x02, 0x00, 0x00];
    let code_section = [0x0Au8, 0x07, 0x02, 0x02, 0x00, 0x0B, 0x02, 0x00, 0x0B];
    let element_section = [0x09u8, 0x08, 0x01, 0x00, 0x41, 0x00, 0x0B, 0x02, 0x00, 0x01];
    let bytes = module_bytes(&[
        &type_section,
        &table_section,
        &function_section,
        &element_section,
        &code_section,
    ]);

    let mut fakes = Fakes::default();
    let module = Module::read_module("m", bytes, &mut fakes.context()).unwrap();
    assert_eq!(fakes.table.functions.get(&0), Some(&0));
    assert_eq!(fakes.table.functions.get(&1), Some(&1));
    drop(module);
}

#[test]
fn export_of_a_nonexistent_table_is_rejected() {
    let export_section = [0x07u8, 0x05, 0x01, 0x01, b't', 0x01, 0x00];
    let bytes = module_bytes(&[&export_section]);
    let mut fakes = Fakes::default();
    let err = Module::read_module("m", bytes, &mut fakes.context()).unwrap_err();
    assert_matches!(err, DecodeError::Malformed(_));
}

#[test]
fn start_function_index_is_recorded() {
    let type_section = [0x01u8, 0x04, 0x01, 0x60, 0x00, 0x00];
    let function_section = [0x03u8, 0x02, 0x01, 0x00];
    let start_section = [0x08u8, 0x01, 0x00];
    let code_section = [0x0Au8, 0x04, 0x01, 0x02, 0x00, 0x0B];
    let bytes = module_bytes(&[&type_section, &function_section, &start_section, &code_section]);

    let mut fakes = Fakes::default();
    let module = Module::read_module("m", bytes, &mut fakes.context()).unwrap();
    assert_eq!(module.symbol_table().start_function_index, Some(0));
}

#[test]
fn custom_sections_are_skipped_wherever_they_appear() {
    let custom_section = [0x00u8, 0x04, b'x', b'x', b'x', b'x'];
    let type_section = [0x01u8, 0x04, 0x01, 0x60, 0x00, 0x00];
    let bytes = module_bytes(&[&custom_section, &type_section, &custom_section]);

    let mut fakes = Fakes::default();
    let module = Module::read_module("m", bytes, &mut fakes.context()).unwrap();
    assert_eq!(module.symbol_table().function_types.len(), 1);
}

#[test]
fn reset_global_state_restores_the_original_value_after_mutation() -> anyhow::Result<()> {
    let global_section = [0x06u8, 0x06, 0x01, 0x7F, 0x01, 0x41, 0x05, 0x0B];
    let bytes = module_bytes(&[&global_section]);

    let mut fakes = Fakes::default();
    let module = Module::read_module("m", bytes, &mut fakes.context())?;
    let address = module.symbol_table().global_address(0);
    assert_eq!(fakes.globals.slots[address as usize], 5);

    fakes.globals.slots[address as usize] = 999;
    module.reset_global_state(&mut fakes.context())?;
    assert_eq!(fakes.globals.slots[address as usize], 5);
    Ok(())
}

#[test]
fn reset_memory_state_zeroes_then_replays_data_segments() -> anyhow::Result<()> {
    let memory_section = [0x05u8, 0x03, 0x01, 0x00, 0x01];
    let data_section = [0x0Bu8, 0x08, 0x01, 0x00, 0x41, 0x00, 0x0B, 0x02, 0x11, 0x22];
    let bytes = module_bytes(&[&memory_section, &data_section]);

    let mut fakes = Fakes::default();
    let module = Module::read_module("m", bytes, &mut fakes.context())?;
    fakes.memory.bytes[0] = 0xFF;
    fakes.memory.bytes[5] = 0xFF;

    module.reset_memory_state(&mut fakes.context())?;
    assert_eq!(fakes.memory.bytes[0], 0x11);
    assert_eq!(fakes.memory.bytes[1], 0x22);
    assert_eq!(fakes.memory.bytes[5], 0x00);
    Ok(())
}

#[test]
fn global_addresses_are_coordinated_across_modules_sharing_one_context() -> anyhow::Result<()> {
    let global_section = [0x06u8, 0x06, 0x01, 0x7F, 0x01, 0x41, 0x05, 0x0B];
    let bytes = module_bytes(&[&global_section]);

    let mut fakes = Fakes::default();
    let first = Module::read_module("a", bytes.clone(), &mut fakes.context())?;
    let second = Module::read_module("b", bytes, &mut fakes.context())?;

    let first_address = first.symbol_table().global_address(0);
    let second_address = second.symbol_table().global_address(0);
    assert_ne!(first_address, second_address);
    assert_eq!(fakes.globals.slots[first_address as usize], 5);
    assert_eq!(fakes.globals.slots[second_address as usize], 5);
    Ok(())
}

#[test]
fn resuming_an_unresolved_global_via_symbol_table_mut_unblocks_reset() -> anyhow::Result<()> {
    // import section: global "env"."g": i32, const
    let import_section = [
        0x02u8, 0x0A, 0x01, 0x03, b'e', b'n', b'v', 0x01, b'g', 0x03, 0x7F, 0x00,
    ];
    // global section: i32 global initialized by `global.get 0`
    let global_section = [0x06u8, 0x06, 0x01, 0x7F, 0x00, 0x23, 0x00, 0x0B];
    let bytes = module_bytes(&[&import_section, &global_section]);

    let mut fakes = Fakes::default();
    let mut module = Module::read_module("m", bytes, &mut fakes.context())?;

    let source_index = 0;
    let waiting_index = 1;
    let waiting_address = module.symbol_table().global_address(waiting_index);
    let source_address = module.symbol_table().global_address(source_index);
    assert_eq!(
        module.symbol_table().unresolved_global_backrefs.get(&waiting_address),
        Some(&source_index)
    );

    // The linker resolves the import out of band and copies its value into the waiting global.
    fakes.globals.store_long(source_address, 42);
    let resolved_value = fakes.globals.load_as_long(source_address);
    fakes.globals.store_long(waiting_address, resolved_value);

    let table = module.symbol_table_mut();
    table.set_global_resolution(source_index, Resolution::ImportedResolved);
    table.set_global_resolution(waiting_index, Resolution::Resolved);
    table.unresolved_global_backrefs.remove(&waiting_address);

    module.reset_global_state(&mut fakes.context())?;
    assert_eq!(fakes.globals.slots[waiting_address as usize], 42);
    Ok(())
}
