//! Property-based tests for container parsing and entry point queries.
//!
//! - Arbitrary bytes never panic the parser
//! - Every in-range query of a valid executable yields a positive block size
//! - Every out-of-range query fails

mod common;

use proptest::prelude::*;

use common::{encode, layouts, MockDriver};
use hip_hal::executable_def::{ExecutableDef, ExportDebugInfo, ExportDef};
use hip_hal::{ExecutableParams, HalConfig, NativeExecutable, StatusCode};

#[derive(Debug, Clone)]
struct ExportSpec {
    name: String,
    block_dims: [u32; 3],
    shared_memory: u32,
}

fn arb_export() -> impl Strategy<Value = ExportSpec> {
    (
        "[a-z][a-z0-9_]{0,24}",
        [1u32..=1024, 1u32..=1024, 1u32..=64],
        0u32..=65536,
    )
        .prop_map(|(name, block_dims, shared_memory)| ExportSpec {
            name,
            block_dims,
            shared_memory,
        })
}

fn to_defs(specs: &[ExportSpec], module_count: usize) -> Vec<ExportDef<'_>> {
    specs
        .iter()
        .enumerate()
        .map(|(i, spec)| ExportDef {
            module_ordinal: (i % module_count) as u32,
            kernel_name: &spec.name,
            block_dims: spec.block_dims,
            block_shared_memory_size: spec.shared_memory,
            debug_info: ExportDebugInfo::default(),
        })
        .collect()
}

proptest! {
    #![proptest_config(proptest::prelude::ProptestConfig::with_cases(256))]

    #[test]
    fn prop_parse_never_panics(data in proptest::collection::vec(proptest::num::u8::ANY, 0..512)) {
        let _ = ExecutableDef::parse(&data);
    }

    #[test]
    fn prop_parse_never_panics_on_corrupted_container(
        flips in proptest::collection::vec((0usize..4096, proptest::num::u8::ANY), 1..8),
    ) {
        let specs = [ExportSpec { name: "kernel".into(), block_dims: [64, 1, 1], shared_memory: 0 }];
        let mut data = encode(2, &to_defs(&specs, 2));
        for (at, byte) in flips {
            let at = at % data.len();
            data[at] = byte;
        }
        let _ = ExecutableDef::parse(&data);
    }

    #[test]
    fn prop_queries_on_valid_executables(
        specs in proptest::collection::vec(arb_export(), 1..12),
        module_count in 1usize..4,
        probe in proptest::num::i32::ANY,
    ) {
        let driver = MockDriver::new();
        let data = encode(module_count, &to_defs(&specs, module_count));
        let layouts = layouts(specs.len(), 4, 8);
        let executable = NativeExecutable::create(
            driver.clone(),
            0,
            &ExecutableParams::hsaco(&data, &layouts),
            &HalConfig::default(),
        )
        .unwrap();

        for (i, spec) in specs.iter().enumerate() {
            let info = executable.entry_point_kernel_info(i as i32).unwrap();
            prop_assert!(info.block_size.iter().all(|&d| d > 0));
            prop_assert_eq!(info.block_size, spec.block_dims);
            prop_assert_eq!(info.shared_memory_size, spec.shared_memory);
            prop_assert_eq!(info.binding_count, 4);
            prop_assert_eq!(info.constant_count, 8);
        }

        let in_range = probe >= 0 && (probe as usize) < specs.len();
        match executable.entry_point_kernel_info(probe) {
            Ok(_) => prop_assert!(in_range),
            Err(e) => {
                prop_assert!(!in_range);
                prop_assert_eq!(e.code(), StatusCode::OutOfRange);
            }
        }

        drop(executable);
        prop_assert_eq!(driver.loaded_count(), 0);
    }
}
