//! Prints the contents of an executable container and, when a HIP runtime
//! is present, loads it on device 0 and prints every entry point's launch
//! parameters.
//!
//! ```text
//! RUST_LOG=debug cargo run --example inspect_executable -- model.hipe
//! ```

use std::process::ExitCode;

use hip_hal::{
    DescriptorSetLayout, DynamicSymbols, ExecutableDef, ExecutableParams, HalConfig, HalResult,
    HsacoImage, NativeExecutable, PipelineLayout,
};

fn main() -> ExitCode {
    env_logger::init();

    let Some(path) = std::env::args().nth(1) else {
        eprintln!("usage: inspect_executable <executable.hipe>");
        return ExitCode::FAILURE;
    };
    let data = match std::fs::read(&path) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("failed to read {path}: {e}");
            return ExitCode::FAILURE;
        }
    };

    match inspect(&data) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{path}: {e} ({:?})", e.code());
            ExitCode::FAILURE
        }
    }
}

fn inspect(data: &[u8]) -> HalResult<()> {
    let def = ExecutableDef::parse(data)?;

    println!("=== Modules ({}) ===", def.modules.len());
    for (i, module) in def.modules.iter().enumerate() {
        let image = HsacoImage::parse(module.hsaco_image)?;
        println!(
            "  [{i}] {} bytes, target {}, code object {:?}",
            module.hsaco_image.len(),
            image.target(),
            image.code_object_version()
        );
    }

    println!("=== Exports ({}) ===", def.exports.len());
    for (i, export) in def.exports.iter().enumerate() {
        println!(
            "  [{i}] {} (module {}) block {:?}, {} bytes shared memory",
            export.kernel_name,
            export.module_ordinal,
            export.block_dims,
            export.block_shared_memory_size
        );
    }

    let symbols = match DynamicSymbols::shared() {
        Ok(symbols) => symbols,
        Err(e) => {
            println!("HIP runtime unavailable, skipping load: {e}");
            return Ok(());
        }
    };
    if symbols.device_count()? == 0 {
        println!("No HIP devices found, skipping load");
        return Ok(());
    }

    // Signatures are not recorded in the container; assume one storage
    // buffer per entry point and no push constants.
    let set = DescriptorSetLayout::storage_buffers(1)?;
    let layout = PipelineLayout::new(&[set], 0)?;
    let layouts = vec![layout; def.exports.len()];

    let executable = NativeExecutable::create(
        symbols,
        0,
        &ExecutableParams::hsaco(data, &layouts),
        &HalConfig::from_env(),
    )?;

    println!("=== Loaded on device {} ===", executable.device());
    for (i, info) in executable.kernel_infos().iter().enumerate() {
        let name = info
            .debug
            .as_ref()
            .map_or("<no trace info>", |d| d.function_name.as_str());
        println!(
            "  [{i}] {name}: function {:?}, block {:?}, {} bindings, {} constants, {} bytes shared memory",
            info.function,
            info.block_size,
            info.binding_count,
            info.constant_count,
            info.shared_memory_size
        );
    }
    Ok(())
}

