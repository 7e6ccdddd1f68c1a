//! hip-hal: HSACO executable loading for a HIP hardware abstraction layer.
//!
//! This crate turns an executable container (one or more HSACO modules plus
//! an export table) into a loaded executable and answers per-entry-point
//! launch queries:
//! - **Dynamic HIP loading**: `libamdhip64` is opened at runtime, never linked
//! - **Validated inputs**: container structure, HSACO headers and device
//!   limits are checked before anything reaches the driver
//! - **Borrowed launch records**: a [`KernelInfo`] cannot outlive the
//!   executable that owns its function handle
//!
//! # Quick Start
//!
//! ```ignore
//! use hip_hal::{DynamicSymbols, ExecutableParams, HalConfig, NativeExecutable};
//!
//! let symbols = DynamicSymbols::shared()?;
//! let params = ExecutableParams::hsaco(&data, &layouts);
//! let executable = NativeExecutable::create(symbols, 0, &params, &HalConfig::from_env())?;
//! let info = executable.entry_point_kernel_info(0)?;
//! ```

pub mod config;
pub mod error;
pub mod executable_cache;
pub mod executable_def;
pub mod hip;
pub mod hsaco;
pub mod native_executable;
pub mod pipeline_layout;

pub use config::HalConfig;
pub use error::{HalError, HalResult, StatusCode};
pub use executable_cache::NopExecutableCache;
pub use executable_def::{ExecutableDef, ExportDebugInfo, ExportDef, FileLineLoc, ModuleDef, SourceFileDef};
pub use hip::{DeviceLimits, DynamicSymbols, FunctionHandle, HipDevice, HipDriver, ModuleHandle};
pub use hsaco::{GfxTarget, HsacoImage};
pub use native_executable::{
    entry_point_kernel_info, Executable, ExecutableParams, KernelDebugInfo, KernelInfo,
    NativeExecutable, EXECUTABLE_FORMAT_HSACO,
};
pub use pipeline_layout::{DescriptorKind, DescriptorSetLayout, DescriptorSetLayoutBinding, PipelineLayout};
