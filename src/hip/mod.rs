//! HIP runtime access.
//!
//! [`HipDriver`] is what the executable loader talks to;
//! [`DynamicSymbols`] implements it over a dynamically loaded
//! `libamdhip64`.

pub mod driver;
pub mod dynamic_symbols;

pub use driver::{DeviceLimits, FunctionHandle, HipDevice, HipDriver, ModuleHandle};
pub use dynamic_symbols::{DynamicSymbols, HipError};
