//! The seam between the executable loader and the HIP runtime.

use std::ffi::{c_int, c_void, CStr};
use std::fmt;

use crate::error::HalResult;

pub type HipDevice = c_int;

/// Loaded `hipModule_t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleHandle(*mut c_void);

/// Kernel `hipFunction_t`; valid while its module stays loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionHandle(*mut c_void);

// Safety: both are opaque driver handles. The HIP runtime accepts them from
// any thread and this crate never dereferences them.
unsafe impl Send for ModuleHandle {}
unsafe impl Sync for ModuleHandle {}
unsafe impl Send for FunctionHandle {}
unsafe impl Sync for FunctionHandle {}

impl ModuleHandle {
    pub fn from_raw(raw: *mut c_void) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> *mut c_void {
        self.0
    }

    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }
}

impl FunctionHandle {
    pub fn from_raw(raw: *mut c_void) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> *mut c_void {
        self.0
    }

    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }
}

/// Per-device launch limits checked at executable creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    pub max_block_dims: [u32; 3],
    pub max_block_shared_memory_size: u32,
}

/// Driver calls the executable loader needs.
///
/// [`DynamicSymbols`](super::DynamicSymbols) implements this over the real
/// HIP runtime; tests substitute their own.
pub trait HipDriver: Send + Sync + fmt::Debug {
    fn device_limits(&self, device: HipDevice) -> HalResult<DeviceLimits>;

    /// Loads a HSACO image onto `device` (`hipModuleLoadDataEx`).
    fn module_load_data(&self, device: HipDevice, image: &[u8]) -> HalResult<ModuleHandle>;

    /// Resolves a kernel by name (`hipModuleGetFunction`). A missing symbol is
    /// [`HalError::NotFound`](crate::HalError::NotFound).
    fn module_get_function(&self, module: ModuleHandle, name: &CStr) -> HalResult<FunctionHandle>;

    /// Raises the function's dynamic shared memory ceiling
    /// (`hipFuncAttributeMaxDynamicSharedMemorySize`).
    fn func_set_max_dynamic_shared_memory(
        &self,
        function: FunctionHandle,
        bytes: u32,
    ) -> HalResult<()>;

    fn module_unload(&self, module: ModuleHandle) -> HalResult<()>;
}
