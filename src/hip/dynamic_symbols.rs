//! HIP runtime dynamic loading.
//!
//! The HIP runtime (`libamdhip64`) is opened at runtime with `libloading`, so
//! the crate builds and runs on machines without ROCm; loading then fails with
//! [`HalError::Unavailable`] instead of a link error.

use std::ffi::{c_char, c_int, c_uint, c_void, CStr};
use std::ptr;
use std::sync::{Arc, OnceLock};

use libloading::Library;

use super::driver::{DeviceLimits, FunctionHandle, HipDevice, HipDriver, ModuleHandle};
use crate::config::HalConfig;
use crate::error::{HalError, HalResult};

pub type HipError = c_int;

pub const HIP_SUCCESS: HipError = 0;
pub const HIP_ERROR_OUT_OF_MEMORY: HipError = 2;
pub const HIP_ERROR_NOT_FOUND: HipError = 500;

// hipDeviceAttribute_t
const HIP_DEVICE_ATTRIBUTE_MAX_BLOCK_DIM_X: c_int = 26;
const HIP_DEVICE_ATTRIBUTE_MAX_BLOCK_DIM_Y: c_int = 27;
const HIP_DEVICE_ATTRIBUTE_MAX_BLOCK_DIM_Z: c_int = 28;
const HIP_DEVICE_ATTRIBUTE_MAX_SHARED_MEMORY_PER_BLOCK: c_int = 74;

// hipFuncAttribute
const HIP_FUNC_ATTRIBUTE_MAX_DYNAMIC_SHARED_MEMORY_SIZE: c_int = 8;

type HipInitFn = unsafe extern "C" fn(c_uint) -> HipError;
type HipSetDeviceFn = unsafe extern "C" fn(c_int) -> HipError;
type HipGetDeviceCountFn = unsafe extern "C" fn(*mut c_int) -> HipError;
type HipDeviceGetAttributeFn = unsafe extern "C" fn(*mut c_int, c_int, c_int) -> HipError;

type HipModuleLoadDataExFn = unsafe extern "C" fn(
    *mut *mut c_void,
    *const c_void,
    c_uint,
    *mut c_int,
    *mut *mut c_void,
) -> HipError;
type HipModuleGetFunctionFn =
    unsafe extern "C" fn(*mut *mut c_void, *mut c_void, *const c_char) -> HipError;
type HipModuleUnloadFn = unsafe extern "C" fn(*mut c_void) -> HipError;
type HipFuncSetAttributeFn = unsafe extern "C" fn(*const c_void, c_int, c_int) -> HipError;

type HipGetErrorNameFn = unsafe extern "C" fn(HipError) -> *const c_char;
type HipGetErrorStringFn = unsafe extern "C" fn(HipError) -> *const c_char;

/// HIP runtime function table.
pub struct DynamicSymbols {
    #[allow(dead_code)]
    lib: Library,

    // Device management
    pub hip_init: HipInitFn,
    pub hip_set_device: HipSetDeviceFn,
    pub hip_get_device_count: HipGetDeviceCountFn,
    pub hip_device_get_attribute: HipDeviceGetAttributeFn,

    // Module management
    pub hip_module_load_data_ex: HipModuleLoadDataExFn,
    pub hip_module_get_function: HipModuleGetFunctionFn,
    pub hip_module_unload: HipModuleUnloadFn,
    pub hip_func_set_attribute: HipFuncSetAttributeFn,

    // Errors
    pub hip_get_error_name: HipGetErrorNameFn,
    pub hip_get_error_string: HipGetErrorStringFn,
}

// Safety: DynamicSymbols holds function pointers resolved from a library it
// owns. They are immutable after loading and the HIP runtime is thread-safe.
unsafe impl Send for DynamicSymbols {}
unsafe impl Sync for DynamicSymbols {}

impl std::fmt::Debug for DynamicSymbols {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicSymbols").finish_non_exhaustive()
    }
}

/// Resolves `name` (NUL-terminated) from `lib`.
///
/// # Safety
/// `T` must match the C signature of the symbol.
unsafe fn symbol<T: Copy>(lib: &Library, name: &'static [u8]) -> HalResult<T> {
    lib.get::<T>(name).map(|s| *s).map_err(|e| {
        let printable = String::from_utf8_lossy(&name[..name.len().saturating_sub(1)]);
        HalError::Unavailable(format!("{printable}: {e}"))
    })
}

impl DynamicSymbols {
    /// Opens the HIP runtime and calls `hipInit(0)`.
    pub fn load(config: &HalConfig) -> HalResult<Self> {
        let candidates = config.library_candidates();
        let lib = candidates
            .iter()
            .find_map(|name| {
                // Safety: loading libamdhip64 runs its initialisers only.
                match unsafe { Library::new(name) } {
                    Ok(lib) => {
                        log::debug!("Loaded HIP runtime from {}", name.display());
                        Some(lib)
                    }
                    Err(e) => {
                        log::trace!("HIP runtime not at {}: {e}", name.display());
                        None
                    }
                }
            })
            .ok_or_else(|| {
                HalError::Unavailable(format!(
                    "failed to load HIP runtime (libamdhip64); tried {} locations",
                    candidates.len()
                ))
            })?;

        // Resolve every pointer while `lib` is borrowed, then move it in.
        let symbols = unsafe {
            Self {
                hip_init: symbol(&lib, b"hipInit\0")?,
                hip_set_device: symbol(&lib, b"hipSetDevice\0")?,
                hip_get_device_count: symbol(&lib, b"hipGetDeviceCount\0")?,
                hip_device_get_attribute: symbol(&lib, b"hipDeviceGetAttribute\0")?,
                hip_module_load_data_ex: symbol(&lib, b"hipModuleLoadDataEx\0")?,
                hip_module_get_function: symbol(&lib, b"hipModuleGetFunction\0")?,
                hip_module_unload: symbol(&lib, b"hipModuleUnload\0")?,
                hip_func_set_attribute: symbol(&lib, b"hipFuncSetAttribute\0")?,
                hip_get_error_name: symbol(&lib, b"hipGetErrorName\0")?,
                hip_get_error_string: symbol(&lib, b"hipGetErrorString\0")?,
                lib,
            }
        };

        let status = unsafe { (symbols.hip_init)(0) };
        symbols.check("hipInit", status)?;
        Ok(symbols)
    }

    /// Process-wide instance configured from the environment.
    pub fn shared() -> HalResult<Arc<Self>> {
        static SHARED: OnceLock<Result<Arc<DynamicSymbols>, String>> = OnceLock::new();
        SHARED
            .get_or_init(|| {
                Self::load(&HalConfig::from_env())
                    .map(Arc::new)
                    .map_err(|e| e.to_string())
            })
            .clone()
            .map_err(HalError::Unavailable)
    }

    pub fn is_available() -> bool {
        Self::shared().is_ok()
    }

    pub fn device_count(&self) -> HalResult<usize> {
        let mut count: c_int = 0;
        let status = unsafe { (self.hip_get_device_count)(&mut count) };
        self.check("hipGetDeviceCount", status)?;
        Ok(count.max(0) as usize)
    }

    pub fn error_name(&self, error: HipError) -> String {
        unsafe { c_string_or((self.hip_get_error_name)(error), "hipErrorUnknown") }
    }

    pub fn error_string(&self, error: HipError) -> String {
        unsafe { c_string_or((self.hip_get_error_string)(error), "unknown error") }
    }

    /// Converts a HIP status into a [`HalError`].
    pub fn check(&self, call: &'static str, status: HipError) -> HalResult<()> {
        status_to_result(call, status, || {
            (self.error_name(status), self.error_string(status))
        })
    }

    fn attribute(&self, device: HipDevice, attribute: c_int, what: &str) -> HalResult<u32> {
        let mut value: c_int = 0;
        let status = unsafe { (self.hip_device_get_attribute)(&mut value, attribute, device) };
        self.check("hipDeviceGetAttribute", status)
            .map_err(|e| e.annotate(format_args!("querying {what} of device {device}")))?;
        Ok(value.max(0) as u32)
    }
}

/// Classifies `status`. `describe` yields the error's name and message and
/// is only called on failure.
pub fn status_to_result(
    call: &'static str,
    status: HipError,
    describe: impl FnOnce() -> (String, String),
) -> HalResult<()> {
    if status == HIP_SUCCESS {
        return Ok(());
    }
    let (name, message) = describe();
    Err(match status {
        HIP_ERROR_OUT_OF_MEMORY => HalError::ResourceExhausted(format!("{call}: {message}")),
        HIP_ERROR_NOT_FOUND => HalError::NotFound(format!("{call}: {message}")),
        _ => HalError::Driver {
            call,
            code: status,
            name,
            message,
        },
    })
}

fn loaded_module(raw: *mut c_void) -> HalResult<ModuleHandle> {
    if raw.is_null() {
        return Err(HalError::Internal(
            "hipModuleLoadDataEx succeeded but returned no module".to_string(),
        ));
    }
    Ok(ModuleHandle::from_raw(raw))
}

unsafe fn c_string_or(ptr: *const c_char, fallback: &str) -> String {
    if ptr.is_null() {
        fallback.to_string()
    } else {
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

impl HipDriver for DynamicSymbols {
    fn device_limits(&self, device: HipDevice) -> HalResult<DeviceLimits> {
        Ok(DeviceLimits {
            max_block_dims: [
                self.attribute(device, HIP_DEVICE_ATTRIBUTE_MAX_BLOCK_DIM_X, "max block dim x")?,
                self.attribute(device, HIP_DEVICE_ATTRIBUTE_MAX_BLOCK_DIM_Y, "max block dim y")?,
                self.attribute(device, HIP_DEVICE_ATTRIBUTE_MAX_BLOCK_DIM_Z, "max block dim z")?,
            ],
            max_block_shared_memory_size: self.attribute(
                device,
                HIP_DEVICE_ATTRIBUTE_MAX_SHARED_MEMORY_PER_BLOCK,
                "max shared memory per block",
            )?,
        })
    }

    fn module_load_data(&self, device: HipDevice, image: &[u8]) -> HalResult<ModuleHandle> {
        let status = unsafe { (self.hip_set_device)(device) };
        self.check("hipSetDevice", status)?;

        let mut module: *mut c_void = ptr::null_mut();
        let status = unsafe {
            (self.hip_module_load_data_ex)(
                &mut module,
                image.as_ptr() as *const c_void,
                0,
                ptr::null_mut(),
                ptr::null_mut(),
            )
        };
        self.check("hipModuleLoadDataEx", status)?;
        loaded_module(module)
    }

    fn module_get_function(&self, module: ModuleHandle, name: &CStr) -> HalResult<FunctionHandle> {
        let mut function: *mut c_void = ptr::null_mut();
        let status =
            unsafe { (self.hip_module_get_function)(&mut function, module.as_raw(), name.as_ptr()) };
        self.check("hipModuleGetFunction", status)?;
        if function.is_null() {
            return Err(HalError::NotFound(format!(
                "hipModuleGetFunction returned no function for {name:?}"
            )));
        }
        Ok(FunctionHandle::from_raw(function))
    }

    fn func_set_max_dynamic_shared_memory(
        &self,
        function: FunctionHandle,
        bytes: u32,
    ) -> HalResult<()> {
        let value = c_int::try_from(bytes).map_err(|_| {
            HalError::InvalidArgument(format!("shared memory size {bytes} does not fit a C int"))
        })?;
        let status = unsafe {
            (self.hip_func_set_attribute)(
                function.as_raw() as *const c_void,
                HIP_FUNC_ATTRIBUTE_MAX_DYNAMIC_SHARED_MEMORY_SIZE,
                value,
            )
        };
        self.check("hipFuncSetAttribute", status)
    }

    fn module_unload(&self, module: ModuleHandle) -> HalResult<()> {
        let status = unsafe { (self.hip_module_unload)(module.as_raw()) };
        self.check("hipModuleUnload", status)
    }
}
