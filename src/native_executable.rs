//! HSACO executable loading and per-entry-point launch metadata.
//!
//! An executable container holds one or more HSACO modules and a list of
//! exports. Creation loads every module through the [`HipDriver`], resolves
//! each export to a kernel function and records what a launch needs in a
//! [`KernelInfo`]. Records are immutable afterwards and borrowed from the
//! executable, so a function handle can never outlive its module.

use std::any::Any;
use std::ffi::CString;
use std::fmt;
use std::sync::Arc;

use crate::config::HalConfig;
use crate::error::{try_with_capacity, HalError, HalResult};
use crate::executable_def::{ExecutableDef, ExportDef};
use crate::hip::{DeviceLimits, FunctionHandle, HipDevice, HipDriver, ModuleHandle};
use crate::pipeline_layout::PipelineLayout;

/// The only executable format this backend prepares.
pub const EXECUTABLE_FORMAT_HSACO: &str = "HSACO";

/// What the caller hands to executable creation.
#[derive(Debug, Clone, Copy)]
pub struct ExecutableParams<'a> {
    pub executable_format: &'a str,
    pub executable_data: &'a [u8],
    /// One layout per export, in export order.
    pub pipeline_layouts: &'a [Arc<PipelineLayout>],
}

impl<'a> ExecutableParams<'a> {
    pub fn hsaco(data: &'a [u8], pipeline_layouts: &'a [Arc<PipelineLayout>]) -> Self {
        Self {
            executable_format: EXECUTABLE_FORMAT_HSACO,
            executable_data: data,
            pipeline_layouts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelDebugInfo {
    pub function_name: String,
    pub source_filename: Option<String>,
    pub source_line: u32,
}

/// Launch parameters of one entry point.
#[derive(Debug, Clone)]
pub struct KernelInfo {
    pub layout: Arc<PipelineLayout>,
    pub function: FunctionHandle,
    pub constant_count: u32,
    pub binding_count: u32,
    pub block_size: [u32; 3],
    pub shared_memory_size: u32,
    /// `None` unless trace info was enabled when the executable was created.
    pub debug: Option<KernelDebugInfo>,
}

/// Type-erased executable as handed out by an executable cache.
pub trait Executable: Any + Send + Sync + fmt::Debug {
    fn entry_point_count(&self) -> usize;
    fn as_any(&self) -> &dyn Any;
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SourceFile {
    path: String,
    content: Vec<u8>,
}

pub struct NativeExecutable {
    driver: Arc<dyn HipDriver>,
    device: HipDevice,
    modules: Vec<ModuleHandle>,
    kernels: Vec<KernelInfo>,
    source_files: Vec<SourceFile>,
}

impl NativeExecutable {
    /// Creates an executable from a HSACO container.
    ///
    /// Nothing is returned unless every module loaded and every export
    /// resolved; modules loaded before a failure are unloaded again.
    pub fn create(
        driver: Arc<dyn HipDriver>,
        device: HipDevice,
        params: &ExecutableParams<'_>,
        config: &HalConfig,
    ) -> HalResult<Self> {
        if params.executable_data.is_empty() {
            return Err(HalError::InvalidArgument(
                "no executable data provided".to_string(),
            ));
        }
        let def = ExecutableDef::parse(params.executable_data)?;

        let export_count = def.exports.len();
        if params.pipeline_layouts.len() != export_count {
            return Err(HalError::InvalidArgument(format!(
                "executable provides {export_count} entry points but caller provided {} pipeline layouts; must match",
                params.pipeline_layouts.len()
            )));
        }

        let limits = driver.device_limits(device)?;
        check_device_limits(&def, &limits)?;

        let mut executable = Self {
            driver,
            device,
            modules: try_with_capacity(def.modules.len())?,
            kernels: try_with_capacity(export_count)?,
            source_files: Vec::new(),
        };

        for (i, module) in def.modules.iter().enumerate() {
            let handle = executable
                .driver
                .module_load_data(device, module.hsaco_image)
                .map_err(|e| {
                    e.annotate(format_args!(
                        "loading HSACO module {i} (mismatched target chip or corrupt image?)"
                    ))
                })?;
            executable.modules.push(handle);
        }

        for (ordinal, (export, layout)) in def.exports.iter().zip(params.pipeline_layouts).enumerate() {
            let info = executable.resolve_export(ordinal, export, layout, config.debug_info)?;
            executable.kernels.push(info);
        }

        if config.debug_info {
            executable.source_files = try_with_capacity(def.source_files.len())?;
            for source in &def.source_files {
                executable.source_files.push(SourceFile {
                    path: source.path.to_string(),
                    content: copy_bytes(source.content)?,
                });
            }
        }

        log::debug!(
            "Created HIP executable on device {device}: {} module(s), {} entry point(s)",
            executable.modules.len(),
            executable.kernels.len()
        );
        Ok(executable)
    }

    fn resolve_export(
        &self,
        ordinal: usize,
        export: &ExportDef<'_>,
        layout: &Arc<PipelineLayout>,
        debug_info: bool,
    ) -> HalResult<KernelInfo> {
        let module = self.modules[export.module_ordinal as usize];
        let name = CString::new(export.kernel_name).map_err(|_| {
            HalError::InvalidArgument(format!("export {ordinal} kernel name contains a NUL byte"))
        })?;

        let function = self.driver.module_get_function(module, &name).map_err(|e| {
            e.annotate(format_args!(
                "export {ordinal} function '{}' not found in module {}",
                export.kernel_name, export.module_ordinal
            ))
        })?;

        if export.block_shared_memory_size > 0 {
            self.driver
                .func_set_max_dynamic_shared_memory(function, export.block_shared_memory_size)
                .map_err(|e| {
                    e.annotate(format_args!(
                        "setting {} bytes of dynamic shared memory for '{}'",
                        export.block_shared_memory_size, export.kernel_name
                    ))
                })?;
        }

        let debug = debug_info.then(|| {
            let location = export.debug_info.location;
            KernelDebugInfo {
                function_name: export
                    .debug_info
                    .name
                    .unwrap_or(export.kernel_name)
                    .to_string(),
                source_filename: location.map(|l| l.filename.to_string()),
                source_line: location.map_or(0, |l| l.line),
            }
        });

        log::trace!(
            "Entry point {ordinal}: '{}' block {:?}, {} bytes shared memory",
            export.kernel_name,
            export.block_dims,
            export.block_shared_memory_size
        );

        Ok(KernelInfo {
            layout: Arc::clone(layout),
            function,
            constant_count: layout.constant_count(),
            binding_count: layout.total_binding_count(),
            block_size: export.block_dims,
            shared_memory_size: export.block_shared_memory_size,
            debug,
        })
    }

    /// Launch parameters for `entry_point`.
    pub fn entry_point_kernel_info(&self, entry_point: i32) -> HalResult<&KernelInfo> {
        usize::try_from(entry_point)
            .ok()
            .and_then(|i| self.kernels.get(i))
            .ok_or_else(|| {
                HalError::OutOfRange(format!(
                    "entry point ordinal {entry_point} out of range; executable contains {} entry points",
                    self.kernels.len()
                ))
            })
    }

    pub fn kernel_infos(&self) -> &[KernelInfo] {
        &self.kernels
    }

    pub fn device(&self) -> HipDevice {
        self.device
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    /// Source file embedded in the executable; kept only with trace info on.
    pub fn source_file(&self, path: &str) -> Option<&[u8]> {
        self.source_files
            .iter()
            .find(|s| s.path == path)
            .map(|s| s.content.as_slice())
    }
}

fn copy_bytes(bytes: &[u8]) -> HalResult<Vec<u8>> {
    let mut copy = try_with_capacity(bytes.len())?;
    copy.extend_from_slice(bytes);
    Ok(copy)
}

fn check_device_limits(def: &ExecutableDef<'_>, limits: &DeviceLimits) -> HalResult<()> {
    for (i, export) in def.exports.iter().enumerate() {
        let over = export
            .block_dims
            .iter()
            .zip(limits.max_block_dims)
            .any(|(&dim, max)| dim > max);
        if over {
            return Err(HalError::InvalidArgument(format!(
                "export {i} ('{}') block size {:?} exceeds the device maximum {:?}",
                export.kernel_name, export.block_dims, limits.max_block_dims
            )));
        }
        if export.block_shared_memory_size > limits.max_block_shared_memory_size {
            return Err(HalError::ResourceExhausted(format!(
                "export {i} ('{}') requested {} bytes of shared memory, larger than the {} bytes allowed",
                export.kernel_name,
                export.block_shared_memory_size,
                limits.max_block_shared_memory_size
            )));
        }
    }
    Ok(())
}

impl Drop for NativeExecutable {
    fn drop(&mut self) {
        for (i, module) in self.modules.drain(..).enumerate() {
            if let Err(e) = self.driver.module_unload(module) {
                log::warn!("Failed to unload HIP module {i}: {e}");
            }
        }
    }
}

impl fmt::Debug for NativeExecutable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeExecutable")
            .field("device", &self.device)
            .field("modules", &self.modules.len())
            .field("kernels", &self.kernels)
            .finish()
    }
}

impl Executable for NativeExecutable {
    fn entry_point_count(&self) -> usize {
        self.kernels.len()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Query on a type-erased executable; fails if it is not a HIP executable.
pub fn entry_point_kernel_info(
    executable: &dyn Executable,
    entry_point: i32,
) -> HalResult<&KernelInfo> {
    executable
        .as_any()
        .downcast_ref::<NativeExecutable>()
        .ok_or_else(|| {
            HalError::FailedPrecondition(format!(
                "executable {executable:?} is not a HIP native executable"
            ))
        })?
        .entry_point_kernel_info(entry_point)
}
