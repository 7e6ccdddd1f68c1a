//! Shared fixtures: an in-memory HIP driver and container builders.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::ffi::{c_void, CStr};
use std::sync::{Arc, Mutex};

use hip_hal::executable_def::{ExecutableDef, ExportDebugInfo, ExportDef, ModuleDef};
use hip_hal::hsaco::minimal_image;
use hip_hal::{
    DescriptorSetLayout, DeviceLimits, FunctionHandle, HalError, HalResult, HipDevice, HipDriver,
    ModuleHandle, PipelineLayout,
};

pub const GFX90A: u32 = 0x03f;

#[derive(Debug, Default)]
struct MockState {
    next_module: usize,
    loaded: HashSet<usize>,
    unloaded: Vec<usize>,
    shared_memory: HashMap<usize, u32>,
}

/// Hands out fake handles and records every call.
#[derive(Debug)]
pub struct MockDriver {
    pub limits: DeviceLimits,
    /// Kernel names `module_get_function` reports as missing.
    pub missing_functions: HashSet<String>,
    /// Module ordinal (load order) whose load fails.
    pub fail_load_at: Option<usize>,
    state: Mutex<MockState>,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self {
            limits: DeviceLimits {
                max_block_dims: [1024, 1024, 1024],
                max_block_shared_memory_size: 64 * 1024,
            },
            missing_functions: HashSet::new(),
            fail_load_at: None,
            state: Mutex::new(MockState::default()),
        }
    }
}

impl MockDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_limits(mut self, limits: DeviceLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_missing_function(mut self, name: &str) -> Self {
        self.missing_functions.insert(name.to_string());
        self
    }

    pub fn with_failing_load(mut self, ordinal: usize) -> Self {
        self.fail_load_at = Some(ordinal);
        self
    }

    pub fn loaded_count(&self) -> usize {
        self.state.lock().unwrap().loaded.len()
    }

    pub fn unloaded_count(&self) -> usize {
        self.state.lock().unwrap().unloaded.len()
    }

    pub fn shared_memory_for(&self, function: FunctionHandle) -> Option<u32> {
        self.state
            .lock()
            .unwrap()
            .shared_memory
            .get(&(function.as_raw() as usize))
            .copied()
    }
}

fn module_id(module: ModuleHandle) -> usize {
    module.as_raw() as usize
}

impl HipDriver for MockDriver {
    fn device_limits(&self, _device: HipDevice) -> HalResult<DeviceLimits> {
        Ok(self.limits)
    }

    fn module_load_data(&self, _device: HipDevice, image: &[u8]) -> HalResult<ModuleHandle> {
        assert!(!image.is_empty());
        let mut state = self.state.lock().unwrap();
        let ordinal = state.next_module;
        state.next_module += 1;
        if self.fail_load_at == Some(ordinal) {
            return Err(HalError::Driver {
                call: "hipModuleLoadDataEx",
                code: 209,
                name: "hipErrorNoBinaryForGpu".to_string(),
                message: "no kernel image is available for execution on the device".to_string(),
            });
        }
        let id = (ordinal + 1) * 0x1000;
        state.loaded.insert(id);
        Ok(ModuleHandle::from_raw(id as *mut c_void))
    }

    fn module_get_function(&self, module: ModuleHandle, name: &CStr) -> HalResult<FunctionHandle> {
        let state = self.state.lock().unwrap();
        assert!(state.loaded.contains(&module_id(module)), "function lookup on unloaded module");
        let name = name.to_str().unwrap();
        if self.missing_functions.contains(name) {
            return Err(HalError::NotFound(format!("hipModuleGetFunction: named symbol '{name}' not found")));
        }
        let offset = name.bytes().map(usize::from).sum::<usize>() % 0x1000;
        Ok(FunctionHandle::from_raw((module_id(module) + offset) as *mut c_void))
    }

    fn func_set_max_dynamic_shared_memory(
        &self,
        function: FunctionHandle,
        bytes: u32,
    ) -> HalResult<()> {
        self.state
            .lock()
            .unwrap()
            .shared_memory
            .insert(function.as_raw() as usize, bytes);
        Ok(())
    }

    fn module_unload(&self, module: ModuleHandle) -> HalResult<()> {
        let mut state = self.state.lock().unwrap();
        let id = module_id(module);
        assert!(state.loaded.remove(&id), "module {id:#x} unloaded twice");
        state.unloaded.push(id);
        Ok(())
    }
}

pub fn export(name: &str) -> ExportDef<'_> {
    ExportDef {
        module_ordinal: 0,
        kernel_name: name,
        block_dims: [64, 1, 1],
        block_shared_memory_size: 0,
        debug_info: ExportDebugInfo::default(),
    }
}

/// Encodes a container with `module_count` identical gfx90a modules.
pub fn encode(module_count: usize, exports: &[ExportDef<'_>]) -> Vec<u8> {
    let image = minimal_image(GFX90A);
    ExecutableDef {
        modules: vec![ModuleDef { hsaco_image: &image }; module_count],
        source_files: Vec::new(),
        exports: exports.to_vec(),
    }
    .encode()
}

/// One layout per export: `bindings` storage buffers and `constants` push constants.
pub fn layouts(count: usize, bindings: u32, constants: u32) -> Vec<Arc<PipelineLayout>> {
    let set = DescriptorSetLayout::storage_buffers(bindings).unwrap();
    let layout = PipelineLayout::new(&[set], constants).unwrap();
    vec![layout; count]
}
