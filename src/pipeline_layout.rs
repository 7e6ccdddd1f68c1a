//! Descriptor set and pipeline layouts.
//!
//! Kernel arguments are laid out as every binding of every set in order,
//! followed by the push constants. The layout is what turns an export into
//! the binding/constant counts of its [`KernelInfo`](crate::KernelInfo).

use std::sync::Arc;

use crate::error::{HalError, HalResult};

pub const MAX_DESCRIPTOR_SET_COUNT: usize = 3;
pub const MAX_DESCRIPTOR_SET_BINDING_COUNT: usize = 16;
pub const MAX_PUSH_CONSTANT_COUNT: u32 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorKind {
    StorageBuffer,
    UniformBuffer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorSetLayoutBinding {
    pub binding: u32,
    pub kind: DescriptorKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorSetLayout {
    bindings: Vec<DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayout {
    pub fn new(bindings: &[DescriptorSetLayoutBinding]) -> HalResult<Arc<Self>> {
        if bindings.len() > MAX_DESCRIPTOR_SET_BINDING_COUNT {
            return Err(HalError::InvalidArgument(format!(
                "descriptor set has {} bindings, over the limit of {MAX_DESCRIPTOR_SET_BINDING_COUNT}",
                bindings.len()
            )));
        }
        for (i, b) in bindings.iter().enumerate() {
            if bindings[..i].iter().any(|prev| prev.binding == b.binding) {
                return Err(HalError::InvalidArgument(format!(
                    "binding ordinal {} appears more than once in a descriptor set",
                    b.binding
                )));
            }
        }
        Ok(Arc::new(Self {
            bindings: bindings.to_vec(),
        }))
    }

    /// Shorthand for a set of `count` storage buffers at ordinals `0..count`.
    pub fn storage_buffers(count: u32) -> HalResult<Arc<Self>> {
        if count as usize > MAX_DESCRIPTOR_SET_BINDING_COUNT {
            return Err(HalError::InvalidArgument(format!(
                "descriptor set has {count} bindings, over the limit of {MAX_DESCRIPTOR_SET_BINDING_COUNT}"
            )));
        }
        let bindings: Vec<_> = (0..count)
            .map(|binding| DescriptorSetLayoutBinding {
                binding,
                kind: DescriptorKind::StorageBuffer,
            })
            .collect();
        Self::new(&bindings)
    }

    pub fn binding_count(&self) -> u32 {
        self.bindings.len() as u32
    }

    pub fn bindings(&self) -> &[DescriptorSetLayoutBinding] {
        &self.bindings
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineLayout {
    set_layouts: Vec<Arc<DescriptorSetLayout>>,
    /// Flattened argument index of each set's first binding.
    set_base_bindings: Vec<u32>,
    push_constant_count: u32,
}

impl PipelineLayout {
    pub fn new(
        set_layouts: &[Arc<DescriptorSetLayout>],
        push_constant_count: u32,
    ) -> HalResult<Arc<Self>> {
        if set_layouts.len() > MAX_DESCRIPTOR_SET_COUNT {
            return Err(HalError::InvalidArgument(format!(
                "pipeline layout has {} descriptor sets, over the limit of {MAX_DESCRIPTOR_SET_COUNT}",
                set_layouts.len()
            )));
        }
        if push_constant_count > MAX_PUSH_CONSTANT_COUNT {
            return Err(HalError::InvalidArgument(format!(
                "push constant count {push_constant_count} over the limit of {MAX_PUSH_CONSTANT_COUNT}"
            )));
        }

        let mut set_base_bindings = Vec::with_capacity(set_layouts.len());
        let mut base = 0u32;
        for set in set_layouts {
            set_base_bindings.push(base);
            base += set.binding_count();
        }

        Ok(Arc::new(Self {
            set_layouts: set_layouts.to_vec(),
            set_base_bindings,
            push_constant_count,
        }))
    }

    pub fn set_layouts(&self) -> &[Arc<DescriptorSetLayout>] {
        &self.set_layouts
    }

    pub fn constant_count(&self) -> u32 {
        self.push_constant_count
    }

    pub fn total_binding_count(&self) -> u32 {
        self.set_layouts.iter().map(|s| s.binding_count()).sum()
    }

    pub fn set_base_binding(&self, set: usize) -> Option<u32> {
        self.set_base_bindings.get(set).copied()
    }

    /// Kernel argument index of the first push constant.
    pub fn push_constant_index(&self) -> u32 {
        self.total_binding_count()
    }

    pub fn kernel_arg_count(&self) -> u32 {
        self.total_binding_count() + self.push_constant_count
    }
}
