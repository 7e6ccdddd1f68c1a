//! Executable preparation front door.
//!
//! HIP has no persistent executable cache: every prepare request loads the
//! container afresh. The cache only decides which formats it accepts.

use std::sync::Arc;

use crate::config::HalConfig;
use crate::error::{HalError, HalResult};
use crate::hip::{HipDevice, HipDriver};
use crate::native_executable::{
    Executable, ExecutableParams, NativeExecutable, EXECUTABLE_FORMAT_HSACO,
};

#[derive(Debug)]
pub struct NopExecutableCache {
    identifier: String,
    driver: Arc<dyn HipDriver>,
    device: HipDevice,
    config: HalConfig,
}

impl NopExecutableCache {
    pub fn new(
        identifier: impl Into<String>,
        driver: Arc<dyn HipDriver>,
        device: HipDevice,
        config: HalConfig,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            driver,
            device,
            config,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn can_prepare_format(&self, executable_format: &str) -> bool {
        executable_format == EXECUTABLE_FORMAT_HSACO
    }

    pub fn prepare_executable(&self, params: &ExecutableParams<'_>) -> HalResult<Arc<dyn Executable>> {
        if !self.can_prepare_format(params.executable_format) {
            return Err(HalError::Incompatible(format!(
                "executable cache '{}' cannot prepare format '{}'; only '{EXECUTABLE_FORMAT_HSACO}' is supported",
                self.identifier, params.executable_format
            )));
        }
        let executable =
            NativeExecutable::create(Arc::clone(&self.driver), self.device, params, &self.config)?;
        log::info!(
            "Prepared executable with {} entry point(s) in cache '{}'",
            executable.entry_point_count(),
            self.identifier
        );
        Ok(Arc::new(executable))
    }
}
