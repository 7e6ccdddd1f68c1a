//! Environment-driven configuration.
//!
//! ## Environment Variables
//!
//! - `HIP_HAL_LIBRARY_PATH`: explicit path to `libamdhip64` (tried before the
//!   standard library names)
//! - `HIP_HAL_TRACE`: `1`/`true`/`on` attaches function name and source
//!   location to every kernel record, `0`/`false`/`off` drops them. Unset
//!   falls back to the `trace` cargo feature.

use std::path::PathBuf;

pub const ENV_LIBRARY_PATH: &str = "HIP_HAL_LIBRARY_PATH";
pub const ENV_TRACE: &str = "HIP_HAL_TRACE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HalConfig {
    pub library_path: Option<PathBuf>,
    pub debug_info: bool,
}

impl Default for HalConfig {
    fn default() -> Self {
        Self {
            library_path: None,
            debug_info: cfg!(feature = "trace"),
        }
    }
}

impl HalConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(path) = lookup(ENV_LIBRARY_PATH).filter(|p| !p.trim().is_empty()) {
            config.library_path = Some(PathBuf::from(path.trim()));
        }

        if let Some(raw) = lookup(ENV_TRACE) {
            match parse_flag(&raw) {
                Some(flag) => config.debug_info = flag,
                None => log::warn!("Ignoring {ENV_TRACE}={raw:?}: expected a boolean"),
            }
        }

        config
    }

    pub fn with_debug_info(mut self, enabled: bool) -> Self {
        self.debug_info = enabled;
        self
    }

    pub fn with_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.library_path = Some(path.into());
        self
    }

    /// Library names tried in order when loading the HIP runtime.
    pub fn library_candidates(&self) -> Vec<PathBuf> {
        let mut candidates: Vec<PathBuf> = self.library_path.iter().cloned().collect();

        #[cfg(windows)]
        let defaults: &[&str] = &["amdhip64_6.dll", "amdhip64.dll"];
        #[cfg(not(windows))]
        let defaults: &[&str] = &[
            "libamdhip64.so",
            "libamdhip64.so.6",
            "libamdhip64.so.5",
            "/opt/rocm/lib/libamdhip64.so",
            "/opt/rocm/lib64/libamdhip64.so",
        ];

        candidates.extend(defaults.iter().map(PathBuf::from));
        candidates
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}
