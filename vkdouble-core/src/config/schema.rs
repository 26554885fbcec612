use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::select::QueueFamilyPolicy;

pub const KHRONOS_VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub app_name: String,
    pub validation: Validation,
    /// Load the shader and build pipeline and descriptor objects.
    pub build_pipeline: bool,
    /// Record, submit and wait for the dispatch. Needs `build_pipeline`.
    pub dispatch: bool,
    pub shader: ShaderConfig,
    /// Number of f32 elements in each buffer of the pair.
    pub element_count: u32,
    pub queue_policy: QueueFamilyPolicy,
    /// How many output values to print.
    pub preview: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Validation {
    pub enabled: bool,
    pub layer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    pub path: PathBuf,
    pub entry_point: String,
    /// Must match `local_size_x` baked into the shader.
    pub workgroup_size: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            app_name: "vkdouble".into(),
            validation: Validation::default(),
            build_pipeline: true,
            dispatch: true,
            shader: ShaderConfig::default(),
            element_count: 256,
            queue_policy: QueueFamilyPolicy::default(),
            preview: 16,
        }
    }
}

impl Default for Validation {
    fn default() -> Self {
        Self { enabled: false, layer: KHRONOS_VALIDATION_LAYER.into() }
    }
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self { path: PathBuf::from("shaders/double.spv"), entry_point: "main".into(), workgroup_size: 256 }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        if self.element_count == 0 {
            return Err(Error::Config("element_count must be positive".into()));
        }
        if self.shader.workgroup_size == 0 {
            return Err(Error::Config("shader.workgroup_size must be positive".into()));
        }
        if self.dispatch && !self.build_pipeline {
            return Err(Error::Config("dispatch requires build_pipeline".into()));
        }
        if self.build_pipeline && self.shader.entry_point.is_empty() {
            return Err(Error::Config("shader.entry_point is empty".into()));
        }
        if self.validation.enabled && self.validation.layer.is_empty() {
            return Err(Error::Config("validation.layer is empty".into()));
        }
        Ok(())
    }

    /// Bytes in one buffer of the pair.
    pub fn buffer_size(&self) -> u64 {
        self.element_count as u64 * std::mem::size_of::<f32>() as u64
    }

    /// Workgroups along x covering every element.
    pub fn group_count(&self) -> u32 {
        self.element_count.div_ceil(self.shader.workgroup_size)
    }

    pub fn layer(&self) -> Option<&str> {
        self.validation.enabled.then_some(self.validation.layer.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = RunConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.buffer_size(), 1024);
        assert_eq!(cfg.group_count(), 1);
        assert_eq!(cfg.layer(), None);
    }

    #[test]
    fn group_count_rounds_up() {
        let cfg = RunConfig { element_count: 257, ..Default::default() };
        assert_eq!(cfg.group_count(), 2);
    }

    #[test]
    fn dispatch_without_pipeline_is_invalid() {
        let cfg = RunConfig { build_pipeline: false, ..Default::default() };
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));
        let cfg = RunConfig { build_pipeline: false, dispatch: false, ..Default::default() };
        cfg.validate().unwrap();
    }

    #[test]
    fn zero_sizes_are_invalid() {
        assert!(RunConfig { element_count: 0, ..Default::default() }.validate().is_err());
        let mut cfg = RunConfig::default();
        cfg.shader.workgroup_size = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn layer_only_when_enabled() {
        let mut cfg = RunConfig::default();
        cfg.validation.enabled = true;
        assert_eq!(cfg.layer(), Some(KHRONOS_VALIDATION_LAYER));
        cfg.validation.layer.clear();
        assert!(cfg.validate().is_err());
    }
}
