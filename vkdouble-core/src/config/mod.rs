pub mod schema;

use anyhow::{Context, Result};
pub use schema::{RunConfig, ShaderConfig, Validation};

pub fn load_from_yaml_str(s: &str) -> Result<RunConfig> {
    let cfg: RunConfig = serde_yaml::from_str(s)?;
    Ok(cfg)
}

pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<RunConfig> {
    let path = path.as_ref();
    let data = std::fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
    load_from_yaml_str(&data).with_context(|| format!("parsing config {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::select::QueueFamilyPolicy;
    use std::io::Write;

    #[test]
    fn empty_document_gives_defaults() {
        let cfg = load_from_yaml_str("{}").unwrap();
        assert_eq!(cfg.element_count, 256);
        assert!(cfg.build_pipeline && cfg.dispatch);
        assert!(!cfg.validation.enabled);
        assert_eq!(cfg.shader.path, std::path::PathBuf::from("shaders/double.spv"));
        assert_eq!(cfg.queue_policy, QueueFamilyPolicy::LastMatch);
    }

    #[test]
    fn partial_document_overrides_fields() {
        let cfg = load_from_yaml_str(
            "validation:\n  enabled: true\nqueue_policy: first-match\nshader:\n  workgroup_size: 64\n",
        )
        .unwrap();
        assert!(cfg.validation.enabled);
        assert_eq!(cfg.validation.layer, "VK_LAYER_KHRONOS_validation");
        assert_eq!(cfg.queue_policy, QueueFamilyPolicy::FirstMatch);
        assert_eq!(cfg.shader.workgroup_size, 64);
        assert_eq!(cfg.shader.entry_point, "main");
    }

    #[test]
    fn unknown_policy_is_rejected() {
        assert!(load_from_yaml_str("queue_policy: best\n").is_err());
    }

    #[test]
    fn loads_from_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "element_count: 32\ndispatch: false").unwrap();
        let cfg = load_from_path(f.path()).unwrap();
        assert_eq!(cfg.element_count, 32);
        assert!(!cfg.dispatch);
    }

    #[test]
    fn missing_file_mentions_path() {
        let err = load_from_path("/nonexistent/vkdouble.yaml").unwrap_err();
        assert!(format!("{:#}", err).contains("vkdouble.yaml"));
    }
}
