use crate::errors::AnalysisError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Deepest nesting of `infer` calls a search context allows. Each level
/// costs several stack frames, and 200 levels fit a 2 MiB thread stack in
/// unoptimized builds; configured depths above this are clamped to it.
pub const MAX_INFER_DEPTH: usize = 200;

/// Options that bound inference and resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisOptions {
    /// Recursion depth at which inference gives up with `unknown`
    /// (default and ceiling: [`MAX_INFER_DEPTH`])
    #[serde(default = "default_max_infer_depth")]
    pub max_infer_depth: usize,

    /// Forced-resolution rounds before everything left is forced at once (default: 64)
    #[serde(default = "default_max_forced_rounds")]
    pub max_forced_rounds: usize,

    /// Union members shown before rendering truncates (default: 8)
    #[serde(default = "default_union_render_limit")]
    pub union_render_limit: usize,

    /// Path templates used to find the document behind `require("a.b")`
    #[serde(default = "default_require_patterns")]
    pub require_patterns: Vec<String>,

    /// Load the annotated standard library prelude (default: true)
    #[serde(default = "default_true")]
    pub load_builtins: bool,
}

fn default_max_infer_depth() -> usize {
    MAX_INFER_DEPTH
}

fn default_max_forced_rounds() -> usize {
    64
}

fn default_union_render_limit() -> usize {
    8
}

fn default_require_patterns() -> Vec<String> {
    vec!["?.lua".to_string(), "?/init.lua".to_string()]
}

fn default_true() -> bool {
    true
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            max_infer_depth: default_max_infer_depth(),
            max_forced_rounds: default_max_forced_rounds(),
            union_render_limit: default_union_render_limit(),
            require_patterns: default_require_patterns(),
            load_builtins: true,
        }
    }
}

/// Top-level configuration file (`luanext.analysis.yaml`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisConfig {
    #[serde(default)]
    pub analysis_options: AnalysisOptions,
}

impl AnalysisConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: &Path) -> Result<Self, AnalysisError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, AnalysisError> {
        serde_yaml::from_str(content).map_err(|e| AnalysisError::Config(e.to_string()))
    }

    pub fn to_yaml_string(&self) -> Result<String, AnalysisError> {
        serde_yaml::to_string(self).map_err(|e| AnalysisError::Config(e.to_string()))
    }

    /// Merge caller overrides; only `Some` values replace file settings
    pub fn merge(&mut self, overrides: &ConfigOverrides) {
        let options = &mut self.analysis_options;
        if let Some(max_infer_depth) = overrides.max_infer_depth {
            options.max_infer_depth = max_infer_depth;
        }
        if let Some(max_forced_rounds) = overrides.max_forced_rounds {
            options.max_forced_rounds = max_forced_rounds;
        }
        if let Some(union_render_limit) = overrides.union_render_limit {
            options.union_render_limit = union_render_limit;
        }
        if let Some(ref require_patterns) = overrides.require_patterns {
            options.require_patterns = require_patterns.clone();
        }
        if let Some(load_builtins) = overrides.load_builtins {
            options.load_builtins = load_builtins;
        }
    }
}

/// Caller-supplied overrides for configuration
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub max_infer_depth: Option<usize>,
    pub max_forced_rounds: Option<usize>,
    pub union_render_limit: Option<usize>,
    pub require_patterns: Option<Vec<String>>,
    pub load_builtins: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = AnalysisOptions::default();
        assert_eq!(options.max_infer_depth, MAX_INFER_DEPTH);
        assert_eq!(options.max_forced_rounds, 64);
        assert!(options.load_builtins);
        assert_eq!(options.require_patterns, vec!["?.lua", "?/init.lua"]);
    }

    #[test]
    fn test_deserialize_partial_config() {
        let yaml = r#"
analysisOptions:
  maxInferDepth: 50
  loadBuiltins: false
"#;
        let config = AnalysisConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.analysis_options.max_infer_depth, 50);
        assert!(!config.analysis_options.load_builtins);
        assert_eq!(config.analysis_options.union_render_limit, 8);
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        let result = AnalysisConfig::from_yaml_str("analysisOptions: [1, 2");
        assert!(matches!(result, Err(AnalysisError::Config(_))));
    }

    #[test]
    fn test_serialize_uses_camel_case() {
        let yaml = AnalysisConfig::default().to_yaml_string().unwrap();
        assert!(yaml.contains("analysisOptions"));
        assert!(yaml.contains("maxForcedRounds"));
    }

    #[test]
    fn test_merge_partial_overrides() {
        let mut config = AnalysisConfig::default();
        config.merge(&ConfigOverrides {
            max_forced_rounds: Some(2),
            ..Default::default()
        });
        assert_eq!(config.analysis_options.max_forced_rounds, 2);
        assert_eq!(config.analysis_options.max_infer_depth, MAX_INFER_DEPTH);
    }

    #[test]
    fn test_from_file_round_trip() {
        let path = std::env::temp_dir().join(format!(
            "luanext-analysis-config-{}.yaml",
            std::process::id()
        ));
        std::fs::write(&path, "analysisOptions:\n  unionRenderLimit: 3\n").unwrap();
        let config = AnalysisConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(config.analysis_options.union_render_limit, 3);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = AnalysisConfig::from_file(Path::new("/no/such/luanext.analysis.yaml"));
        assert!(matches!(result, Err(AnalysisError::Io(_))));
    }
}
