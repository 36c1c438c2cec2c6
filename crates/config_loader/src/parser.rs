//! 蓝图与路网节点文件共用的格式层

use std::path::Path;

use contracts::ContractError;
use serde::{de::DeserializeOwned, Serialize};

/// On-disk format, picked from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// 扩展名大小写不敏感
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, ContractError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| ContractError::config_parse(format!("{} has no extension", path.display())))?;
        Self::from_extension(ext)
            .ok_or_else(|| ContractError::config_parse(format!("unsupported config format: .{ext}")))
    }

    pub fn parse<T: DeserializeOwned>(self, content: &str) -> Result<T, ContractError> {
        match self {
            Self::Toml => toml::from_str(content).map_err(|e| ContractError::ConfigParse {
                message: format!("TOML parse error: {e}"),
                source: Some(Box::new(e)),
            }),
            Self::Json => serde_json::from_str(content).map_err(|e| ContractError::ConfigParse {
                message: format!("JSON parse error: {e}"),
                source: Some(Box::new(e)),
            }),
        }
    }

    pub fn render<T: Serialize>(self, value: &T) -> Result<String, ContractError> {
        match self {
            Self::Toml => toml::to_string_pretty(value)
                .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}"))),
            Self::Json => serde_json::to_string_pretty(value)
                .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{DropPolicy, TrackerBlueprint};

    #[test]
    fn test_parse_toml_sections() {
        let content = r#"
[ingest]
topic_pattern = "fleet/+/telemetry"
drop_policy = "drop_oldest"

[filter]
max_speed = 25.0
"#;
        let bp: TrackerBlueprint = ConfigFormat::Toml.parse(content).unwrap();
        assert_eq!(bp.ingest.topic_pattern, "fleet/+/telemetry");
        assert_eq!(bp.ingest.drop_policy, DropPolicy::DropOldest);
        assert_eq!(bp.filter.max_speed, 25.0);
        assert_eq!(bp.filter.window_capacity, 10);
    }

    #[test]
    fn test_parse_empty_toml_is_default() {
        let bp: TrackerBlueprint = ConfigFormat::Toml.parse("").unwrap();
        assert_eq!(bp.matcher.candidate_limit, 10);
    }

    #[test]
    fn test_parse_json_minimal() {
        let content = r#"{ "traffic": { "tolerance": 5.0 } }"#;
        let bp: TrackerBlueprint = ConfigFormat::Json.parse(content).unwrap();
        assert_eq!(bp.traffic.tolerance, 5.0);
    }

    #[test]
    fn test_parse_toml_syntax_error() {
        let result = ConfigFormat::Toml.parse::<TrackerBlueprint>("invalid toml [[[");
        assert!(matches!(result, Err(ContractError::ConfigParse { .. })));
    }

    #[test]
    fn test_unknown_drop_policy_is_error() {
        let result = ConfigFormat::Toml.parse::<TrackerBlueprint>("[ingest]\ndrop_policy = \"drop_random\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ConfigFormat::from_extension("toml"), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::from_extension("TOML"), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::from_extension("json"), Some(ConfigFormat::Json));
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
        assert!(ConfigFormat::from_path(Path::new("roads")).is_err());
        assert_eq!(
            ConfigFormat::from_path(Path::new("demos/roads.json")).unwrap(),
            ConfigFormat::Json
        );
    }
}
