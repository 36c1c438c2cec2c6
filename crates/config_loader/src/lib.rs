//! # Config Loader
//!
//! 读取 `TrackerBlueprint`（TOML 或 JSON，按扩展名判断），执行校验，并加载路网节点。
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let (blueprint, nodes) = ConfigLoader::load_with_network(Path::new("config.toml"))?;
//! println!("{} -> {} nodes", blueprint.ingest.topic_pattern, nodes.len());
//! # Ok::<(), contracts::ContractError>(())
//! ```

mod parser;
mod road_network;
mod validator;

pub use contracts::TrackerBlueprint;
pub use parser::ConfigFormat;
pub use road_network::RoadNetworkLoader;

use std::path::Path;

use contracts::{ContractError, RoadNode};
use tracing::debug;

/// Blueprint entry points
pub struct ConfigLoader;

impl ConfigLoader {
    /// Read, parse and validate a blueprint file
    ///
    /// 失败情形：扩展名不支持、读取失败、语法错误、校验不通过。
    pub fn load_from_path(path: &Path) -> Result<TrackerBlueprint, ContractError> {
        let format = ConfigFormat::from_path(path)?;
        let blueprint = Self::load_from_str(&std::fs::read_to_string(path)?, format)?;
        debug!(path = %path.display(), ?format, "Blueprint loaded");
        Ok(blueprint)
    }

    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<TrackerBlueprint, ContractError> {
        let blueprint = format.parse::<TrackerBlueprint>(content)?;
        validator::validate(&blueprint)?;
        Ok(blueprint)
    }

    /// Blueprint plus its road network; `nodes_path` resolves against the file's directory
    pub fn load_with_network(
        path: &Path,
    ) -> Result<(TrackerBlueprint, Vec<RoadNode>), ContractError> {
        let blueprint = Self::load_from_path(path)?;
        let nodes = RoadNetworkLoader::resolve(&blueprint, path.parent())?;
        Ok((blueprint, nodes))
    }

    /// Re-run validation, e.g. after overriding fields in code
    pub fn validate(blueprint: &TrackerBlueprint) -> Result<(), ContractError> {
        validator::validate(blueprint)
    }

    /// Render a blueprint back into `format`
    pub fn render(blueprint: &TrackerBlueprint, format: ConfigFormat) -> Result<String, ContractError> {
        format.render(blueprint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_TOML: &str = r#"
version = "V1"

[ingest]
topic_pattern = "vehicle/+/info"
channel_capacity = 256
subscriptions = ["vehicle/esp32_001/info"]

[normalizer]
trust_device_clock = true

[filter]
max_speed = 15.0

[matcher]
search_radius = 40.0

[[road_network.nodes]]
id = 1
x = 0.0
y = 0.0
road_id = "main"
category = "ROAD"

[[road_network.nodes]]
id = 2
x = 20.0
y = 0.0
road_id = "main"
category = "ROAD"
"#;

    #[test]
    fn test_load_from_str_toml() {
        let result = ConfigLoader::load_from_str(SAMPLE_TOML, ConfigFormat::Toml);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let bp = result.unwrap();
        assert_eq!(bp.ingest.channel_capacity, 256);
        assert!(bp.normalizer.trust_device_clock);
        assert_eq!(bp.road_network.nodes.len(), 2);
    }

    #[test]
    fn test_round_trip_toml() {
        let bp = ConfigLoader::load_from_str(SAMPLE_TOML, ConfigFormat::Toml).unwrap();
        let serialized = ConfigLoader::render(&bp, ConfigFormat::Toml).unwrap();
        let bp2 = ConfigLoader::load_from_str(&serialized, ConfigFormat::Toml).unwrap();
        assert_eq!(bp.filter.max_speed, bp2.filter.max_speed);
        assert_eq!(bp.road_network.nodes, bp2.road_network.nodes);
    }

    #[test]
    fn test_round_trip_json() {
        let bp = ConfigLoader::load_from_str(SAMPLE_TOML, ConfigFormat::Toml).unwrap();
        let json = ConfigLoader::render(&bp, ConfigFormat::Json).unwrap();
        let bp2 = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();
        assert_eq!(bp.matcher.search_radius, bp2.matcher.search_radius);
    }

    #[test]
    fn test_validation_runs_after_parse() {
        let content = "[traffic]\nsmooth_below = 0.9\nnormal_below = 0.2\n";
        let result = ConfigLoader::load_from_str(content, ConfigFormat::Toml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("smooth_below"));
    }

    #[test]
    fn test_load_from_path_detects_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracker.toml");
        std::fs::write(&path, SAMPLE_TOML).unwrap();
        assert!(ConfigLoader::load_from_path(&path).is_ok());

        let bad = dir.path().join("tracker.yaml");
        std::fs::write(&bad, "").unwrap();
        let err = ConfigLoader::load_from_path(&bad).unwrap_err();
        assert!(err.to_string().contains("unsupported config format"));
    }

    #[test]
    fn test_load_with_network_resolves_relative_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("roads.json"),
            r#"{ "nodes": [ { "id": 10, "x": 40.0, "y": 0.0, "road_id": "main", "category": "ROAD" } ] }"#,
        )
        .unwrap();
        let path = dir.path().join("tracker.toml");
        std::fs::write(&path, "[road_network]\nnodes_path = \"roads.json\"\n").unwrap();

        let (bp, nodes) = ConfigLoader::load_with_network(&path).unwrap();
        assert!(bp.road_network.nodes.is_empty());
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].id, 10);
    }
}
