//! 路网节点文件加载
//!
//! JSON 文件可以是节点数组，也可以是 `{ "nodes": [...] }`；TOML 文件使用 `[[nodes]]`。

use serde::Deserialize;
use std::path::Path;

use contracts::{ContractError, RoadNode, TrackerBlueprint};
use tracing::debug;

use crate::parser::ConfigFormat;
use crate::validator::validate_road_nodes;

#[derive(Deserialize)]
#[serde(untagged)]
enum NodeDocument {
    Bare(Vec<RoadNode>),
    Wrapped { nodes: Vec<RoadNode> },
}

impl NodeDocument {
    fn into_nodes(self) -> Vec<RoadNode> {
        match self {
            NodeDocument::Bare(nodes) | NodeDocument::Wrapped { nodes } => nodes,
        }
    }
}

/// Road network loader
pub struct RoadNetworkLoader;

impl RoadNetworkLoader {
    /// Load a node file, format from extension
    pub fn load_from_path(path: &Path) -> Result<Vec<RoadNode>, ContractError> {
        let format = ConfigFormat::from_path(path)?;
        let content = std::fs::read_to_string(path)?;
        Self::load_from_str(&content, format)
    }

    pub fn load_from_str(content: &str, format: ConfigFormat) -> Result<Vec<RoadNode>, ContractError> {
        let nodes = format.parse::<NodeDocument>(content)?.into_nodes();
        validate_road_nodes(&nodes)?;
        Ok(nodes)
    }

    /// Inline nodes plus `nodes_path` (resolved against `base_dir` when relative)
    pub fn resolve(
        blueprint: &TrackerBlueprint,
        base_dir: Option<&Path>,
    ) -> Result<Vec<RoadNode>, ContractError> {
        let mut nodes = blueprint.road_network.nodes.clone();

        if let Some(path) = &blueprint.road_network.nodes_path {
            let full = match base_dir {
                Some(dir) if path.is_relative() => dir.join(path),
                _ => path.clone(),
            };
            let loaded = Self::load_from_path(&full)?;
            debug!(path = %full.display(), count = loaded.len(), "Loaded road network file");
            nodes.extend(loaded);
        }

        validate_road_nodes(&nodes)?;
        Ok(nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::BlockCategory;
    use std::io::Write;

    const NODES_JSON: &str = r#"[
        { "id": 1, "x": 0.0, "y": 0.0, "road_id": "main", "category": "ROAD" },
        { "id": 2, "x": 10.0, "y": 0.0, "road_id": "main", "category": "ROAD" },
        { "id": 3, "x": 5.0, "y": 30.0, "category": "BUILDING" }
    ]"#;

    #[test]
    fn test_load_bare_json_array() {
        let nodes = RoadNetworkLoader::load_from_str(NODES_JSON, ConfigFormat::Json).unwrap();
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[2].category, BlockCategory::Building);
        assert!(nodes[2].road_id.is_none());
    }

    #[test]
    fn test_load_toml_nodes() {
        let content = r#"
[[nodes]]
id = 7
x = 1.0
y = 2.0
road_id = "ring"
category = "ROAD"
"#;
        let nodes = RoadNetworkLoader::load_from_str(content, ConfigFormat::Toml).unwrap();
        assert_eq!(nodes[0].id, 7);
        assert_eq!(nodes[0].road_id.as_deref(), Some("ring"));
    }

    #[test]
    fn test_resolve_relative_path_and_inline() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("roads.json")).unwrap();
        file.write_all(NODES_JSON.as_bytes()).unwrap();

        let mut bp = TrackerBlueprint::default();
        bp.road_network.nodes_path = Some("roads.json".into());
        bp.road_network.nodes = vec![RoadNode::road(99, 50.0, 50.0, Some("side"))];

        let nodes = RoadNetworkLoader::resolve(&bp, Some(dir.path())).unwrap();
        assert_eq!(nodes.len(), 4);
        assert_eq!(nodes[0].id, 99);
    }

    #[test]
    fn test_resolve_rejects_cross_file_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("roads.json"), NODES_JSON).unwrap();

        let mut bp = TrackerBlueprint::default();
        bp.road_network.nodes_path = Some(dir.path().join("roads.json"));
        bp.road_network.nodes = vec![RoadNode::road(1, 50.0, 50.0, None)];

        assert!(RoadNetworkLoader::resolve(&bp, None).is_err());
    }
}
