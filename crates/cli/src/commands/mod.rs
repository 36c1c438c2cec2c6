//! Command implementations.

mod info;
mod match_points;
mod run;
mod validate;

use std::path::Path;

use contracts::{RoadNode, TrackerBlueprint};
use tracing::debug;

use crate::error::{CliError, Result};

pub use info::run_info;
pub use match_points::run_match;
pub use run::run_pipeline;
pub use validate::run_validate;

/// Load the blueprint at `path`
fn load_blueprint(path: &Path) -> Result<TrackerBlueprint> {
    if !path.exists() {
        return Err(CliError::config_not_found(path));
    }
    Ok(config_loader::ConfigLoader::load_from_path(path)?)
}

/// Inline nodes plus the node file, relative paths resolved against the config directory
fn load_road_network(blueprint: &TrackerBlueprint, config_path: &Path) -> Result<Vec<RoadNode>> {
    let nodes = config_loader::RoadNetworkLoader::resolve(blueprint, config_path.parent())?;
    debug!(count = nodes.len(), "Road network loaded");
    Ok(nodes)
}
