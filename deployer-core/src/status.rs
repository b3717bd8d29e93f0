//! Status aggregation.
//!
//! Combines the persisted deployment state with the live outputs of the
//! provisioning engine into one JSON view.

use crate::engine::ProvisioningEngine;
use crate::error::Result;
use crate::state::{DeploymentState, DeploymentStore};
use log::warn;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::path::Path;

/// Engine output holding free text rather than structured data.
const SUMMARY_KEY: &str = "summary";
/// Engine output mapping instance names to their properties.
const INSTANCE_DETAILS_KEY: &str = "instance_details";

/// Result of a `status` query.
///
/// Serializes as the state fields plus, only when requested, a `details` object.
#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    #[serde(flatten)]
    pub state: DeploymentState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Builds the status view of `deployment_dir`.
///
/// The state document is always read. With `show_details` the engine is
/// queried; if that fails the view still carries the state and `details`
/// reports the error with an `instance_count` of 0.
pub fn compute_status(
    deployment_dir: &Path,
    show_details: bool,
    engine: &dyn ProvisioningEngine,
) -> Result<StatusView> {
    let state = DeploymentStore::load(deployment_dir)?;

    let details = if show_details {
        Some(match engine.output_json(deployment_dir) {
            Ok(outputs) => build_details(outputs),
            Err(e) => {
                warn!("Could not query live details: {}", e);
                json!({ "instance_count": 0, "error": e.to_string() })
            }
        })
    } else {
        None
    };

    Ok(StatusView { state, details })
}

/// Flattens engine outputs into a details object.
///
/// Engine outputs are wrapped as `{"value": ..., "type": ..., "sensitive": ...}`;
/// only the value is kept. Plain values pass through unchanged.
pub fn build_details(outputs: Value) -> Value {
    let mut details = match outputs {
        Value::Object(map) => map
            .into_iter()
            .map(|(key, value)| (key, unwrap_output(value)))
            .collect::<Map<String, Value>>(),
        _ => Map::new(),
    };

    details.remove(SUMMARY_KEY);

    let instance_count = details
        .get(INSTANCE_DETAILS_KEY)
        .and_then(Value::as_object)
        .map_or(0, Map::len);
    details.insert("instance_count".to_string(), json!(instance_count));

    Value::Object(details)
}

fn unwrap_output(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("value") => {
            map.remove("value").unwrap_or(Value::Null)
        }
        other => other,
    }
}
