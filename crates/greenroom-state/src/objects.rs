//! Generic object abstraction backing every simulated domain entity.

use serde::{Deserialize, Serialize};

/// Schema registered by a backend for its domain. Only object types named
/// here may be created under the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSchema {
    pub service: String,
    pub object_types: Vec<String>,
}

impl ServiceSchema {
    pub fn new(service: &str, object_types: &[&str]) -> Self {
        ServiceSchema {
            service: service.to_string(),
            object_types: object_types.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// A stored domain entity. `object_type` is immutable after creation and
/// ids are unique store-wide, across services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateObject {
    pub id: String,
    pub service: String,
    #[serde(rename = "type")]
    pub object_type: String,
    pub data: serde_json::Value,
    pub created_at: i64,
    pub updated_at: i64,
}
