//! Entity shapes moved through the capability operations.
//!
//! Only identity fields are typed; everything else a peer sends is kept in
//! `extra` and written back unchanged.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Network {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Device {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_uuid: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_uuid: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_fields_survive() {
        let raw = r#"{"uuid":"abc-123","name":"net1","transport_type":"serial","enable":true}"#;
        let network: Network = serde_json::from_str(raw).unwrap();
        assert_eq!(network.uuid, "abc-123");
        assert_eq!(network.extra["transport_type"], "serial");

        let back: Value = serde_json::to_value(&network).unwrap();
        assert_eq!(back["enable"], true);
        assert!(back.get("plugin_name").is_none());
    }

    #[test]
    fn non_object_is_rejected() {
        assert!(serde_json::from_str::<Point>("[1,2]").is_err());
        assert!(serde_json::from_str::<Device>("\"dev\"").is_err());
    }
}
