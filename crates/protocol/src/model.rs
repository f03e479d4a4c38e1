//! Typed payload models for gateway replies.
//!
//! The gateway's JSON is tolerant by necessity: firmware revisions add and
//! drop fields freely, so everything beyond the identifying keys defaults.

use serde::{Deserialize, Serialize};

/// One name/value pair inside an endpoint's data set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointData {
    pub name: String,
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validity: Option<String>,
}

/// A device endpoint as reported by `/devices/data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub id: i64,
    #[serde(default)]
    pub error: i32,
    #[serde(default)]
    pub data: Vec<EndpointData>,
    /// Metadata entries from `/devices/meta`; same shape, different feed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metadata: Vec<serde_json::Value>,
}

/// A device with its endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: i64,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

/// Gateway self-description from `GET /info`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayDescription {
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub mac: String,
    #[serde(default)]
    pub main_version_sw: String,
    #[serde(default)]
    pub key_version_sw: String,
    #[serde(default)]
    pub update_available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime: Option<i64>,
}

/// Scenario metadata from `/scenarios/file`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioMetadata {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picto: Option<String>,
}

/// A device group from `/groups/file`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub devices: Vec<i64>,
}

/// A moment (one-shot composite action) from `/moments/file`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Moment {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub color: i32,
}

/// A dwelling area from `/areas/file`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Area {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub picto: String,
}

/// One element of a `PUT .../data` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetDataEntry {
    pub name: String,
    pub value: serde_json::Value,
}
