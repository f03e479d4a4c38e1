//! Cloud response models with tolerant parsing.
//!
//! The sites payload has shipped in several nestings over the years: a bare
//! array, wrapped under `sites` or `data`, gateways under `gateways` or a
//! singular `gateway`, the hardware address under `mac` or `gatewayId`.
//! Parsing probes the variants rather than pinning one schema.

use serde::Deserialize;
use serde_json::Value;

use heimlink_protocol::Mac;

use crate::CloudError;

/// Bearer token from the password grant.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: i64,
}

/// A gateway attached to a site.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteGateway {
    pub mac: Mac,
    pub name: Option<String>,
}

/// One site of the account.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteInfo {
    pub id: String,
    pub name: String,
    pub gateways: Vec<SiteGateway>,
}

/// Parses the site listing out of any of the known response shapes.
pub fn parse_sites(value: &Value) -> Result<Vec<SiteInfo>, CloudError> {
    let list = match value {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => map
            .get("sites")
            .or_else(|| map.get("data"))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .ok_or_else(|| CloudError::Parse("no site array in response".into()))?,
        _ => return Err(CloudError::Parse("site response is not array or object".into())),
    };

    let mut sites = Vec::with_capacity(list.len());
    for item in list {
        if let Some(site) = parse_site(item) {
            sites.push(site);
        }
    }
    Ok(sites)
}

fn parse_site(value: &Value) -> Option<SiteInfo> {
    let obj = value.as_object()?;
    let id = obj
        .get("id")
        .map(id_to_string)
        .unwrap_or_default();
    let name = obj
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let mut gateways = Vec::new();
    if let Some(list) = obj.get("gateways").and_then(Value::as_array) {
        gateways.extend(list.iter().filter_map(parse_gateway));
    } else if let Some(single) = obj.get("gateway") {
        gateways.extend(parse_gateway(single));
    }

    Some(SiteInfo { id, name, gateways })
}

fn parse_gateway(value: &Value) -> Option<SiteGateway> {
    let obj = value.as_object()?;
    let raw_mac = obj
        .get("mac")
        .or_else(|| obj.get("gatewayId"))
        .and_then(Value::as_str)?;
    let mac = Mac::parse(raw_mac).ok()?;
    let name = obj
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string);
    Some(SiteGateway { mac, name })
}

/// Site ids arrive as strings or numbers depending on the API revision.
fn id_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
