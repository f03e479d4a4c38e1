//! Frame decoding into typed messages.

use crate::ProtocolError;
use crate::frame::Frame;
use crate::model::{Area, Device, GatewayDescription, Group, Moment, ScenarioMetadata};

/// A decoded gateway message.
///
/// Frames whose origin URI is not recognized land in [`Raw`](Self::Raw)
/// with their original bytes, origin and transaction id preserved so
/// downstream consumers can still correlate them.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedMessage {
    Devices(Vec<Device>),
    GatewayInfo(GatewayDescription),
    Scenarios(Vec<ScenarioMetadata>),
    Groups(Vec<Group>),
    Moments(Vec<Moment>),
    Areas(Vec<Area>),
    Raw {
        uri: String,
        transaction_id: Option<String>,
        body: Vec<u8>,
    },
}

impl DecodedMessage {
    /// Short tag for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            DecodedMessage::Devices(_) => "devices",
            DecodedMessage::GatewayInfo(_) => "gatewayInfo",
            DecodedMessage::Scenarios(_) => "scenarios",
            DecodedMessage::Groups(_) => "groups",
            DecodedMessage::Moments(_) => "moments",
            DecodedMessage::Areas(_) => "areas",
            DecodedMessage::Raw { .. } => "raw",
        }
    }
}

/// Decodes a frame into a typed message based on its origin URI.
///
/// JSON that fails to parse for a recognized URI is an error — the caller
/// decides whether to log and skip. Unrecognized URIs are never errors.
pub fn decode(frame: &Frame) -> Result<DecodedMessage, ProtocolError> {
    let uri = frame.uri().unwrap_or_default().to_string();

    let msg = match route(&uri) {
        Route::Devices => DecodedMessage::Devices(parse_json(frame)?),
        Route::GatewayInfo => DecodedMessage::GatewayInfo(parse_json(frame)?),
        Route::Scenarios => DecodedMessage::Scenarios(parse_json(frame)?),
        Route::Groups => DecodedMessage::Groups(parse_wrapped(frame, "groups")?),
        Route::Moments => DecodedMessage::Moments(parse_wrapped(frame, "moments")?),
        Route::Areas => DecodedMessage::Areas(parse_wrapped(frame, "areas")?),
        Route::Other => DecodedMessage::Raw {
            uri,
            transaction_id: frame.transaction_id().map(str::to_string),
            body: frame.body.clone(),
        },
    };
    Ok(msg)
}

enum Route {
    Devices,
    GatewayInfo,
    Scenarios,
    Groups,
    Moments,
    Areas,
    Other,
}

fn route(uri: &str) -> Route {
    // Device replies come from /devices/data, /devices/meta, /devices/cmeta
    // and from per-device poll URLs like /devices/1587/endpoints/1587/data.
    if uri == "/devices/data" || uri == "/devices/meta" || uri == "/devices/cmeta" {
        return Route::Devices;
    }
    match uri {
        "/info" => Route::GatewayInfo,
        "/scenarios/file" => Route::Scenarios,
        "/groups/file" => Route::Groups,
        "/moments/file" => Route::Moments,
        "/areas/file" => Route::Areas,
        _ => Route::Other,
    }
}

fn parse_json<T: serde::de::DeserializeOwned>(frame: &Frame) -> Result<T, ProtocolError> {
    Ok(serde_json::from_slice(&frame.body)?)
}

/// Parses either a bare JSON array or a `{"<key>": [...]}` wrapper.
///
/// File-style resources have shipped in both shapes across firmware
/// revisions.
fn parse_wrapped<T: serde::de::DeserializeOwned>(
    frame: &Frame,
    key: &str,
) -> Result<Vec<T>, ProtocolError> {
    let value: serde_json::Value = serde_json::from_slice(&frame.body)?;
    let inner = match &value {
        serde_json::Value::Object(map) => map.get(key).cloned().unwrap_or(value),
        _ => value,
    };
    Ok(serde_json::from_value(inner)?)
}
