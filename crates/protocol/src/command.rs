//! Outbound command frames.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::model::SetDataEntry;

/// A command sent to the gateway, serialized as an HTTP-request-shaped
/// frame (see the crate docs for the wire layout).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub method: Method,
    pub path: String,
    pub transaction_id: String,
    /// Extra headers beyond the standard set.
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
}

impl Method {
    fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
        }
    }
}

impl Command {
    /// Creates a command with a fresh transaction id (millisecond epoch).
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            transaction_id: default_transaction_id(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Overrides the transaction id (mostly useful in tests and replays).
    pub fn with_transaction_id(mut self, id: impl Into<String>) -> Self {
        self.transaction_id = id.into();
        self
    }

    /// Attaches a JSON body.
    pub fn with_json_body<T: Serialize>(mut self, body: &T) -> Result<Self, serde_json::Error> {
        self.body = Some(serde_json::to_vec(body)?);
        Ok(self)
    }

    /// Serializes the command to wire bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let body = self.body.as_deref().unwrap_or_default();
        let mut out = Vec::with_capacity(128 + body.len());
        out.extend_from_slice(
            format!("{} {} HTTP/1.1\r\n", self.method.as_str(), self.path).as_bytes(),
        );
        out.extend_from_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
        out.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n");
        out.extend_from_slice(format!("Transac-Id: {}\r\n", self.transaction_id).as_bytes());
        for (name, value) in &self.headers {
            out.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        if !body.is_empty() {
            out.extend_from_slice(body);
            out.extend_from_slice(b"\r\n\r\n");
        }
        out
    }

    // Standard gateway commands.

    pub fn info() -> Self {
        Self::new(Method::Get, "/info")
    }

    pub fn ping() -> Self {
        Self::new(Method::Get, "/ping")
    }

    pub fn devices_meta() -> Self {
        Self::new(Method::Get, "/devices/meta")
    }

    pub fn devices_data() -> Self {
        Self::new(Method::Get, "/devices/data")
    }

    pub fn devices_cmeta() -> Self {
        Self::new(Method::Get, "/devices/cmeta")
    }

    pub fn configs_file() -> Self {
        Self::new(Method::Get, "/configs/file")
    }

    pub fn scenarios_file() -> Self {
        Self::new(Method::Get, "/scenarios/file")
    }

    pub fn groups_file() -> Self {
        Self::new(Method::Get, "/groups/file")
    }

    pub fn moments_file() -> Self {
        Self::new(Method::Get, "/moments/file")
    }

    pub fn areas_file() -> Self {
        Self::new(Method::Get, "/areas/file")
    }

    pub fn refresh_all() -> Self {
        Self::new(Method::Post, "/refresh/all")
    }

    /// Re-fetches an arbitrary gateway URL (used by the poll scheduler).
    pub fn get_url(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    /// Writes endpoint data: `PUT /devices/{device}/endpoints/{endpoint}/data`
    /// with a JSON array body of name/value pairs.
    pub fn put_device_data(
        device_id: i64,
        endpoint_id: i64,
        entries: &[SetDataEntry],
    ) -> Result<Self, serde_json::Error> {
        Self::new(
            Method::Put,
            format!("/devices/{device_id}/endpoints/{endpoint_id}/data"),
        )
        .with_json_body(&entries)
    }

    /// Triggers a scenario: `PUT /scenarios/{id}`.
    pub fn put_scenario(scenario_id: i64) -> Self {
        Self::new(Method::Put, format!("/scenarios/{scenario_id}"))
    }
}

/// Millisecond epoch timestamp, the gateway's expected transaction id form.
fn default_transaction_id() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .to_string()
}
