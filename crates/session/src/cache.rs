//! Device and scenario cache with partial-update hydration.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use heimlink_protocol::model::{Device, EndpointData, ScenarioMetadata};

/// Last-known state of one device endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceCacheEntry {
    pub device_id: i64,
    pub endpoint_id: i64,
    pub error: i32,
    /// Data entries keyed by name; partial updates upsert into this map.
    pub data: BTreeMap<String, EndpointData>,
}

/// Cache key for a device endpoint.
pub fn entry_key(device_id: i64, endpoint_id: i64) -> String {
    format!("{device_id}_{endpoint_id}")
}

/// Process-wide cache of device endpoints and scenario metadata.
///
/// All mutation goes through the hydration methods; readers get clones.
/// Partial updates merge field-wise into the existing entry, so applying
/// the same update twice is a no-op — an endpoint that was never seen in a
/// full snapshot simply starts from whatever partial data arrives first.
#[derive(Debug, Default)]
pub struct DeviceCache {
    devices: Mutex<HashMap<String, DeviceCacheEntry>>,
    scenarios: Mutex<HashMap<i64, ScenarioMetadata>>,
}

impl DeviceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges a devices payload into the cache, returning the touched keys.
    pub fn apply_devices(&self, devices: &[Device]) -> Vec<String> {
        let mut cache = self.devices.lock().unwrap();
        let mut touched = Vec::new();
        for device in devices {
            for endpoint in &device.endpoints {
                let key = entry_key(device.id, endpoint.id);
                let entry = cache.entry(key.clone()).or_insert_with(|| DeviceCacheEntry {
                    device_id: device.id,
                    endpoint_id: endpoint.id,
                    error: 0,
                    data: BTreeMap::new(),
                });
                entry.error = endpoint.error;
                for datum in &endpoint.data {
                    entry.data.insert(datum.name.clone(), datum.clone());
                }
                touched.push(key);
            }
        }
        touched
    }

    /// Replaces scenario metadata entries by id.
    pub fn apply_scenarios(&self, scenarios: &[ScenarioMetadata]) {
        let mut cache = self.scenarios.lock().unwrap();
        for scenario in scenarios {
            cache.insert(scenario.id, scenario.clone());
        }
    }

    /// Returns a device entry by key.
    pub fn device(&self, key: &str) -> Option<DeviceCacheEntry> {
        self.devices.lock().unwrap().get(key).cloned()
    }

    /// Returns a scenario by id.
    pub fn scenario(&self, id: i64) -> Option<ScenarioMetadata> {
        self.scenarios.lock().unwrap().get(&id).cloned()
    }

    /// Number of cached device entries.
    pub fn device_count(&self) -> usize {
        self.devices.lock().unwrap().len()
    }

    /// Drops everything.
    pub fn clear(&self) {
        self.devices.lock().unwrap().clear();
        self.scenarios.lock().unwrap().clear();
    }
}
