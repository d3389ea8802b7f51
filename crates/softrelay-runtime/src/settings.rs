//! Portal settings blob (provisioning fields and scan interval).

#![allow(missing_docs)]

use serde_json::{json, Map, Value};
use smol_str::SmolStr;

use crate::error::RuntimeError;

/// Scan interval clamp bounds for portal updates.
pub const MIN_SCAN_INTERVAL_MS: u64 = 5;
pub const MAX_SCAN_INTERVAL_MS: u64 = 1000;

const MAX_SSID_LEN: usize = 32;
const MAX_PASSWORD_LEN: usize = 64;

/// Persisted portal settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalSettings {
    pub user_ssid: SmolStr,
    pub user_password: SmolStr,
    pub scan_interval_ms: u64,
}

impl Default for PortalSettings {
    fn default() -> Self {
        Self {
            user_ssid: SmolStr::default(),
            user_password: SmolStr::default(),
            scan_interval_ms: 10,
        }
    }
}

impl PortalSettings {
    /// Wire form for the settings endpoints and the persisted blob.
    #[must_use]
    pub fn to_wire(&self) -> Value {
        json!({
            "userSsid": self.user_ssid.as_str(),
            "userPassword": self.user_password.as_str(),
            "scanIntervalMs": self.scan_interval_ms,
        })
    }

    /// Load from a persisted blob, tolerating missing keys.
    #[must_use]
    pub fn from_wire(obj: &Map<String, Value>) -> Self {
        let base = Self::default();
        Self {
            user_ssid: obj
                .get("userSsid")
                .and_then(Value::as_str)
                .map_or(base.user_ssid, SmolStr::new),
            user_password: obj
                .get("userPassword")
                .and_then(Value::as_str)
                .map_or(base.user_password, SmolStr::new),
            scan_interval_ms: obj
                .get("scanIntervalMs")
                .and_then(Value::as_u64)
                .map_or(base.scan_interval_ms, clamp_interval),
        }
    }

    /// Apply a portal update on top of the current settings.
    ///
    /// Field length limits are hard; the scan interval clamps into range.
    pub fn apply_update(&self, body: &Value) -> Result<Self, RuntimeError> {
        let obj = body
            .as_object()
            .ok_or_else(|| RuntimeError::InvalidRequest("settings body must be an object".into()))?;
        let mut next = self.clone();

        if let Some(value) = obj.get("userSsid") {
            let ssid = value.as_str().ok_or_else(|| {
                RuntimeError::InvalidRequest("userSsid must be a string".into())
            })?;
            if ssid.len() > MAX_SSID_LEN {
                return Err(RuntimeError::InvalidRequest(
                    format!("userSsid exceeds {MAX_SSID_LEN} bytes").into(),
                ));
            }
            next.user_ssid = SmolStr::new(ssid);
        }
        if let Some(value) = obj.get("userPassword") {
            let password = value.as_str().ok_or_else(|| {
                RuntimeError::InvalidRequest("userPassword must be a string".into())
            })?;
            if password.len() > MAX_PASSWORD_LEN {
                return Err(RuntimeError::InvalidRequest(
                    format!("userPassword exceeds {MAX_PASSWORD_LEN} bytes").into(),
                ));
            }
            next.user_password = SmolStr::new(password);
        }
        if let Some(value) = obj.get("scanIntervalMs") {
            let interval = value.as_u64().ok_or_else(|| {
                RuntimeError::InvalidRequest("scanIntervalMs must be a non-negative integer".into())
            })?;
            next.scan_interval_ms = clamp_interval(interval);
        }
        Ok(next)
    }
}

fn clamp_interval(interval: u64) -> u64 {
    interval.clamp(MIN_SCAN_INTERVAL_MS, MAX_SCAN_INTERVAL_MS)
}
