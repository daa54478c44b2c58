//! Typed, versioned machine configuration.
//!
//! Settings flow desired-state first: the configuration surface writes a
//! `MachineSettings` document, the agent later acknowledges it as applied.
//! Merging goes through [`MachineSettings::merge`] and nowhere else, so the
//! "heartbeat/ping updates never clobber settings" invariant is enforced by
//! construction rather than by convention.

use serde::{Deserialize, Serialize};

/// Desired agent configuration. Every field except `version` is optional;
/// absent fields mean "keep whatever the agent currently does".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineSettings {
    /// Monotonic document version, bumped on every accepted patch.
    pub version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot_interval_seconds: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heartbeat_interval_seconds: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity_tracking_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blur_screenshots: Option<bool>,
}

impl Default for MachineSettings {
    fn default() -> Self {
        Self {
            version: 1,
            screenshot_interval_seconds: None,
            heartbeat_interval_seconds: None,
            activity_tracking_enabled: None,
            blur_screenshots: None,
        }
    }
}

/// A partial settings update. Fields set to `None` leave the base value
/// untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot_interval_seconds: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heartbeat_interval_seconds: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity_tracking_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blur_screenshots: Option<bool>,
}

impl MachineSettings {
    /// Applies `patch` on top of `self`, returning the merged document with
    /// a bumped version. The base is never mutated in place.
    pub fn merge(&self, patch: &SettingsPatch) -> MachineSettings {
        MachineSettings {
            version: self.version + 1,
            screenshot_interval_seconds: patch
                .screenshot_interval_seconds
                .or(self.screenshot_interval_seconds),
            heartbeat_interval_seconds: patch
                .heartbeat_interval_seconds
                .or(self.heartbeat_interval_seconds),
            activity_tracking_enabled: patch
                .activity_tracking_enabled
                .or(self.activity_tracking_enabled),
            blur_screenshots: patch.blur_screenshots.or(self.blur_screenshots),
        }
    }

    /// Decodes the JSON column value, falling back to defaults on a missing
    /// or unreadable document.
    pub fn from_column(value: Option<&serde_json::Value>) -> MachineSettings {
        value
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }

    pub fn to_column(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
