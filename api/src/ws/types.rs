//! Wire frames for the agent and dashboard sockets.
//!
//! Inbound frames are tagged unions on `type`; payload fields are
//! camelCase to match the agents already in the field. Unknown frame
//! types fail deserialization and are logged, never fatal to the socket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/* ---------- agent -> server ---------- */

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum AgentIn {
    #[serde(rename = "machine:connect")]
    Connect(ConnectFrame),
    #[serde(rename = "machine:heartbeat")]
    Heartbeat(HeartbeatFrame),
    #[serde(rename = "machine:activity")]
    Activity(ActivityFrame),
    #[serde(rename = "machine:audit")]
    Audit(AuditFrame),
    #[serde(rename = "machine:screenshot")]
    Screenshot(ScreenshotFrame),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectFrame {
    pub machine_id: String,
    pub api_key: String,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatFrame {
    pub machine_id: String,
    pub state: RuntimeReport,
}

/// Volatile runtime fields an agent reports with each heartbeat. All
/// optional: absent fields leave the stored state untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeReport {
    #[serde(default)]
    pub active_window: Option<String>,
    #[serde(default)]
    pub screenshot_count: Option<i32>,
    #[serde(default)]
    pub upload_count: Option<i32>,
    #[serde(default)]
    pub health: Option<String>,
    #[serde(default)]
    pub last_activity_time: Option<i64>,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityFrame {
    pub machine_id: String,
    pub activity: ActivityReport,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityReport {
    /// Agent-side unix timestamp of the observation.
    pub timestamp: i64,
    pub active_window: String,
    pub process_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditFrame {
    pub machine_id: String,
    #[serde(rename = "auditEvent")]
    pub event: AuditReport,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    /// Agent-assigned identity used for replay dedup.
    pub event_id: String,
    pub event_type: String,
    pub username: String,
    pub timestamp: i64,
    #[serde(default)]
    pub details: serde_json::Value,
    pub source_log_name: String,
    #[serde(default)]
    pub is_flagged: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotFrame {
    pub machine_id: String,
    pub screenshot: ScreenshotReport,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotReport {
    pub id: String,
    pub capture_time: i64,
    pub trigger_type: String,
    #[serde(default)]
    pub google_drive_file_id: Option<String>,
    #[serde(default)]
    pub is_uploaded: bool,
}

/* ---------- server -> agent (direct frames, not topic broadcasts) ---------- */

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum AgentOut {
    #[serde(rename = "server:ack")]
    Ack { event: String },
    #[serde(rename = "server:error")]
    Error { message: String },
    #[serde(rename = "machine:archived", rename_all = "camelCase")]
    Archived {
        machine_id: String,
        timestamp: DateTime<Utc>,
    },
}

/* ---------- dashboard -> server ---------- */

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum DashboardIn {
    /// Attach to the fleet-wide feeds and receive a machines snapshot.
    #[serde(rename = "web:subscribe")]
    Subscribe {},
    /// Start following one machine's detail topic.
    #[serde(rename = "web:watch")]
    Watch {
        #[serde(rename = "machineId")]
        machine_id: String,
    },
    #[serde(rename = "web:unwatch")]
    Unwatch {
        #[serde(rename = "machineId")]
        machine_id: String,
    },
}
