//! Topic name scheme.
//!
//! `machines` carries fleet-wide presence, `machines:{id}` the per-machine
//! detail feeds, `agent:{id}` server-to-agent pushes, and `security` the
//! global audit stream.

pub fn machines_topic() -> String {
    "machines".to_string()
}

pub fn machine_topic(machine_id: &str) -> String {
    format!("machines:{machine_id}")
}

pub fn agent_topic(machine_id: &str) -> String {
    format!("agent:{machine_id}")
}

pub fn security_topic() -> String {
    "security".to_string()
}
