pub mod m202601100001_create_machines;
pub mod m202601100002_create_machine_states;
pub mod m202601100003_create_activity_heartbeats;
pub mod m202601100004_create_activity_sessions;
pub mod m202601100005_create_audit_events;
pub mod m202601100006_create_screenshots;
