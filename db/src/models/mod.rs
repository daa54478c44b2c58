pub mod activity_heartbeat;
pub mod activity_session;
pub mod audit_event;
pub mod machine;
pub mod machine_state;
pub mod screenshot;
