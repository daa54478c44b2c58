pub mod pinger;
pub mod scheduler;

pub use pinger::{Pinger, ProbeOutcome, SystemPinger};
pub use scheduler::{run_sweep, spawn_ping_scheduler};
