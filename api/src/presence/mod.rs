pub mod resolver;
pub mod status_text;

pub use resolver::{ConnectionStatus, PingHealth, Presence, resolve};
pub use status_text::format_status;
