pub mod activity;
pub mod auth;
pub mod presence;
pub mod probe;
pub mod response;
pub mod routes;
pub mod state;
pub mod ws;
