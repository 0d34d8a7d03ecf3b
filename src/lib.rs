//! Arena Sync - client-side simulation and peer state sync for a
//! multiplayer first-person shooter, plus the broadcast relay peers use
//! to reach each other.

pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod net;
pub mod ranking;
pub mod util;
pub mod ws;
