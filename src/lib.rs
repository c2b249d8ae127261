//! Arena Clash - authoritative arena elimination netcode
//!
//! Server side:
//! - Fixed-rate match loop owning canonical player/projectile state
//! - Melee (range cone and hitbox-tracked swings) and projectile hit detection
//! - Arena boundary eliminations and adaptive snapshot broadcasting
//!
//! Client side:
//! - Optimistic local movement prediction with smooth reconciliation
//! - Time-buffered interpolation and dead reckoning for remote players

pub mod app;
pub mod client;
pub mod config;
pub mod game;
pub mod http;
pub mod lobby;
pub mod util;
pub mod ws;
