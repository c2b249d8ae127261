//! HTTP surface: health, weapon table, WebSocket upgrade

mod routes;

pub use routes::build_router;
