//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::weapon::WeaponTable;
use crate::game::MatchRegistry;
use crate::lobby::LobbyService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub weapons: Arc<WeaponTable>,
    pub lobby: Arc<LobbyService>,
    pub match_registry: Arc<MatchRegistry>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        // Archetypes are immutable for the server's lifetime
        let weapons = Arc::new(config.weapons.clone());

        let match_registry = Arc::new(MatchRegistry::new());

        // Lobby service (Arc for sharing across cloned AppState)
        let lobby = Arc::new(LobbyService::new(
            config.match_config.clone(),
            weapons.clone(),
            match_registry.clone(),
        ));

        Self {
            config,
            weapons,
            lobby,
            match_registry,
        }
    }
}
