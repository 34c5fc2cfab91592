//! Application state shared across routes

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::Config;
use crate::game::MatchScheduler;
use crate::lobby::LobbyService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub scheduler: Arc<MatchScheduler>,
    pub lobby: Arc<LobbyService>,
}

impl AppState {
    /// Build the state plus the scheduler's match-end stream, which the
    /// caller hands to `LobbyService::run`
    pub fn new(config: Config) -> (Self, mpsc::UnboundedReceiver<String>) {
        let config = Arc::new(config);

        let (scheduler, ended_rx) = MatchScheduler::new(config.game.clone());
        let scheduler = Arc::new(scheduler);

        let lobby = Arc::new(LobbyService::new(scheduler.clone()));

        let state = Self {
            config,
            scheduler,
            lobby,
        };
        (state, ended_rx)
    }
}
