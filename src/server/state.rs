use axum::extract::FromRef;

use crate::play_store::RawPlayStore;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedRawPlayStore = Arc<dyn RawPlayStore>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub raw_store: GuardedRawPlayStore,
}

impl ServerState {
    pub fn new(config: ServerConfig, raw_store: GuardedRawPlayStore) -> ServerState {
        ServerState {
            config,
            start_time: Instant::now(),
            raw_store,
        }
    }
}

impl FromRef<ServerState> for GuardedRawPlayStore {
    fn from_ref(input: &ServerState) -> Self {
        input.raw_store.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
