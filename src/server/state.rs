use axum::extract::FromRef;

use crate::runner::TaskRunner;
use crate::warehouse::WarehouseReader;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedWarehouseReader = Arc<WarehouseReader>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub reader: GuardedWarehouseReader,
    pub runner: TaskRunner,
    pub version: String,
}

impl FromRef<ServerState> for GuardedWarehouseReader {
    fn from_ref(input: &ServerState) -> Self {
        input.reader.clone()
    }
}

impl FromRef<ServerState> for TaskRunner {
    fn from_ref(input: &ServerState) -> Self {
        input.runner.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
