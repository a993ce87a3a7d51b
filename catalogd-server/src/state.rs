//! Per-application shared state.

use catalogd_core::Clock;

use crate::db::Database;

/// What every handler of one application receives.
#[derive(Clone, Debug)]
pub struct AppState {
    pub db: Database,
    pub clock: Clock,
}

impl AppState {
    pub fn new(db: Database, clock: Clock) -> Self {
        Self { db, clock }
    }
}
