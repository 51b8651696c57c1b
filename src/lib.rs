//! Overwatch server - command and approval authority for autonomous worker units

pub mod authority;
pub mod config;
pub mod error;
pub mod router;
pub mod store;
pub mod websocket;

use std::sync::Arc;

use crate::authority::CommandCenter;

/// Application state shared across handlers
pub struct AppState {
    pub center: CommandCenter,
}

impl AppState {
    pub fn new(center: CommandCenter) -> Arc<Self> {
        Arc::new(Self { center })
    }
}
