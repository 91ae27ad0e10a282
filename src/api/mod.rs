pub mod health;
pub mod tts;

use crate::pipeline::Collaborators;

/// Shared state every handler sees. Wraps the same `Collaborators` the
/// orchestrator takes, so starting a task is just spawning
/// `run_complete_tts_pipeline` with a clone of this state.
#[derive(Clone)]
pub struct AppState {
    pub collaborators: Collaborators,
}

pub use health::{health_routes, root_routes};
pub use tts::tts_routes;
