//! interactive-3d
//!
//! A rendering-session manager for embedding an interactive 3D model view in
//! a host application. The host hands over raw bytes (a glTF model plus the
//! resources it references, an IBL and skybox pair) and the session turns
//! them into entities inside a rendering backend, highlights and recolors
//! named parts, and renders a frame whenever the host's display driver asks.
//!
//! High-level modules
//! - `session`: the [`SceneSession`] owning backend, asset and environment
//! - `asset`: glTF instantiation into backend entities
//! - `patch`: selection highlighting and color patches on named entities
//! - `resources`: resource tables, mesh / texture / animation / KTX readers
//! - `backend`: the rendering capability interface and its implementations
//! - `camera`: zoomable perspective projection
//! - `config`: session and backend configuration
//! - `data_structures`: colors, transforms and the entity graph
//! - `error`: the error taxonomy
//!

pub mod asset;
pub mod backend;
pub mod camera;
pub mod config;
pub mod data_structures;
pub mod error;
pub mod patch;
pub mod resources;
pub mod session;

// Re-exports commonly used types for convenience in downstream code.
pub use backend::{RenderBackend, recording::RecordingBackend};
pub use config::{BackendOptions, SessionConfig, ViewOptions};
pub use data_structures::{color::Rgba, scene_graph::Entity};
pub use error::{BackendError, SessionError};
pub use patch::{ColorPatch, SelectionEntry};
pub use resources::ResourceTable;
pub use session::{LoadRequest, SceneSession, SessionState};

/// Install `env_logger` as the `log` backend. Safe to call more than once.
pub fn init_logger() {
    if let Err(e) = env_logger::try_init() {
        println!("Warning: Could not initialize logger: {}", e);
    }
}
