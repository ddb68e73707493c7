//! Engine data structures: colors, transforms and the entity graph.
//!
//! - `color` holds the RGBA type used for base colors and highlights
//! - `instance` holds per-node local transforms
//! - `scene_graph` holds entities, the node hierarchy and the name mapping

pub mod color;
pub mod instance;
pub mod scene_graph;
