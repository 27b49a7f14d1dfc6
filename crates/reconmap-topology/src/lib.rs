//! reconmap-topology: from scan results to a displayed network map.
//!
//! [`translate`] turns a completed scan into graph nodes with heuristic
//! findings, [`GraphStore`] holds the merged map across scans, and
//! [`GraphRenderer`] keeps a drawing surface in sync with the store.

pub mod render;
pub mod store;
pub mod translate;
pub mod vulns;

pub use render::{
    describe_node, render_text, GraphRenderer, LayoutKind, NodeSelectCallback, RenderFrame,
    RendererHandle, Surface, SurfaceEvent, TextSurface,
};
pub use store::{GraphChange, GraphStore, MergeSummary, TopologyGraph};
pub use translate::{classify, host_to_node, translate};
pub use vulns::detect_vulnerabilities;
