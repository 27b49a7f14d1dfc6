//! Binding between the graph store and a drawing surface.
//!
//! The renderer owns a background task. The store reaches it through change
//! notifications, and the surface reaches it through [`SurfaceEvent`]s sent
//! on the handle. Taps become store selections; the renderer never edits the
//! graph otherwise.

use std::f64::consts::TAU;
use std::fmt::Write as _;
use std::io::Write;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use reconmap_core::{NodeData, NodeId, NodeType, Severity};

use crate::store::{GraphStore, TopologyGraph};

/// Spacing between grid cells.
const GRID_SPACING: f64 = 150.0;
const CIRCLE_RADIUS: f64 = 400.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutKind {
    #[default]
    Grid,
    Circle,
}

impl std::str::FromStr for LayoutKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "grid" => Ok(Self::Grid),
            "circle" => Ok(Self::Circle),
            _ => Err(format!("Invalid layout: {s}. Choose: grid, circle")),
        }
    }
}

/// Interaction reported by a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceEvent {
    TapNode(NodeId),
    TapCanvas,
}

/// A node as drawn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeGlyph {
    pub id: NodeId,
    pub label: String,
    pub node_type: NodeType,
    pub ip: Option<String>,
    pub selected: bool,
    pub findings: usize,
    pub severity: Option<Severity>,
    pub position: (f64, f64),
}

/// Everything a surface needs to draw one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderFrame {
    pub layout: LayoutKind,
    pub nodes: Vec<NodeGlyph>,
    pub edges: Vec<(NodeId, NodeId)>,
}

impl RenderFrame {
    pub fn build(graph: &TopologyGraph, layout: LayoutKind) -> Self {
        let count = graph.nodes.len();
        let nodes = graph
            .nodes
            .values()
            .enumerate()
            .map(|(i, node)| NodeGlyph {
                id: node.id,
                label: node.name.clone(),
                node_type: node.node_type,
                ip: node.ip.clone(),
                selected: graph.selected == Some(node.id),
                findings: node.findings().len(),
                severity: node.max_severity(),
                position: position(layout, i, count),
            })
            .collect();

        Self {
            layout,
            nodes,
            edges: graph.edges.iter().map(|e| e.endpoints()).collect(),
        }
    }

    pub fn selected(&self) -> Option<&NodeGlyph> {
        self.nodes.iter().find(|n| n.selected)
    }
}

fn position(layout: LayoutKind, index: usize, count: usize) -> (f64, f64) {
    match layout {
        LayoutKind::Grid => {
            let cols = (count as f64).sqrt().ceil().max(1.0) as usize;
            let (row, col) = (index / cols, index % cols);
            (col as f64 * GRID_SPACING, row as f64 * GRID_SPACING)
        }
        LayoutKind::Circle => {
            if count <= 1 {
                return (0.0, 0.0);
            }
            let angle = TAU * index as f64 / count as f64;
            (CIRCLE_RADIUS * angle.cos(), CIRCLE_RADIUS * angle.sin())
        }
    }
}

/// Something that can draw frames.
pub trait Surface: Send {
    fn draw(&mut self, frame: &RenderFrame);
}

/// Handle to a running renderer. Dropping it stops the render task.
#[derive(Debug)]
pub struct RendererHandle {
    events: mpsc::UnboundedSender<SurfaceEvent>,
    layout: watch::Sender<LayoutKind>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl RendererHandle {
    /// A sender a surface can use to report taps.
    pub fn events(&self) -> mpsc::UnboundedSender<SurfaceEvent> {
        self.events.clone()
    }

    pub fn tap_node(&self, id: NodeId) {
        let _ = self.events.send(SurfaceEvent::TapNode(id));
    }

    pub fn tap_canvas(&self) {
        let _ = self.events.send(SurfaceEvent::TapCanvas);
    }

    pub fn set_layout(&self, layout: LayoutKind) {
        self.layout.send_replace(layout);
    }

    /// Stop the render task without waiting for it.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stop the render task and wait for it to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Render task panicked");
            }
        }
    }
}

impl Drop for RendererHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Callback invoked with the selected node (or `None`) after each accepted
/// selection.
pub type NodeSelectCallback = Box<dyn FnMut(Option<NodeData>) + Send>;

pub struct GraphRenderer;

impl GraphRenderer {
    /// Draw the current graph on `surface` and keep it in sync until the
    /// returned handle is stopped or dropped.
    pub fn spawn<S>(
        store: Arc<GraphStore>,
        surface: S,
        layout: LayoutKind,
        on_node_select: NodeSelectCallback,
    ) -> RendererHandle
    where
        S: Surface + 'static,
    {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (layout_tx, layout_rx) = watch::channel(layout);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(render_loop(
            store,
            surface,
            events_rx,
            layout_rx,
            on_node_select,
            cancel.clone(),
        ));

        RendererHandle {
            events: events_tx,
            layout: layout_tx,
            cancel,
            task: Some(task),
        }
    }
}

async fn render_loop<S: Surface>(
    store: Arc<GraphStore>,
    mut surface: S,
    mut events: mpsc::UnboundedReceiver<SurfaceEvent>,
    mut layout: watch::Receiver<LayoutKind>,
    mut on_node_select: NodeSelectCallback,
    cancel: CancellationToken,
) {
    let mut changes = store.subscribe();
    let mut current = *layout.borrow_and_update();
    surface.draw(&RenderFrame::build(&store.snapshot(), current));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            Some(event) = events.recv() => {
                let selection = match event {
                    SurfaceEvent::TapNode(id) => Some(id),
                    SurfaceEvent::TapCanvas => None,
                };
                if store.select(selection.as_ref()) {
                    on_node_select(store.selected_node());
                }
            }
            change = changes.recv() => match change {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {
                    surface.draw(&RenderFrame::build(&store.snapshot(), current));
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            Ok(()) = layout.changed() => {
                current = *layout.borrow_and_update();
                surface.draw(&RenderFrame::build(&store.snapshot(), current));
            }
        }
    }

    tracing::debug!("Render loop stopped");
}

/// Plain-text rendering of a frame.
pub fn render_text(frame: &RenderFrame) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "topology: {} node(s), {} edge(s), {:?} layout",
        frame.nodes.len(),
        frame.edges.len(),
        frame.layout
    );

    for node in &frame.nodes {
        let marker = if node.selected { '*' } else { ' ' };
        let ip = node.ip.as_deref().unwrap_or("-");
        let _ = write!(
            out,
            "{marker} [{:<6}] {:<24} {:<15}",
            node.node_type.as_str(),
            node.label,
            ip
        );
        if let Some(severity) = node.severity {
            let _ = write!(out, " {} finding(s), max {}", node.findings, severity.as_str());
        }
        out.push('\n');
    }

    out
}

/// Multi-line description of a node for a details panel.
pub fn describe_node(node: &NodeData) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", node.name);
    let _ = writeln!(out, "  id:       {}", node.id);
    let _ = writeln!(out, "  type:     {}", node.node_type.as_str());
    if let Some(ip) = &node.ip {
        let _ = writeln!(out, "  ip:       {ip}");
    }

    if let Some(host) = &node.source_host {
        if let Some(hostname) = &host.hostname {
            let _ = writeln!(out, "  hostname: {hostname}");
        }
        match (&host.mac, &host.mac_vendor) {
            (Some(mac), Some(vendor)) => {
                let _ = writeln!(out, "  mac:      {mac} ({vendor})");
            }
            (Some(mac), None) => {
                let _ = writeln!(out, "  mac:      {mac}");
            }
            _ => {}
        }
        if let Some(os) = &host.os {
            let _ = write!(out, "  os:       {}", os.name);
            if let Some(accuracy) = os.accuracy {
                let _ = write!(out, " ({accuracy}%)");
            }
            out.push('\n');
        }

        let open: Vec<_> = host.ports.iter().filter(|p| p.is_open()).collect();
        if !open.is_empty() {
            let _ = writeln!(out, "  open ports:");
            for port in open {
                let _ = write!(
                    out,
                    "    {}/{} {}",
                    port.port,
                    String::from(port.protocol.clone()),
                    port.service
                );
                if let Some(product) = &port.product {
                    let _ = write!(out, " {product}");
                    if let Some(version) = &port.version {
                        let _ = write!(out, " {version}");
                    }
                }
                out.push('\n');
            }
        }
    }

    if !node.findings().is_empty() {
        let _ = writeln!(out, "  findings:");
        for finding in node.findings() {
            let _ = write!(
                out,
                "    [{}] {}",
                finding.severity.as_str(),
                finding.description
            );
            if let Some(cve) = &finding.cve {
                let _ = write!(out, " ({cve})");
            }
            out.push('\n');
        }
    }

    out
}

/// Surface that writes text frames to a writer.
pub struct TextSurface<W: Write + Send> {
    out: W,
}

impl<W: Write + Send> TextSurface<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write + Send> Surface for TextSurface<W> {
    fn draw(&mut self, frame: &RenderFrame) {
        if let Err(e) = self.out.write_all(render_text(frame).as_bytes()) {
            tracing::warn!(error = %e, "Failed to write topology frame");
        }
    }
}
