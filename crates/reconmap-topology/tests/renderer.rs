//! Renderer ↔ store message passing.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use reconmap_core::{HostRecord, NodeData, NodeId, PortRecord, PortState, Protocol, ScanResult};
use reconmap_topology::{
    translate, GraphRenderer, GraphStore, LayoutKind, RenderFrame, Surface,
};

#[derive(Clone, Default)]
struct RecordingSurface {
    frames: Arc<Mutex<Vec<RenderFrame>>>,
}

impl RecordingSurface {
    fn count(&self) -> usize {
        self.frames.lock().unwrap().len()
    }

    fn last(&self) -> RenderFrame {
        self.frames.lock().unwrap().last().cloned().unwrap()
    }
}

impl Surface for RecordingSurface {
    fn draw(&mut self, frame: &RenderFrame) {
        self.frames.lock().unwrap().push(frame.clone());
    }
}

fn scan_result() -> ScanResult {
    let host = |ip: &str, port: u16| HostRecord {
        ip: ip.to_string(),
        ports: vec![PortRecord {
            port,
            protocol: Protocol::Tcp,
            state: PortState::Open,
            service: String::new(),
            product: None,
            version: None,
        }],
        ..Default::default()
    };
    ScanResult {
        scan_info: serde_json::Value::Null,
        hosts: vec![host("192.168.1.1", 179), host("192.168.1.20", 22)],
    }
}

async fn wait_for_frames(surface: &RecordingSurface, at_least: usize) {
    for _ in 0..100 {
        if surface.count() >= at_least {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {at_least} frames, got {}", surface.count());
}

#[tokio::test]
async fn taps_become_selections_and_invoke_callback() {
    let store = Arc::new(GraphStore::new());
    let surface = RecordingSurface::default();
    let (tx, mut selected) = mpsc::unbounded_channel::<Option<NodeData>>();

    let handle = GraphRenderer::spawn(
        store.clone(),
        surface.clone(),
        LayoutKind::Grid,
        Box::new(move |node| {
            let _ = tx.send(node);
        }),
    );

    // Initial empty frame.
    wait_for_frames(&surface, 1).await;
    assert!(surface.last().nodes.is_empty());

    store.merge(translate(&scan_result()).nodes);
    wait_for_frames(&surface, 2).await;
    assert_eq!(surface.last().nodes.len(), 2);

    let router = NodeId::for_ip("192.168.1.1");
    handle.tap_node(router);
    let node = selected.recv().await.unwrap().unwrap();
    assert_eq!(node.id, router);
    assert_eq!(store.snapshot().selected, Some(router));

    wait_for_frames(&surface, 3).await;
    assert_eq!(surface.last().selected().map(|g| g.id), Some(router));

    handle.tap_canvas();
    assert!(selected.recv().await.unwrap().is_none());
    assert!(store.selected_node().is_none());

    handle.shutdown().await;
}

#[tokio::test]
async fn unknown_tap_leaves_selection_and_skips_callback() {
    let store = Arc::new(GraphStore::new());
    store.merge(translate(&scan_result()).nodes);
    let surface = RecordingSurface::default();
    let (tx, mut selected) = mpsc::unbounded_channel::<Option<NodeData>>();

    let handle = GraphRenderer::spawn(
        store.clone(),
        surface.clone(),
        LayoutKind::Circle,
        Box::new(move |node| {
            let _ = tx.send(node);
        }),
    );

    handle.tap_node(NodeId::for_ip("10.255.255.255"));
    handle.tap_node(NodeId::for_ip("192.168.1.20"));

    // Only the valid tap reaches the callback.
    let node = selected.recv().await.unwrap().unwrap();
    assert_eq!(node.ip.as_deref(), Some("192.168.1.20"));
    assert!(selected.try_recv().is_err());

    handle.shutdown().await;
}

#[tokio::test]
async fn layout_change_redraws() {
    let store = Arc::new(GraphStore::new());
    store.merge(translate(&scan_result()).nodes);
    let surface = RecordingSurface::default();

    let handle = GraphRenderer::spawn(
        store.clone(),
        surface.clone(),
        LayoutKind::Grid,
        Box::new(|_| {}),
    );
    wait_for_frames(&surface, 1).await;
    assert_eq!(surface.last().layout, LayoutKind::Grid);

    handle.set_layout(LayoutKind::Circle);
    wait_for_frames(&surface, 2).await;
    assert_eq!(surface.last().layout, LayoutKind::Circle);

    handle.shutdown().await;
}

#[tokio::test]
async fn dropped_handle_stops_rendering() {
    let store = Arc::new(GraphStore::new());
    let surface = RecordingSurface::default();

    let handle = GraphRenderer::spawn(
        store.clone(),
        surface.clone(),
        LayoutKind::Grid,
        Box::new(|_| {}),
    );
    wait_for_frames(&surface, 1).await;
    drop(handle);
    tokio::time::sleep(Duration::from_millis(50)).await;

    store.merge(translate(&scan_result()).nodes);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(surface.count(), 1);
}
