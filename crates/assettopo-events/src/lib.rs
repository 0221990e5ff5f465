use assettopo_core::{NodeId, Side};
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};

pub mod telemetry;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Event {
    // ========================================================================
    // Rendering surface -> engine
    // ========================================================================
    /// The expand control of a node was clicked. Toggles: expands a collapsed
    /// node, collapses an expanded one.
    NodeExpandClicked {
        id: NodeId,
        side: Side,
    },
    /// Explicit collapse request, e.g. from a context menu.
    NodeCollapseClicked {
        id: NodeId,
        side: Side,
    },
    /// Navigation intent (double click on a node). Opaque to the layout engine.
    NodeActivated {
        id: NodeId,
    },

    // ========================================================================
    // Engine -> host
    // ========================================================================
    TopologyLoaded {
        node_count: usize,
        edge_count: usize,
    },
    ExpansionCompleted {
        id: NodeId,
        added_nodes: usize,
        added_edges: usize,
    },
    ExpansionFailed {
        id: NodeId,
        error: String,
    },
    NodeCollapsed {
        id: NodeId,
        side: Side,
    },
}

#[derive(Clone)]
pub struct EventBus {
    tx: Sender<Event>,
    rx: Receiver<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn sender(&self) -> Sender<Event> {
        self.tx.clone()
    }

    pub fn receiver(&self) -> Receiver<Event> {
        self.rx.clone()
    }

    pub fn publish(&self, event: Event) {
        let _ = self.tx.send(event);
    }

    /// Drain all pending events without blocking.
    pub fn drain(&self) -> Vec<Event> {
        self.rx.try_iter().collect()
    }

    /// Dispatch all pending events to a listener.
    /// This is useful for processing events in the UI loop.
    pub fn dispatch_to<L: EventListener>(&self, listener: &mut L) {
        while let Ok(event) = self.rx.try_recv() {
            listener.handle_event(&event);
        }
    }
}

/// Trait for components that respond to events.
/// Implement this to receive events from the EventBus.
pub trait EventListener {
    fn handle_event(&mut self, event: &Event);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_bus_publish_receive() {
        let bus = EventBus::new();
        let sender = bus.sender();
        let receiver = bus.receiver();

        sender
            .send(Event::NodeExpandClicked {
                id: NodeId::from("42"),
                side: Side::Downstream,
            })
            .unwrap();

        match receiver.recv().unwrap() {
            Event::NodeExpandClicked { id, side } => {
                assert_eq!(id, NodeId::from("42"));
                assert_eq!(side, Side::Downstream);
            }
            _ => panic!("Expected NodeExpandClicked event"),
        }
    }

    #[test]
    fn test_dispatch_to_listener_in_order() {
        struct Recorder(Vec<Event>);
        impl EventListener for Recorder {
            fn handle_event(&mut self, event: &Event) {
                self.0.push(event.clone());
            }
        }

        let bus = EventBus::new();
        bus.publish(Event::NodeActivated {
            id: NodeId::from("1"),
        });
        bus.publish(Event::NodeCollapseClicked {
            id: NodeId::from("2"),
            side: Side::Upstream,
        });

        let mut recorder = Recorder(Vec::new());
        bus.dispatch_to(&mut recorder);

        assert_eq!(recorder.0.len(), 2);
        assert!(matches!(recorder.0[0], Event::NodeActivated { .. }));
        assert!(bus.drain().is_empty());
    }

    #[test]
    fn test_event_serialization() {
        let event = Event::NodeExpandClicked {
            id: NodeId::from("7"),
            side: Side::Upstream,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"NodeExpandClicked":{"id":"7","side":"src"}}"#);
    }
}
