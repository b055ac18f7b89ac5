//! # Event Bus
//!
//! Inter-subsystem communication for the server core.
//!
//! Events are the "API" between modules: the tick loop, the voxel world,
//! worldgen and the network glue only ever see each other through the bus.
//! Modules declare which event kinds they handle; dispatch is synchronous on
//! the owner thread and panic-isolated so a failing handler never unwinds
//! the event loop.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::error;

use crate::replicate::PeerId;
use crate::scene::NodeId;

/// Events that flow between modules.
///
/// The wire-facing names of these events (`core:start`,
/// `network:packet_received/<name>`, ...) are reported by
/// [`Event::bus_name`].
#[derive(Clone, Debug)]
pub enum Event {
    /// Server startup; modules create their initial world state.
    Start,
    /// Server resume after a soft module reload. Same effects as `Start`.
    Continue,
    /// Server teardown; modules flush and release external state.
    Unload,
    /// One fixed-interval tick.
    Tick {
        /// Monotonic tick counter.
        tick: u64,
        /// Seconds since the previous tick.
        dt: f32,
    },
    /// A client completed its connection handshake.
    ClientConnected {
        /// The connecting peer.
        peer: PeerId,
    },
    /// Static files finished transmitting to a peer; the peer is ready for
    /// module init payloads.
    FilesTransmitted {
        /// The receiving peer.
        peer: PeerId,
    },
    /// A named packet arrived from a peer.
    PacketReceived {
        /// The sending peer.
        peer: PeerId,
        /// Canonical packet name, e.g. `voxelworld:get_section`.
        name: String,
        /// Raw payload bytes.
        payload: Vec<u8>,
    },
    /// A chunk node's voxel data has been replicated to clients.
    NodeVoxelDataUpdated {
        /// The chunk node.
        node_id: NodeId,
    },
    /// A section needs generated content.
    GenerationRequest {
        /// Section coordinate.
        section_p: [i16; 3],
    },
    /// The worldgen work queue changed size.
    QueueModified {
        /// Jobs remaining in the queue.
        queue_size: usize,
    },
}

/// Discriminator for event subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    /// `core:start`
    Start,
    /// `core:continue`
    Continue,
    /// `core:unload`
    Unload,
    /// `core:tick`
    Tick,
    /// `network:client_connected`
    ClientConnected,
    /// `client_file:files_transmitted`
    FilesTransmitted,
    /// `network:packet_received/<name>`
    PacketReceived,
    /// `voxelworld:node_voxel_data_updated`
    NodeVoxelDataUpdated,
    /// `voxelworld:generation_request`
    GenerationRequest,
    /// `worldgen:queue_modified`
    QueueModified,
}

impl Event {
    /// Returns the event's subscription discriminator.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Start => EventKind::Start,
            Self::Continue => EventKind::Continue,
            Self::Unload => EventKind::Unload,
            Self::Tick { .. } => EventKind::Tick,
            Self::ClientConnected { .. } => EventKind::ClientConnected,
            Self::FilesTransmitted { .. } => EventKind::FilesTransmitted,
            Self::PacketReceived { .. } => EventKind::PacketReceived,
            Self::NodeVoxelDataUpdated { .. } => EventKind::NodeVoxelDataUpdated,
            Self::GenerationRequest { .. } => EventKind::GenerationRequest,
            Self::QueueModified { .. } => EventKind::QueueModified,
        }
    }

    /// Returns the canonical bus name of the event.
    ///
    /// Packet events carry their packet name in the channel suffix.
    #[must_use]
    pub fn bus_name(&self) -> String {
        match self {
            Self::Start => "core:start".to_owned(),
            Self::Continue => "core:continue".to_owned(),
            Self::Unload => "core:unload".to_owned(),
            Self::Tick { .. } => "core:tick".to_owned(),
            Self::ClientConnected { .. } => "network:client_connected".to_owned(),
            Self::FilesTransmitted { .. } => "client_file:files_transmitted".to_owned(),
            Self::PacketReceived { name, .. } => {
                format!("network:packet_received/{name}")
            }
            Self::NodeVoxelDataUpdated { .. } => "voxelworld:node_voxel_data_updated".to_owned(),
            Self::GenerationRequest { .. } => "voxelworld:generation_request".to_owned(),
            Self::QueueModified { .. } => "worldgen:queue_modified".to_owned(),
        }
    }
}

/// A subsystem that receives events from the bus.
pub trait Module {
    /// Stable identifier used in dispatch failure logs.
    fn id(&self) -> &'static str;

    /// Event kinds this module wants delivered.
    fn subscriptions(&self) -> &[EventKind];

    /// Handles one event. May emit follow-up events into `bus`; they are
    /// dispatched after the current event completes.
    fn handle_event(&mut self, event: &Event, bus: &mut EventBus);
}

/// FIFO queue of pending events.
#[derive(Debug, Default)]
pub struct EventBus {
    queue: VecDeque<Event>,
}

impl EventBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }

    /// Enqueues an event for dispatch.
    pub fn emit(&mut self, event: Event) {
        self.queue.push_back(event);
    }

    /// Pops the oldest pending event.
    pub fn pop(&mut self) -> Option<Event> {
        self.queue.pop_front()
    }

    /// Number of pending events.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns true if no events are pending.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Dispatches every pending event to every subscribed module, in order.
///
/// A panicking handler is logged and skipped; the loop itself never unwinds.
/// Events emitted by handlers are dispatched in the same call.
pub fn dispatch(bus: &mut EventBus, modules: &mut [Box<dyn Module>]) {
    while let Some(event) = bus.pop() {
        let kind = event.kind();
        for module in modules.iter_mut() {
            if !module.subscriptions().contains(&kind) {
                continue;
            }
            let result = catch_unwind(AssertUnwindSafe(|| {
                module.handle_event(&event, bus);
            }));
            if result.is_err() {
                error!(
                    module = module.id(),
                    event = %event.bus_name(),
                    "event handler panicked; continuing"
                );
            }
        }
    }
}
