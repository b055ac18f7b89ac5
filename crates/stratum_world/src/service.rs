//! # World Event Glue
//!
//! [`WorldService`] is the voxel world's face on the event bus: it loads
//! the spawn region on start, drains the physics queue and completes
//! replication passes on tick, answers the per-peer handshake, and fans
//! replicated-data notifications out to the peers that know each node.
//!
//! Everything here runs on the owner thread; the shared handles are plain
//! `Rc<RefCell<..>>` clones of what the server composition owns.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use stratum_core::{Event, EventBus, EventKind, Module, Replicate};
use stratum_net::messages::{
    encode_node_voxel_data_updated, InitMessage, MSG_GET_SECTION, MSG_INIT,
    MSG_NODE_VOXEL_DATA_UPDATED,
};
use stratum_net::Outbox;
use stratum_task::ThreadPool;

use crate::coords::SectionPos;
use crate::mesh::ChunkMeshTask;
use crate::world::World;

/// Owner-thread shared world handle.
pub type SharedWorld = Rc<RefCell<World>>;

/// Owner-thread shared replication facade.
pub type SharedReplicate = Rc<RefCell<Replicate>>;

/// Owner-thread shared outbox.
pub type SharedOutbox = Rc<RefCell<Outbox>>;

const SUBSCRIPTIONS: &[EventKind] = &[
    EventKind::Start,
    EventKind::Continue,
    EventKind::Unload,
    EventKind::Tick,
    EventKind::ClientConnected,
    EventKind::FilesTransmitted,
    EventKind::PacketReceived,
    EventKind::NodeVoxelDataUpdated,
];

/// The voxel world's event bus module.
pub struct WorldService {
    world: SharedWorld,
    replicate: SharedReplicate,
    outbox: SharedOutbox,
    mesh_pool: Option<Rc<ThreadPool>>,
}

impl WorldService {
    /// Creates the service over shared collaborator handles.
    #[must_use]
    pub fn new(world: SharedWorld, replicate: SharedReplicate, outbox: SharedOutbox) -> Self {
        Self {
            world,
            replicate,
            outbox,
            mesh_pool: None,
        }
    }

    /// Attaches a worker pool; every replicated chunk update then also
    /// schedules an off-thread mesh rebuild.
    #[must_use]
    pub fn with_mesh_pool(mut self, pool: Rc<ThreadPool>) -> Self {
        self.mesh_pool = Some(pool);
        self
    }

    fn load_spawn_region(&self, bus: &mut EventBus) {
        let mut world = self.world.borrow_mut();
        let min = world.config().spawn_sections_min;
        let max = world.config().spawn_sections_max;
        for z in min[2]..=max[2] {
            for y in min[1]..=max[1] {
                for x in min[0]..=max[0] {
                    world.load_or_generate_section(SectionPos::new(x, y, z), bus);
                }
            }
        }
    }
}

impl Module for WorldService {
    fn id(&self) -> &'static str {
        "voxelworld"
    }

    fn subscriptions(&self) -> &[EventKind] {
        SUBSCRIPTIONS
    }

    fn handle_event(&mut self, event: &Event, bus: &mut EventBus) {
        match event {
            Event::Start | Event::Continue => self.load_spawn_region(bus),

            Event::Unload => {
                let mut replicate = self.replicate.borrow_mut();
                self.world.borrow_mut().unload(&mut replicate);
            }

            Event::Tick { .. } => {
                self.world.borrow_mut().run_physics_updates();
                // The tick closes one replication pass; deferred
                // node-updated events become visible now.
                self.replicate.borrow_mut().sync(bus);
            }

            Event::ClientConnected { peer } => {
                trace!(peer, "client connected");
            }

            Event::FilesTransmitted { peer } => {
                let world = self.world.borrow();
                let init = InitMessage {
                    chunk_size_voxels: world.config().chunk_size_voxels,
                    section_size_chunks: world.config().section_size_chunks,
                };
                debug!(peer, "sending world parameters");
                self.outbox.borrow_mut().send(*peer, MSG_INIT, init.encode());
            }

            Event::PacketReceived {
                peer,
                name,
                payload,
            } if name == MSG_GET_SECTION => {
                match stratum_net::messages::decode_get_section(payload) {
                    Ok(section_p) => {
                        debug!(peer, ?section_p, "section requested");
                    }
                    Err(err) => warn!(peer, error = %err, "bad get_section payload"),
                }
            }
            Event::PacketReceived { .. } => {}

            Event::NodeVoxelDataUpdated { node_id } => {
                let peers = self.replicate.borrow().peers_knowing_node(*node_id);
                if !peers.is_empty() {
                    let payload = encode_node_voxel_data_updated(*node_id);
                    let mut outbox = self.outbox.borrow_mut();
                    for peer in peers {
                        outbox.send(peer, MSG_NODE_VOXEL_DATA_UPDATED, payload.clone());
                    }
                }
                if let Some(pool) = &self.mesh_pool {
                    let world = self.world.borrow();
                    pool.add_task(Box::new(ChunkMeshTask::new(
                        world.scene().clone(),
                        Arc::clone(world.registry()),
                        *node_id,
                        world.config().mesh_lod,
                    )));
                }
            }

            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratum_core::SceneHandle;
    use stratum_net::frame::FRAME_TYPE_REGISTRATION;
    use crate::config::WorldConfig;
    use crate::coords::ChunkPos;
    use crate::voxel::{VoxelInstance, VoxelRegistry};
    use crate::VoxelPos;

    fn service_fixture() -> (WorldService, SharedWorld, SharedReplicate, SharedOutbox) {
        let config = WorldConfig {
            chunk_size_voxels: [8, 8, 8],
            spawn_sections_min: [0, 0, 0],
            spawn_sections_max: [0, 0, 0],
            ..WorldConfig::default()
        };
        let world = Rc::new(RefCell::new(World::new(
            config,
            Arc::new(VoxelRegistry::with_defaults()),
            SceneHandle::new(),
        )));
        let replicate = Rc::new(RefCell::new(Replicate::new()));
        let outbox = Rc::new(RefCell::new(Outbox::new()));
        let service = WorldService::new(
            Rc::clone(&world),
            Rc::clone(&replicate),
            Rc::clone(&outbox),
        );
        (service, world, replicate, outbox)
    }

    #[test]
    fn test_start_loads_spawn_region_once() {
        let (mut service, world, _, _) = service_fixture();
        let mut bus = EventBus::new();
        service.handle_event(&Event::Start, &mut bus);
        assert!(world.borrow().has_section(SectionPos::new(0, 0, 0)));
        assert!(matches!(bus.pop(), Some(Event::GenerationRequest { .. })));
        assert!(bus.pop().is_none());

        // Continue after start re-requests nothing.
        service.handle_event(&Event::Continue, &mut bus);
        assert!(bus.pop().is_none());
    }

    #[test]
    fn test_files_transmitted_sends_init() {
        let (mut service, _, _, outbox) = service_fixture();
        let mut bus = EventBus::new();
        service.handle_event(&Event::FilesTransmitted { peer: 9 }, &mut bus);

        let frames = outbox.borrow_mut().take_frames(9);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].frame_type, FRAME_TYPE_REGISTRATION);
        let init = InitMessage::decode(&frames[1].payload).unwrap();
        assert_eq!(init.chunk_size_voxels, [8, 8, 8]);
        assert_eq!(init.section_size_chunks, [2, 2, 2]);
    }

    #[test]
    fn test_tick_completes_replication_pass_then_notifies_peers() {
        let (mut service, world, replicate, outbox) = service_fixture();
        let mut bus = EventBus::new();
        service.handle_event(&Event::Start, &mut bus);
        bus.pop();

        // A committed write defers its notification to after the pass.
        world
            .borrow_mut()
            .set_voxel(VoxelPos::new(0, 0, 0), VoxelInstance::new(2), false);
        {
            let mut replicate = replicate.borrow_mut();
            world.borrow_mut().commit(&mut replicate);
        }
        assert!(bus.is_empty());

        let node_id = {
            let world = world.borrow();
            let section = world.section(SectionPos::new(0, 0, 0)).unwrap();
            section.node_id_at(ChunkPos::new(0, 0, 0))
        };
        replicate.borrow_mut().mark_node_known_by(4, node_id);

        service.handle_event(&Event::Tick { tick: 1, dt: 0.1 }, &mut bus);
        let event = bus.pop().expect("deferred event after sync");
        assert!(matches!(event, Event::NodeVoxelDataUpdated { .. }));

        service.handle_event(&event, &mut bus);
        let frames = outbox.borrow_mut().take_frames(4);
        // Registration plus the notification itself.
        assert_eq!(frames.len(), 2);
        assert_eq!(
            stratum_net::messages::decode_node_voxel_data_updated(&frames[1].payload).unwrap(),
            node_id
        );
    }

    #[test]
    fn test_tick_drains_physics_queue() {
        let (mut service, world, replicate, _) = service_fixture();
        let mut bus = EventBus::new();
        service.handle_event(&Event::Start, &mut bus);
        world
            .borrow_mut()
            .set_voxel(VoxelPos::new(1, 1, 1), VoxelInstance::new(2), false);
        {
            let mut replicate = replicate.borrow_mut();
            world.borrow_mut().commit(&mut replicate);
        }
        assert_eq!(world.borrow().physics_queue().len(), 1);

        service.handle_event(&Event::Tick { tick: 1, dt: 0.1 }, &mut bus);
        assert!(world.borrow().physics_queue().is_empty());
    }

    #[test]
    fn test_get_section_packet_is_informational() {
        let (mut service, _, _, outbox) = service_fixture();
        let mut bus = EventBus::new();
        service.handle_event(
            &Event::PacketReceived {
                peer: 2,
                name: MSG_GET_SECTION.to_owned(),
                payload: stratum_net::messages::encode_get_section([1, 0, -1]),
            },
            &mut bus,
        );
        // No reply, no events: decoded coordinate is only logged.
        assert!(bus.is_empty());
        assert_eq!(outbox.borrow().pending(2), 0);

        // A truncated payload is warned about, never fatal.
        service.handle_event(
            &Event::PacketReceived {
                peer: 2,
                name: MSG_GET_SECTION.to_owned(),
                payload: vec![1, 2],
            },
            &mut bus,
        );
    }

    #[test]
    fn test_node_update_without_known_peers_sends_nothing() {
        let (mut service, _, _, outbox) = service_fixture();
        let mut bus = EventBus::new();
        service.handle_event(&Event::NodeVoxelDataUpdated { node_id: 123 }, &mut bus);
        assert!(outbox.borrow().peers_with_pending().is_empty());
    }
}
