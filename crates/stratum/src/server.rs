//! # Server Composition and Tick Loop
//!
//! Owns the owner thread: the event bus, the module list, the worker
//! pool, and the fixed-interval tick. Each tick dispatches pending
//! events (which drains physics updates and completes a replication pass
//! inside the world service), then grants the pool its bounded
//! post-processing window.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use stratum_core::{dispatch, Event, EventBus, Module, Replicate, SceneHandle};
use stratum_net::Outbox;
use stratum_task::{PoolError, ThreadPool};
use stratum_world::service::{SharedOutbox, SharedReplicate, SharedWorld};
use stratum_world::{VoxelRegistry, World, WorldService};

use crate::config::ServerConfig;
use crate::worldgen::WorldGen;

/// Cancellation signal delivered to the tick loop.
///
/// Replaces process-global state: whoever owns the signal source (the
/// binary's interrupt hook, a test, an embedder) requests the stop, and
/// the loop observes it at the next tick boundary.
#[derive(Clone, Debug, Default)]
pub struct ShutdownFlag {
    inner: Arc<AtomicBool>,
}

impl ShutdownFlag {
    /// Creates an unraised flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a clean stop.
    pub fn request(&self) {
        self.inner.store(true, Ordering::Release);
    }

    /// Whether a stop has been requested.
    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.inner.load(Ordering::Acquire)
    }
}

/// The composed server.
pub struct Server {
    bus: EventBus,
    modules: Vec<Box<dyn Module>>,
    pool: Rc<ThreadPool>,
    world: SharedWorld,
    replicate: SharedReplicate,
    outbox: SharedOutbox,
    shutdown: ShutdownFlag,
    tick_interval: Duration,
    tick_count: u64,
}

impl Server {
    /// Builds the full composition and starts the worker pool.
    ///
    /// # Errors
    ///
    /// [`PoolError`] when worker threads cannot be spawned; fatal.
    pub fn new(config: ServerConfig) -> Result<Self, PoolError> {
        let scene = SceneHandle::new();
        let registry = Arc::new(VoxelRegistry::with_defaults());
        let world: SharedWorld = Rc::new(RefCell::new(World::new(
            config.world.clone(),
            registry,
            scene,
        )));
        let replicate: SharedReplicate = Rc::new(RefCell::new(Replicate::new()));
        let outbox: SharedOutbox = Rc::new(RefCell::new(Outbox::new()));

        let mut pool = ThreadPool::new();
        pool.start(config.workers.max(1))?;
        let pool = Rc::new(pool);

        let service = WorldService::new(
            Rc::clone(&world),
            Rc::clone(&replicate),
            Rc::clone(&outbox),
        )
        .with_mesh_pool(Rc::clone(&pool));
        let worldgen = WorldGen::new(
            Rc::clone(&world),
            Rc::clone(&replicate),
            config.worldgen_seed,
            config.generation_sections_per_tick,
        );

        Ok(Self {
            bus: EventBus::new(),
            modules: vec![Box::new(service), Box::new(worldgen)],
            pool,
            world,
            replicate,
            outbox,
            shutdown: ShutdownFlag::new(),
            tick_interval: Duration::from_millis(config.tick_interval_ms.max(1)),
            tick_count: 0,
        })
    }

    /// The loop's cancellation flag; clone it into signal hooks.
    #[must_use]
    pub fn shutdown_flag(&self) -> ShutdownFlag {
        self.shutdown.clone()
    }

    /// The shared world handle.
    #[must_use]
    pub fn world(&self) -> &SharedWorld {
        &self.world
    }

    /// The shared replication facade.
    #[must_use]
    pub fn replicate(&self) -> &SharedReplicate {
        &self.replicate
    }

    /// The shared outbox.
    #[must_use]
    pub fn outbox(&self) -> &SharedOutbox {
        &self.outbox
    }

    /// Emits an event for the next dispatch; the seam external inputs
    /// (network, file transfers) feed into.
    pub fn emit(&mut self, event: Event) {
        self.bus.emit(event);
    }

    /// Dispatches the startup event.
    pub fn bootstrap(&mut self) {
        debug!("bootstrap");
        self.bus.emit(Event::Start);
        dispatch(&mut self.bus, &mut self.modules);
    }

    /// Runs one tick: event dispatch, then the pool's post window.
    pub fn tick_once(&mut self, dt: f32) {
        self.tick_count += 1;
        self.bus.emit(Event::Tick {
            tick: self.tick_count,
            dt,
        });
        dispatch(&mut self.bus, &mut self.modules);
        self.pool.run_post();
    }

    /// Ticks at the configured interval until a stop is requested.
    pub fn run(&mut self) {
        info!(
            interval_ms = self.tick_interval.as_millis() as u64,
            "entering tick loop"
        );
        let mut previous = Instant::now();
        while !self.shutdown.is_requested() {
            let started = Instant::now();
            let dt = started.duration_since(previous).as_secs_f32();
            previous = started;

            self.tick_once(dt);

            let spent = started.elapsed();
            if spent < self.tick_interval {
                std::thread::sleep(self.tick_interval - spent);
            }
        }
        info!(ticks = self.tick_count, "tick loop stopped");
    }

    /// Unloads the world and winds the pool down.
    pub fn shutdown(&mut self) {
        debug!("shutdown");
        self.bus.emit(Event::Unload);
        dispatch(&mut self.bus, &mut self.modules);
        self.pool.run_post();
        self.pool.request_stop();
        // Dropping the modules releases their pool handles so the join in
        // the pool's drop is not observed by anyone still submitting.
        self.modules.clear();
    }

    /// Ticks executed so far.
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratum_world::{SectionPos, VoxelPos, WorldConfig};

    fn small_server() -> Server {
        let config = ServerConfig {
            world: WorldConfig {
                chunk_size_voxels: [8, 8, 8],
                spawn_sections_min: [0, 0, 0],
                spawn_sections_max: [0, 0, 0],
                ..WorldConfig::default()
            },
            workers: 1,
            ..ServerConfig::default()
        };
        Server::new(config).unwrap()
    }

    #[test]
    fn test_bootstrap_loads_spawn_sections() {
        let mut server = small_server();
        server.bootstrap();
        assert!(server
            .world()
            .borrow()
            .has_section(SectionPos::new(0, 0, 0)));
        server.shutdown();
    }

    #[test]
    fn test_ticks_generate_and_flush_terrain() {
        let mut server = small_server();
        server.bootstrap();
        // Tick 1 generates and commits; tick 2 completes the replication
        // pass and dispatches the node-updated follow-ups.
        server.tick_once(0.1);
        server.tick_once(0.1);

        let ground = server
            .world()
            .borrow_mut()
            .get_voxel(VoxelPos::new(0, 0, 0), false);
        assert!(server.world().borrow().registry().is_solid(ground));
        // The read attached a buffer; generation itself left none behind.
        assert!(server.world().borrow().num_buffers_loaded() <= 1);
        server.shutdown();
    }

    #[test]
    fn test_shutdown_flag_stops_run_loop() {
        let mut server = small_server();
        server.bootstrap();
        let flag = server.shutdown_flag();
        flag.request();
        // With the flag raised beforehand the loop exits immediately.
        server.run();
        assert_eq!(server.tick_count(), 0);
        server.shutdown();
    }

    #[test]
    fn test_files_transmitted_round_trip_through_server() {
        let mut server = small_server();
        server.bootstrap();
        server.emit(Event::FilesTransmitted { peer: 3 });
        server.tick_once(0.1);
        assert!(server.outbox().borrow().pending(3) >= 2);
        server.shutdown();
    }
}
