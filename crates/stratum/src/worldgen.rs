//! # Worldgen Module
//!
//! Answers `voxelworld:generation_request` events by filling sections with
//! a deterministic layered heightfield: rock under dirt under one grass
//! course, air above. Requests queue up and are worked off a few sections
//! per tick so generation never stalls the owner loop; each generated
//! section is committed immediately.
//!
//! The heightfield is hashed value noise - integer lattice, bilinear
//! interpolation, two octaves. Same seed, same world.

use std::collections::VecDeque;

use tracing::{debug, warn};

use stratum_core::{Event, EventBus, EventKind, Module};
use stratum_world::service::{SharedReplicate, SharedWorld};
use stratum_world::{SectionPos, VoxelInstance, VoxelPos};

/// Lattice spacing of the base noise octave, in voxels.
const LATTICE: i32 = 16;

/// Height added on top of the noise so the surface never sits below zero.
const BASE_HEIGHT: i32 = 2;

/// Peak-to-peak amplitude of the noise, in voxels.
const AMPLITUDE: i32 = 8;

const SUBSCRIPTIONS: &[EventKind] = &[EventKind::GenerationRequest, EventKind::Tick];

/// The built-in terrain generator module.
pub struct WorldGen {
    world: SharedWorld,
    replicate: SharedReplicate,
    seed: u64,
    sections_per_tick: usize,
    queue: VecDeque<SectionPos>,
}

impl WorldGen {
    /// Creates the generator.
    #[must_use]
    pub fn new(
        world: SharedWorld,
        replicate: SharedReplicate,
        seed: u64,
        sections_per_tick: usize,
    ) -> Self {
        Self {
            world,
            replicate,
            seed,
            sections_per_tick: sections_per_tick.max(1),
            queue: VecDeque::new(),
        }
    }

    /// Sections still waiting for generation.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    fn generate_section(&self, section_p: SectionPos) {
        let mut world = self.world.borrow_mut();
        let region = world.get_section_region_voxels(section_p);
        debug!(?section_p, ?region, "generating section");

        let ids = {
            let registry = world.registry();
            (
                registry.find_by_name("air"),
                registry.find_by_name("rock"),
                registry.find_by_name("dirt"),
                registry.find_by_name("grass"),
            )
        };
        let (Some(air), Some(rock), Some(dirt), Some(grass)) = ids else {
            warn!("voxel registry is missing stock types; skipping generation");
            return;
        };

        let lc = region.lower();
        let uc = region.upper();
        for z in lc[2]..=uc[2] {
            for x in lc[0]..=uc[0] {
                let surface = height_at(self.seed, x, z);
                for y in lc[1]..=uc[1] {
                    let id = if y < surface - 5 {
                        rock
                    } else if y < surface {
                        dirt
                    } else if y == surface {
                        grass
                    } else {
                        air
                    };
                    world.set_voxel(VoxelPos::new(x, y, z), VoxelInstance::new(id), true);
                }
            }
        }
    }
}

impl Module for WorldGen {
    fn id(&self) -> &'static str {
        "worldgen"
    }

    fn subscriptions(&self) -> &[EventKind] {
        SUBSCRIPTIONS
    }

    fn handle_event(&mut self, event: &Event, bus: &mut EventBus) {
        match event {
            Event::GenerationRequest { section_p } => {
                self.queue.push_back(SectionPos::from_array(*section_p));
                bus.emit(Event::QueueModified {
                    queue_size: self.queue.len(),
                });
            }
            Event::Tick { .. } => {
                if self.queue.is_empty() {
                    return;
                }
                for _ in 0..self.sections_per_tick {
                    let Some(section_p) = self.queue.pop_front() else {
                        break;
                    };
                    self.generate_section(section_p);
                }
                {
                    let mut replicate = self.replicate.borrow_mut();
                    self.world.borrow_mut().commit(&mut replicate);
                }
                bus.emit(Event::QueueModified {
                    queue_size: self.queue.len(),
                });
            }
            _ => {}
        }
    }
}

/// Surface height at a column, `BASE_HEIGHT ..= BASE_HEIGHT + AMPLITUDE`.
fn height_at(seed: u64, x: i32, z: i32) -> i32 {
    let coarse = value_noise(seed, x, z, LATTICE);
    let fine = value_noise(seed.wrapping_add(0x9e37), x, z, LATTICE / 4);
    // Two octaves, the fine one at quarter weight.
    let blended = (coarse * 4 + fine) / 5;
    BASE_HEIGHT + (blended * AMPLITUDE) / NOISE_SCALE
}

/// Fixed-point scale of the noise samples.
const NOISE_SCALE: i32 = 1024;

/// Bilinear hashed value noise in `0..NOISE_SCALE`.
fn value_noise(seed: u64, x: i32, z: i32, lattice: i32) -> i32 {
    let cell_x = x.div_euclid(lattice);
    let cell_z = z.div_euclid(lattice);
    let fx = x.rem_euclid(lattice);
    let fz = z.rem_euclid(lattice);

    let corner = |cx: i32, cz: i32| lattice_value(seed, cx, cz);
    let c00 = corner(cell_x, cell_z);
    let c10 = corner(cell_x + 1, cell_z);
    let c01 = corner(cell_x, cell_z + 1);
    let c11 = corner(cell_x + 1, cell_z + 1);

    let top = c00 * (lattice - fx) + c10 * fx;
    let bottom = c01 * (lattice - fx) + c11 * fx;
    (top * (lattice - fz) + bottom * fz) / (lattice * lattice)
}

/// Deterministic lattice sample in `0..NOISE_SCALE`.
fn lattice_value(seed: u64, cx: i32, cz: i32) -> i32 {
    let mut h = seed
        ^ (cx as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15)
        ^ (cz as u64).wrapping_mul(0xc2b2_ae3d_27d4_eb4f);
    h ^= h >> 33;
    h = h.wrapping_mul(0xff51_afd7_ed55_8ccd);
    h ^= h >> 33;
    (h % NOISE_SCALE as u64) as i32
}
