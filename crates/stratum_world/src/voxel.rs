//! # Voxel Instances and the Voxel Registry
//!
//! A voxel instance is one 32-bit word: a type id in the low bits and
//! packed auxiliary attributes (rotation, damage, light - interpretation
//! belongs to the type's handler) in the high bits. The registry maps type
//! ids to definitions; ids are assigned in insertion order starting at 1,
//! and id 0 is reserved for "undefined".

use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};

/// Numeric id of a voxel type in the registry.
pub type VoxelTypeId = u32;

/// One cell of the voxel lattice. Value semantics throughout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
#[repr(transparent)]
pub struct VoxelInstance {
    /// Packed word: type id in the low bits, attributes above.
    pub data: u32,
}

impl VoxelInstance {
    /// Bits of the word carrying the type id.
    pub const ID_MASK: u32 = 0x001f_ffff;

    /// The reserved "undefined" instance (type id 0).
    pub const UNDEFINED: Self = Self { data: 0 };

    /// Creates an instance of the given type with zeroed attributes.
    #[inline]
    #[must_use]
    pub const fn new(id: VoxelTypeId) -> Self {
        Self {
            data: id & Self::ID_MASK,
        }
    }

    /// Creates an instance with explicit attribute bits.
    #[inline]
    #[must_use]
    pub const fn with_attributes(id: VoxelTypeId, attributes: u32) -> Self {
        Self {
            data: (id & Self::ID_MASK) | (attributes << 21),
        }
    }

    /// The type id.
    #[inline]
    #[must_use]
    pub const fn id(self) -> VoxelTypeId {
        self.data & Self::ID_MASK
    }

    /// The packed attribute bits.
    #[inline]
    #[must_use]
    pub const fn attributes(self) -> u32 {
        self.data >> 21
    }

    /// Returns true for the reserved undefined instance.
    #[inline]
    #[must_use]
    pub const fn is_undefined(self) -> bool {
        self.id() == 0
    }
}

/// Edge material class, used by the mesher to pick seam handling.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum EdgeMaterialId {
    /// No geometry at all (air and the undefined voxel).
    #[default]
    Empty = 0,
    /// Ground-like surface.
    Ground = 1,
}

/// Reference to the texture of one voxel face.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FaceTexture {
    /// Resource name of the texture, empty for untextured faces.
    pub resource_name: String,
}

/// Definition of one voxel type.
#[derive(Clone, Debug, Default)]
pub struct VoxelDefinition {
    /// Registry name, unique.
    pub name: String,
    /// Per-face textures in -x, +x, -y, +y, -z, +z order.
    pub textures: [FaceTexture; 6],
    /// Edge material class.
    pub edge_material: EdgeMaterialId,
    /// Whether the voxel participates in collision geometry.
    pub physically_solid: bool,
}

impl VoxelDefinition {
    /// Creates a definition with one texture on all six faces.
    #[must_use]
    pub fn with_uniform_texture(
        name: &str,
        resource_name: &str,
        edge_material: EdgeMaterialId,
        physically_solid: bool,
    ) -> Self {
        Self {
            name: name.to_owned(),
            textures: std::array::from_fn(|_| FaceTexture {
                resource_name: resource_name.to_owned(),
            }),
            edge_material,
            physically_solid,
        }
    }
}

/// Registry of voxel definitions, indexed by type id.
#[derive(Debug)]
pub struct VoxelRegistry {
    defs: Vec<VoxelDefinition>,
    by_name: HashMap<String, VoxelTypeId>,
}

impl VoxelRegistry {
    /// Creates a registry holding only the reserved undefined type.
    #[must_use]
    pub fn new() -> Self {
        Self {
            defs: vec![VoxelDefinition {
                name: "undefined".to_owned(),
                ..VoxelDefinition::default()
            }],
            by_name: HashMap::new(),
        }
    }

    /// Creates a registry pre-populated with the stock voxel set:
    /// `air` (1), `rock` (2), `dirt` (3), `grass` (4), `leaves` (5).
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.add_voxel(VoxelDefinition::with_uniform_texture(
            "air",
            "",
            EdgeMaterialId::Empty,
            false,
        ));
        for (name, texture) in [
            ("rock", "main/rock.png"),
            ("dirt", "main/dirt.png"),
            ("grass", "main/grass.png"),
            ("leaves", "main/leaves.png"),
        ] {
            registry.add_voxel(VoxelDefinition::with_uniform_texture(
                name,
                texture,
                EdgeMaterialId::Ground,
                true,
            ));
        }
        registry
    }

    /// Registers a definition and returns its assigned id.
    pub fn add_voxel(&mut self, def: VoxelDefinition) -> VoxelTypeId {
        let id = self.defs.len() as VoxelTypeId;
        self.by_name.insert(def.name.clone(), id);
        self.defs.push(def);
        id
    }

    /// Returns the definition of a type id, `None` for unknown ids and for
    /// the reserved id 0.
    #[must_use]
    pub fn get(&self, id: VoxelTypeId) -> Option<&VoxelDefinition> {
        if id == 0 {
            return None;
        }
        self.defs.get(id as usize)
    }

    /// Resolves a definition name to its id.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<VoxelTypeId> {
        self.by_name.get(name).copied()
    }

    /// Whether an instance contributes collision geometry. Unknown and
    /// undefined types do not.
    #[inline]
    #[must_use]
    pub fn is_solid(&self, v: VoxelInstance) -> bool {
        self.get(v.id()).is_some_and(|d| d.physically_solid)
    }

    /// Number of definitions including the reserved one.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.defs.len()
    }

    /// Never true: the reserved definition always exists.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

impl Default for VoxelRegistry {
    fn default() -> Self {
        Self::new()
    }
}
