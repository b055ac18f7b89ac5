//! # Scene Node Store
//!
//! A keyed store of opaque nodes. Each node carries a name and a set of
//! named binary variables; the voxel world keeps one node per chunk and
//! stores the serialized chunk blob under the `buildat_voxel_data` variable.
//!
//! ## Access Discipline
//!
//! The store is not internally synchronized. All access goes through
//! [`SceneHandle::access`], which runs the supplied closure while holding
//! the store's exclusive lock. Holding node references across the gate is
//! impossible by construction; node identity outside the gate is always the
//! integer [`NodeId`].

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

/// Identifier of a node in the scene. Id 0 is the "no node" sentinel and is
/// never assigned.
pub type NodeId = u32;

/// An opaque scene object: a name plus named binary variables.
#[derive(Clone, Debug, Default)]
pub struct Node {
    id: NodeId,
    name: String,
    vars: HashMap<String, Vec<u8>>,
}

impl Node {
    /// Returns the node's id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Returns the node's name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stores a binary variable under `key`, replacing any previous value.
    pub fn set_var(&mut self, key: &str, value: Vec<u8>) {
        self.vars.insert(key.to_owned(), value);
    }

    /// Returns the binary variable stored under `key`, if any.
    #[must_use]
    pub fn var(&self, key: &str) -> Option<&[u8]> {
        self.vars.get(key).map(Vec::as_slice)
    }

    /// Removes the variable stored under `key`.
    pub fn remove_var(&mut self, key: &str) -> Option<Vec<u8>> {
        self.vars.remove(key)
    }
}

/// The node store. Ids are assigned in creation order starting at 1.
#[derive(Debug)]
pub struct Scene {
    nodes: HashMap<NodeId, Node>,
    next_id: NodeId,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    /// Creates an empty scene.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            next_id: 1,
        }
    }

    /// Returns the node with the given id.
    #[inline]
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Returns the node with the given id, mutably.
    #[inline]
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    /// Creates a new child node with the given name and returns its id.
    ///
    /// Ids start at 1, so the returned id is never the 0 sentinel.
    pub fn create_child(&mut self, name: &str) -> NodeId {
        let id = self.next_id;
        debug_assert!(id != 0, "scene node id counter wrapped");
        self.next_id += 1;
        self.nodes.insert(
            id,
            Node {
                id,
                name: name.to_owned(),
                vars: HashMap::new(),
            },
        );
        id
    }

    /// Stores a binary variable on the node with the given id.
    ///
    /// Returns false (after a warning) when the node is absent.
    pub fn set_var(&mut self, id: NodeId, key: &str, value: Vec<u8>) -> bool {
        match self.nodes.get_mut(&id) {
            Some(node) => {
                node.set_var(key, value);
                true
            }
            None => {
                warn!(node_id = id, key, "cannot set var: node not found in scene");
                false
            }
        }
    }

    /// Reads a binary variable from the node with the given id.
    #[must_use]
    pub fn get_var(&self, id: NodeId, key: &str) -> Option<&[u8]> {
        self.nodes.get(&id)?.var(key)
    }

    /// Removes the node with the given id. Returns false if it was absent.
    pub fn remove(&mut self, id: NodeId) -> bool {
        if self.nodes.remove(&id).is_none() {
            warn!(node_id = id, "cannot remove node: not found in scene");
            return false;
        }
        true
    }

    /// Number of nodes in the scene.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the scene holds no nodes.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Shared handle to a scene, gating all access behind an exclusive lock.
#[derive(Clone, Default)]
pub struct SceneHandle {
    inner: Arc<Mutex<Scene>>,
}

impl SceneHandle {
    /// Creates a handle to a fresh, empty scene.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Scene::new())),
        }
    }

    /// Runs `f` with exclusive access to the scene.
    ///
    /// The lock is held for exactly the duration of `f`; keep the closure
    /// short. Re-entrant access deadlocks.
    pub fn access<R>(&self, f: impl FnOnce(&mut Scene) -> R) -> R {
        let mut scene = self.inner.lock();
        f(&mut scene)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_child_ids_start_at_one() {
        let mut scene = Scene::new();
        let a = scene.create_child("a");
        let b = scene.create_child("b");
        assert_eq!(a, 1);
        assert_eq!(b, 2);
    }

    #[test]
    fn test_vars_roundtrip() {
        let mut scene = Scene::new();
        let id = scene.create_child("chunk");
        scene
            .get_mut(id)
            .unwrap()
            .set_var("buildat_voxel_data", vec![1, 2, 3]);
        assert_eq!(
            scene.get(id).unwrap().var("buildat_voxel_data"),
            Some(&[1u8, 2, 3][..])
        );
        assert_eq!(scene.get(id).unwrap().var("missing"), None);
    }

    #[test]
    fn test_remove_absent_node_is_harmless() {
        let mut scene = Scene::new();
        assert!(!scene.remove(42));
        let id = scene.create_child("n");
        assert!(scene.remove(id));
        assert!(scene.get(id).is_none());
    }

    #[test]
    fn test_handle_access_serializes_mutation() {
        let handle = SceneHandle::new();
        let id = handle.access(|scene| scene.create_child("gated"));
        let name = handle.access(|scene| scene.get(id).unwrap().name().to_owned());
        assert_eq!(name, "gated");
    }
}
