use std::collections::BTreeMap;

use cleanup_formats::{EntityTag, SceneFile, Vec3};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct EntityId(pub u32);

/// World-space pose. Parenting does not compose transforms; the host bridge
/// keeps positions in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub euler_angles: Vec3,
    pub local_scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            euler_angles: Vec3::ZERO,
            local_scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RigidbodyState {
    pub sleeping: bool,
    pub constraints_frozen: bool,
}

#[derive(Debug, Clone)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    pub tag: EntityTag,
    pub transform: Transform,
    pub parent: Option<EntityId>,
    pub active: bool,
    pub rigidbody: Option<RigidbodyState>,
}

/// Engine-neutral scene graph the session reads and mutates. The host bridge
/// mirrors physics and grasping results into it every frame.
#[derive(Debug, Default, Clone)]
pub struct World {
    entities: BTreeMap<EntityId, Entity>,
    next_id: u32,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_scene(scene: &SceneFile) -> Self {
        let mut world = World::new();
        let mut spawned: Vec<EntityId> = Vec::new();
        for (parent_index, node) in scene.walk() {
            let parent = parent_index.and_then(|index| spawned.get(index).copied());
            let id = world.spawn(
                &node.name,
                node.tag,
                Transform {
                    position: node.position,
                    euler_angles: node.euler_angles,
                    local_scale: node.local_scale,
                },
                parent,
            );
            world.set_active(id, node.active);
            if node.rigidbody {
                world.attach_rigidbody(id);
            }
            spawned.push(id);
        }
        world
    }

    pub fn spawn(
        &mut self,
        name: &str,
        tag: EntityTag,
        transform: Transform,
        parent: Option<EntityId>,
    ) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        self.entities.insert(
            id,
            Entity {
                id,
                name: name.to_string(),
                tag,
                transform,
                parent,
                active: true,
                rigidbody: None,
            },
        );
        id
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn name(&self, id: EntityId) -> Option<&str> {
        self.entities.get(&id).map(|entity| entity.name.as_str())
    }

    /// Name for log lines; unknown handles render as `#<id>`.
    pub fn label(&self, id: EntityId) -> String {
        self.name(id)
            .map(str::to_string)
            .unwrap_or_else(|| format!("#{}", id.0))
    }

    pub fn transform(&self, id: EntityId) -> Option<Transform> {
        self.entities.get(&id).map(|entity| entity.transform)
    }

    pub fn set_pose(&mut self, id: EntityId, position: Vec3, euler_angles: Vec3) -> bool {
        match self.entities.get_mut(&id) {
            Some(entity) => {
                entity.transform.position = position;
                entity.transform.euler_angles = euler_angles;
                true
            }
            None => false,
        }
    }

    pub fn set_active(&mut self, id: EntityId, active: bool) -> bool {
        match self.entities.get_mut(&id) {
            Some(entity) => {
                entity.active = active;
                true
            }
            None => false,
        }
    }

    pub fn is_active_self(&self, id: EntityId) -> bool {
        self.entities.get(&id).is_some_and(|entity| entity.active)
    }

    /// True when the entity and all of its ancestors are active.
    pub fn is_active_in_hierarchy(&self, id: EntityId) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            match self.entities.get(&current) {
                Some(entity) if entity.active => cursor = entity.parent,
                _ => return false,
            }
        }
        true
    }

    pub fn set_parent(&mut self, id: EntityId, parent: Option<EntityId>) -> bool {
        if let Some(parent_id) = parent {
            if !self.entities.contains_key(&parent_id) || self.is_ancestor(id, parent_id) {
                return false;
            }
        }
        match self.entities.get_mut(&id) {
            Some(entity) => {
                entity.parent = parent;
                true
            }
            None => false,
        }
    }

    fn is_ancestor(&self, candidate: EntityId, of: EntityId) -> bool {
        let mut cursor = Some(of);
        while let Some(current) = cursor {
            if current == candidate {
                return true;
            }
            cursor = self.entities.get(&current).and_then(|entity| entity.parent);
        }
        false
    }

    /// Top of the ownership hierarchy the entity currently belongs to.
    pub fn root_of(&self, id: EntityId) -> EntityId {
        let mut current = id;
        while let Some(parent) = self.entities.get(&current).and_then(|entity| entity.parent) {
            current = parent;
        }
        current
    }

    /// Entities carrying `tag` that are active in the hierarchy, in spawn order.
    pub fn find_with_tag(&self, tag: EntityTag) -> Vec<EntityId> {
        self.entities
            .values()
            .filter(|entity| entity.tag == tag && self.is_active_in_hierarchy(entity.id))
            .map(|entity| entity.id)
            .collect()
    }

    /// First active entity with the given name.
    pub fn find_by_name(&self, name: &str) -> Option<EntityId> {
        self.entities
            .values()
            .find(|entity| entity.name == name && self.is_active_in_hierarchy(entity.id))
            .map(|entity| entity.id)
    }

    /// Environment roots, active or not.
    pub fn environments(&self) -> Vec<EntityId> {
        self.entities
            .values()
            .filter(|entity| entity.tag == EntityTag::Environment)
            .map(|entity| entity.id)
            .collect()
    }

    pub fn attach_rigidbody(&mut self, id: EntityId) -> bool {
        match self.entities.get_mut(&id) {
            Some(entity) => {
                entity.rigidbody = Some(RigidbodyState {
                    sleeping: false,
                    constraints_frozen: true,
                });
                true
            }
            None => false,
        }
    }

    pub fn rigidbody(&self, id: EntityId) -> Option<RigidbodyState> {
        self.entities.get(&id).and_then(|entity| entity.rigidbody)
    }

    pub fn set_sleeping(&mut self, id: EntityId, sleeping: bool) -> bool {
        match self
            .entities
            .get_mut(&id)
            .and_then(|entity| entity.rigidbody.as_mut())
        {
            Some(body) => {
                body.sleeping = sleeping;
                true
            }
            None => false,
        }
    }

    pub fn release_constraints(&mut self, id: EntityId) -> bool {
        match self
            .entities
            .get_mut(&id)
            .and_then(|entity| entity.rigidbody.as_mut())
        {
            Some(body) => {
                body.constraints_frozen = false;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
