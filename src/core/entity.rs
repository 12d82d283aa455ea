use crate::{
    camera::Camera,
    core::{model::Model, transform::Transform},
    light::SunLight,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(usize);

impl EntityId {
    pub fn index(self) -> usize {
        self.0
    }
}

pub struct Entity {
    pub name: String,
    parent: Option<EntityId>,
    children: Vec<EntityId>,
    local: Transform,
    world: Transform,
    world_inverse: Transform,
    dirty: bool,

    pub model: Option<Model>,
    pub camera: Option<Camera>,
    pub sun: Option<SunLight>,
}

impl Entity {
    fn new(name: String, local: Transform) -> Self {
        Self {
            name,
            parent: None,
            children: vec![],
            local,
            world: local,
            world_inverse: local.inverse(),
            dirty: true,
            model: None,
            camera: None,
            sun: None,
        }
    }

    pub fn parent(&self) -> Option<EntityId> {
        self.parent
    }

    pub fn children(&self) -> &[EntityId] {
        &self.children
    }
}

/// Arena of entities. Parents own child lists, children point back by id.
#[derive(Default)]
pub struct SceneGraph {
    entities: Vec<Entity>,
    roots: Vec<EntityId>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn roots(&self) -> &[EntityId] {
        &self.roots
    }

    pub fn entity(&self, id: EntityId) -> &Entity {
        &self.entities[id.0]
    }

    pub fn entity_mut(&mut self, id: EntityId) -> &mut Entity {
        &mut self.entities[id.0]
    }

    pub fn add_entity(&mut self, name: &str, local: Transform, parent: Option<EntityId>) -> EntityId {
        let id = EntityId(self.entities.len());
        self.entities.push(Entity::new(name.to_owned(), local));
        match parent {
            Some(parent) => {
                self.entities[id.0].parent = Some(parent);
                self.entities[parent.0].children.push(id);
            }
            None => self.roots.push(id),
        }
        id
    }

    /// Re-links `id` under `parent`, or makes it a root. Rejects cycles.
    pub fn set_parent(&mut self, id: EntityId, parent: Option<EntityId>) -> anyhow::Result<()> {
        if let Some(parent) = parent {
            let mut curr = Some(parent);
            while let Some(ancestor) = curr {
                if ancestor == id {
                    anyhow::bail!(format!(
                        "can't parent '{}' under its own descendant '{}'",
                        self.entities[id.0].name, self.entities[parent.0].name
                    ));
                }
                curr = self.entities[ancestor.0].parent;
            }
        }

        match self.entities[id.0].parent {
            Some(old) => self.entities[old.0].children.retain(|&child| child != id),
            None => self.roots.retain(|&root| root != id),
        }
        self.entities[id.0].parent = parent;
        match parent {
            Some(parent) => self.entities[parent.0].children.push(id),
            None => self.roots.push(id),
        }

        self.invalidate(id);
        Ok(())
    }

    pub fn set_local_transform(&mut self, id: EntityId, local: Transform) {
        self.entities[id.0].local = local;
        self.invalidate(id);
    }

    fn invalidate(&mut self, id: EntityId) {
        let mut stack = vec![id];
        while let Some(curr) = stack.pop() {
            let entity = &mut self.entities[curr.0];
            entity.dirty = true;
            stack.extend_from_slice(&entity.children);
        }
    }

    /// World transform of `id`. Uses the cache when it is valid, composes the chain otherwise.
    pub fn world_transform(&self, id: EntityId) -> Transform {
        let entity = &self.entities[id.0];
        if !entity.dirty {
            return entity.world;
        }
        let mut trans = entity.local;
        let mut curr = entity.parent;
        while let Some(parent) = curr {
            let parent = &self.entities[parent.0];
            if !parent.dirty {
                return parent.world * trans;
            }
            trans = parent.local * trans;
            curr = parent.parent;
        }
        trans
    }

    /// Inverse of the cached world transform. Call `refresh_world_transforms` first.
    pub fn world_inverse(&self, id: EntityId) -> Transform {
        let entity = &self.entities[id.0];
        if entity.dirty {
            self.world_transform(id).inverse()
        } else {
            entity.world_inverse
        }
    }

    /// Recomputes every dirty cache top-down.
    pub fn refresh_world_transforms(&mut self) {
        let mut stack: Vec<(EntityId, Transform, bool)> = self
            .roots
            .iter()
            .map(|&root| (root, Transform::IDENTITY, false))
            .collect();
        while let Some((id, parent_world, parent_changed)) = stack.pop() {
            let entity = &mut self.entities[id.0];
            let changed = parent_changed || entity.dirty;
            if changed {
                entity.world = parent_world * entity.local;
                entity.world_inverse = entity.world.inverse();
                entity.dirty = false;
            }
            let world = entity.world;
            for &child in &entity.children {
                stack.push((child, world, changed));
            }
        }
    }

    pub fn find_by_name(&self, name: &str) -> Option<EntityId> {
        self.entities
            .iter()
            .position(|entity| entity.name == name)
            .map(EntityId)
    }

    /// Looks up `a/b/c` by names, starting below `from` or at the roots.
    pub fn find_child(&self, from: Option<EntityId>, path: &str) -> Option<EntityId> {
        let mut curr = from;
        for name in path.split('/').filter(|part| !part.is_empty()) {
            let candidates = match curr {
                Some(id) => &self.entities[id.0].children,
                None => &self.roots,
            };
            curr = Some(
                *candidates
                    .iter()
                    .find(|&&child| self.entities[child.0].name == name)?,
            );
        }
        curr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translation(x: f32, y: f32, z: f32) -> Transform {
        Transform::from_translation(glam::Vec3A::new(x, y, z))
    }

    #[test]
    fn test_world_transform_composes_ancestors() {
        let mut graph = SceneGraph::new();
        let root = graph.add_entity("root", translation(1.0, 0.0, 0.0), None);
        let child = graph.add_entity("child", translation(0.0, 2.0, 0.0), Some(root));
        let leaf = graph.add_entity("leaf", translation(0.0, 0.0, 3.0), Some(child));

        let expected = glam::Vec3A::new(1.0, 2.0, 3.0);
        assert_eq!(graph.world_transform(leaf).origin, expected);
        graph.refresh_world_transforms();
        assert_eq!(graph.world_transform(leaf).origin, expected);
    }

    #[test]
    fn test_ancestor_change_invalidates_descendants() {
        let mut graph = SceneGraph::new();
        let root = graph.add_entity("root", Transform::IDENTITY, None);
        let child = graph.add_entity("child", translation(0.0, 1.0, 0.0), Some(root));
        graph.refresh_world_transforms();

        graph.set_local_transform(root, translation(5.0, 0.0, 0.0));
        assert_eq!(graph.world_transform(child).origin, glam::Vec3A::new(5.0, 1.0, 0.0));
        graph.refresh_world_transforms();
        assert_eq!(graph.world_transform(child).origin, glam::Vec3A::new(5.0, 1.0, 0.0));
        let back = graph.world_inverse(child).transform_point(glam::Vec3A::new(5.0, 1.0, 0.0));
        assert!(back.length() < 1e-5);
    }

    #[test]
    fn test_set_parent_relinks_and_rejects_cycles() {
        let mut graph = SceneGraph::new();
        let a = graph.add_entity("a", translation(1.0, 0.0, 0.0), None);
        let b = graph.add_entity("b", translation(0.0, 1.0, 0.0), None);
        graph.refresh_world_transforms();

        graph.set_parent(b, Some(a)).unwrap();
        assert_eq!(graph.roots(), &[a]);
        assert_eq!(graph.entity(a).children(), &[b]);
        assert_eq!(graph.world_transform(b).origin, glam::Vec3A::new(1.0, 1.0, 0.0));

        assert!(graph.set_parent(a, Some(b)).is_err());
        assert!(graph.set_parent(a, Some(a)).is_err());
    }

    #[test]
    fn test_find_child_by_path() {
        let mut graph = SceneGraph::new();
        let car = graph.add_entity("car", Transform::IDENTITY, None);
        let body = graph.add_entity("body", Transform::IDENTITY, Some(car));
        let wheel = graph.add_entity("wheel", Transform::IDENTITY, Some(body));

        assert_eq!(graph.find_child(None, "car/body/wheel"), Some(wheel));
        assert_eq!(graph.find_child(Some(car), "body"), Some(body));
        assert_eq!(graph.find_child(None, "car/door"), None);
        assert_eq!(graph.find_by_name("wheel"), Some(wheel));
    }
}
