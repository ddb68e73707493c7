//! Entity graph of an instantiated asset.
//!
//! Nodes are stored in creation order, which is a depth-first walk of the
//! source scene. Parents are always created before their children, so a single
//! forward pass is enough to propagate world transforms.

use std::collections::{BTreeMap, HashMap};

use cgmath::{Matrix4, SquareMatrix, Vector3, Vector4};

use crate::data_structures::{color::Rgba, instance::Transform};

/// Opaque scene-graph node identifier handed out by the rendering backend.
///
/// The raw value is stable for the lifetime of the entity and is what the
/// selection callback reports to the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity(u32);

impl Entity {
    pub const fn from_raw(id: u32) -> Self {
        Self(id)
    }

    pub const fn id(self) -> u32 {
        self.0
    }
}

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vector3<f32>,
    pub max: Vector3<f32>,
}

impl Aabb {
    pub fn new(min: [f32; 3], max: [f32; 3]) -> Self {
        Self {
            min: min.into(),
            max: max.into(),
        }
    }

    pub fn center(&self) -> Vector3<f32> {
        (self.min + self.max) * 0.5
    }

    pub fn extent(&self) -> Vector3<f32> {
        self.max - self.min
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: Vector3::new(
                self.min.x.min(other.min.x),
                self.min.y.min(other.min.y),
                self.min.z.min(other.min.z),
            ),
            max: Vector3::new(
                self.max.x.max(other.max.x),
                self.max.y.max(other.max.y),
                self.max.z.max(other.max.z),
            ),
        }
    }

    /// Bounds of the eight transformed corners.
    pub fn transformed(&self, matrix: &Matrix4<f32>) -> Aabb {
        let mut corners = (0..8).map(|i| {
            let corner = Vector4::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
                1.0,
            );
            (matrix * corner).truncate()
        });
        let first = corners.next().unwrap_or(self.min);
        corners.fold(Aabb { min: first, max: first }, |acc, p| {
            acc.union(&Aabb { min: p, max: p })
        })
    }
}

/// Renderable component data the session needs after instantiation.
#[derive(Clone, Debug, Default)]
pub struct RenderableInfo {
    /// Base color factor each primitive declared in the source material.
    pub declared_colors: Vec<Rgba>,
    /// Local-space bounds over all primitives.
    pub bounds: Option<Aabb>,
}

#[derive(Clone, Debug)]
pub struct SceneNode {
    pub entity: Entity,
    pub name: Option<String>,
    pub local: Transform,
    pub renderable: Option<RenderableInfo>,
    parent: Option<usize>,
    children: Vec<usize>,
    world: Matrix4<f32>,
}

impl SceneNode {
    pub fn world(&self) -> Matrix4<f32> {
        self.world
    }
}

#[derive(Clone, Debug, Default)]
pub struct SceneGraph {
    nodes: Vec<SceneNode>,
    lookup: HashMap<Entity, usize>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node. `parent` must already be part of the graph, otherwise
    /// the node becomes a root and a warning is logged.
    pub fn insert(
        &mut self,
        entity: Entity,
        name: Option<String>,
        parent: Option<Entity>,
        local: Transform,
    ) -> usize {
        let idx = self.nodes.len();
        let parent = parent.and_then(|p| {
            let found = self.lookup.get(&p).copied();
            if found.is_none() {
                log::warn!("parent {:?} of {:?} is not in the graph", p, entity);
            }
            found
        });
        if let Some(parent) = parent {
            self.nodes[parent].children.push(idx);
        }
        self.nodes.push(SceneNode {
            entity,
            name,
            local,
            renderable: None,
            parent,
            children: Vec::new(),
            world: Matrix4::identity(),
        });
        self.lookup.insert(entity, idx);
        idx
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.lookup.contains_key(&entity)
    }

    pub fn node(&self, entity: Entity) -> Option<&SceneNode> {
        self.lookup.get(&entity).map(|&idx| &self.nodes[idx])
    }

    pub fn node_mut(&mut self, entity: Entity) -> Option<&mut SceneNode> {
        self.lookup.get(&entity).map(|&idx| &mut self.nodes[idx])
    }

    /// Nodes in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = &SceneNode> {
        self.nodes.iter()
    }

    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.nodes.iter().map(|node| node.entity)
    }

    pub fn parent(&self, entity: Entity) -> Option<Entity> {
        self.node(entity)
            .and_then(|node| node.parent)
            .map(|idx| self.nodes[idx].entity)
    }

    pub fn children(&self, entity: Entity) -> Vec<Entity> {
        self.node(entity)
            .map(|node| node.children.iter().map(|&c| self.nodes[c].entity).collect())
            .unwrap_or_default()
    }

    /// The entities whose material a visual patch on `entity` should touch.
    ///
    /// A node with its own renderable is patched directly. A grouping node
    /// without one forwards the patch to every renderable below it, in
    /// depth-first order.
    pub fn renderable_targets(&self, entity: Entity) -> Vec<Entity> {
        let Some(&start) = self.lookup.get(&entity) else {
            return Vec::new();
        };
        if self.nodes[start].renderable.is_some() {
            return vec![entity];
        }
        let mut targets = Vec::new();
        let mut stack: Vec<usize> = self.nodes[start].children.iter().rev().copied().collect();
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            if node.renderable.is_some() {
                targets.push(node.entity);
            }
            stack.extend(node.children.iter().rev().copied());
        }
        targets
    }

    /// Recompute world matrices. Roots are placed under `root_transform`.
    pub fn update_world_transforms(&mut self, root_transform: Matrix4<f32>) {
        for idx in 0..self.nodes.len() {
            let parent_world = match self.nodes[idx].parent {
                Some(parent) => self.nodes[parent].world,
                None => root_transform,
            };
            let node = &mut self.nodes[idx];
            node.world = parent_world * node.local.to_matrix();
        }
    }

    /// World-space bounds over every renderable, using the current world matrices.
    pub fn world_bounds(&self) -> Option<Aabb> {
        self.nodes
            .iter()
            .filter_map(|node| {
                node.renderable
                    .as_ref()
                    .and_then(|r| r.bounds)
                    .map(|b| b.transformed(&node.world))
            })
            .reduce(|acc, b| acc.union(&b))
    }
}

/// Name to entity mapping built from the model's declared node names.
///
/// Names are not unique in glTF. When two nodes share a name the entity
/// registered last wins.
#[derive(Clone, Debug, Default)]
pub struct NameMap {
    entries: BTreeMap<String, Entity>,
}

impl NameMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `entity` under `name`, returning the entity it displaced.
    pub fn insert(&mut self, name: impl Into<String>, entity: Entity) -> Option<Entity> {
        self.entries.insert(name.into(), entity)
    }

    pub fn get(&self, name: &str) -> Option<Entity> {
        self.entries.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Entity)> {
        self.entries.iter().map(|(name, &entity)| (name.as_str(), entity))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> SceneGraph {
        // root
        // ├── body (renderable)
        // └── wheels
        //     ├── wheel_l (renderable)
        //     └── wheel_r (renderable)
        let mut graph = SceneGraph::new();
        let e = Entity::from_raw;
        graph.insert(e(1), None, None, Transform::new());
        graph.insert(e(2), Some("body".into()), Some(e(1)), Transform::new());
        graph.insert(e(3), Some("wheels".into()), Some(e(1)), Transform::new());
        graph.insert(e(4), Some("wheel_l".into()), Some(e(3)), Transform::new());
        graph.insert(e(5), Some("wheel_r".into()), Some(e(3)), Transform::new());
        for id in [2, 4, 5] {
            graph.node_mut(e(id)).unwrap().renderable = Some(RenderableInfo::default());
        }
        graph
    }

    #[test]
    fn grouping_node_forwards_to_descendants_in_order() {
        let graph = graph();
        assert_eq!(
            graph.renderable_targets(Entity::from_raw(3)),
            vec![Entity::from_raw(4), Entity::from_raw(5)]
        );
        assert_eq!(
            graph.renderable_targets(Entity::from_raw(2)),
            vec![Entity::from_raw(2)]
        );
        assert!(graph.renderable_targets(Entity::from_raw(99)).is_empty());
    }

    #[test]
    fn world_transforms_compose_down_the_tree() {
        let mut graph = graph();
        graph.node_mut(Entity::from_raw(3)).unwrap().local.position = [0.0, 1.0, 0.0].into();
        graph.node_mut(Entity::from_raw(4)).unwrap().local.position = [2.0, 0.0, 0.0].into();
        graph.update_world_transforms(Matrix4::from_translation([0.0, 0.0, -4.0].into()));
        let world = graph.node(Entity::from_raw(4)).unwrap().world();
        assert_eq!(world.w.truncate(), Vector3::new(2.0, 1.0, -4.0));
    }

    #[test]
    fn last_registered_name_wins() {
        let mut names = NameMap::new();
        assert_eq!(names.insert("Body", Entity::from_raw(2)), None);
        assert_eq!(
            names.insert("Body", Entity::from_raw(7)),
            Some(Entity::from_raw(2))
        );
        assert_eq!(names.get("Body"), Some(Entity::from_raw(7)));
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn transformed_bounds_cover_all_corners() {
        let bounds = Aabb::new([-1.0, -1.0, -1.0], [1.0, 1.0, 1.0]);
        let moved = bounds.transformed(&Matrix4::from_nonuniform_scale(2.0, 1.0, 1.0));
        assert_eq!(moved.min, Vector3::new(-2.0, -1.0, -1.0));
        assert_eq!(moved.max, Vector3::new(2.0, 1.0, 1.0));
    }
}
