//! Instantiating a glTF model into backend entities.
//!
//! A load runs in three phases. Everything that only needs the CPU happens
//! first: container parsing, resource resolution, geometry and animation
//! reads. Texture decoding is then started on worker threads while the entity
//! graph is created. Finally the decodes are joined, textures uploaded and
//! renderables attached. Every backend object created along the way is
//! tracked, so a failure at any point releases exactly what this attempt
//! created and nothing else.
//!
//! The resulting [`LoadedAsset`] is not part of the scene until
//! [`LoadedAsset::attach`] is called.

use std::collections::{HashMap, HashSet};

use cgmath::{Matrix4, SquareMatrix, Vector3};

use crate::{
    backend::{MaterialDesc, MeshPrimitive, RenderBackend, TextureHandle},
    config::SessionConfig,
    data_structures::{
        color::Rgba,
        instance::Transform,
        scene_graph::{Aabb, Entity, NameMap, RenderableInfo, SceneGraph},
    },
    error::{Result, SessionError},
    resources::{
        ModelFormat, ResourceResolver, ResourceTable,
        animation::{AnimationClip, load_animations},
        load_buffers,
        mesh::{PrimitiveGeometry, read_mesh},
        texture::{collect_requests, decode_all},
    },
};

/// One instantiated model and every backend object it owns.
#[derive(Debug)]
pub struct LoadedAsset {
    name: String,
    root: Entity,
    graph: SceneGraph,
    names: NameMap,
    node_entities: HashMap<usize, Entity>,
    textures: Vec<TextureHandle>,
    animations: Vec<AnimationClip>,
    bounds: Option<Aabb>,
    root_transform: Matrix4<f32>,
}

impl LoadedAsset {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The extra entity every node hangs under. Carries the fit transform.
    pub fn root(&self) -> Entity {
        self.root
    }

    /// One entity per instantiated node, in creation (depth-first) order.
    /// The root is not included.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        let root = self.root;
        self.graph.entities().filter(move |&e| e != root)
    }

    pub fn entity_count(&self) -> usize {
        self.graph.len().saturating_sub(1)
    }

    pub fn entity_by_name(&self, name: &str) -> Option<Entity> {
        self.names.get(name)
    }

    pub fn names(&self) -> &NameMap {
        &self.names
    }

    pub fn name_of(&self, entity: Entity) -> Option<&str> {
        self.graph.node(entity).and_then(|node| node.name.as_deref())
    }

    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    pub fn textures(&self) -> &[TextureHandle] {
        &self.textures
    }

    pub fn animations(&self) -> &[AnimationClip] {
        &self.animations
    }

    /// Model-space bounds over all renderables, before the root transform.
    pub fn bounds(&self) -> Option<Aabb> {
        self.bounds
    }

    pub fn root_transform(&self) -> Matrix4<f32> {
        self.root_transform
    }

    /// Insert every entity of the asset into the scene.
    pub fn attach<B: RenderBackend>(&self, backend: &mut B) {
        let entities: Vec<Entity> = self.graph.entities().collect();
        backend.add_to_scene(&entities);
    }

    /// Remove the asset from the scene and release its entities, renderables
    /// and textures.
    pub fn destroy<B: RenderBackend>(self, backend: &mut B) {
        let entities: Vec<Entity> = self.graph.entities().collect();
        backend.remove_from_scene(&entities);
        // children before parents
        for &entity in entities.iter().rev() {
            backend.destroy_entity(entity);
        }
        for &texture in &self.textures {
            backend.destroy_texture(texture);
        }
        log::debug!(
            "Destroyed {}: {} entities, {} textures",
            self.name,
            entities.len(),
            self.textures.len()
        );
    }

    /// Pose the asset at `time` seconds into its first animation clip.
    /// Returns `false` if the asset has no animation.
    pub fn animate<B: RenderBackend>(&mut self, backend: &mut B, time: f32) -> bool {
        let Some(clip) = self.animations.first() else {
            return false;
        };
        let graph = &mut self.graph;
        let node_entities = &self.node_entities;
        clip.sample(time, |node, update| {
            if let Some(node) = node_entities
                .get(&node)
                .and_then(|&entity| graph.node_mut(entity))
            {
                update.apply_to(&mut node.local);
            }
        });
        self.graph.update_world_transforms(self.root_transform);
        push_transforms(backend, &self.graph);
        true
    }
}

fn push_transforms<B: RenderBackend>(backend: &mut B, graph: &SceneGraph) {
    for node in graph.nodes() {
        backend.set_transform(node.entity, node.world());
    }
}

/// Backend objects created by an attempt that has not committed yet.
#[derive(Default)]
struct Staged {
    entities: Vec<Entity>,
    textures: Vec<TextureHandle>,
}

impl Staged {
    fn rollback<B: RenderBackend>(self, backend: &mut B) {
        for &entity in self.entities.iter().rev() {
            backend.destroy_entity(entity);
        }
        for &texture in &self.textures {
            backend.destroy_texture(texture);
        }
        log::debug!(
            "Rolled back {} entities and {} textures",
            self.entities.len(),
            self.textures.len()
        );
    }
}

/// Builds [`LoadedAsset`]s from model buffers.
#[derive(Clone, Debug)]
pub struct AssetInstantiator {
    /// Fit models into a cube of side 2 around `object_position`.
    pub auto_scale: bool,
    pub object_position: [f32; 3],
}

impl Default for AssetInstantiator {
    fn default() -> Self {
        Self::from_config(&SessionConfig::default())
    }
}

impl AssetInstantiator {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            auto_scale: config.auto_scale,
            object_position: config.object_position,
        }
    }

    /// Instantiate `model_bytes`. External references resolve through
    /// `resources`, which is dropped before this returns.
    ///
    /// Must run inside a tokio runtime; texture decoding uses its blocking
    /// pool.
    pub async fn instantiate<B: RenderBackend>(
        &self,
        backend: &mut B,
        model_bytes: &[u8],
        model_name: &str,
        resources: ResourceTable,
    ) -> Result<LoadedAsset> {
        let started = instant::Instant::now();

        let format = ModelFormat::detect(model_bytes)?;
        if let Some(expected) = ModelFormat::from_name(model_name) {
            if expected != format {
                log::warn!(
                    "{} is named like a {:?} model but holds {:?} data",
                    model_name,
                    expected,
                    format
                );
            }
        }
        let gltf = gltf::Gltf::from_slice(model_bytes)
            .map_err(|e| SessionError::parse(format!("model {model_name}"), e))?;
        let resolver = ResourceResolver::new(&resources);
        let buffers = load_buffers(&gltf, &resolver)?;

        let requests = collect_requests(&gltf.document, &buffers, &resolver, model_name)?;
        let texture_jobs = requests.len();
        let meshes: Vec<Vec<PrimitiveGeometry>> = gltf
            .document
            .meshes()
            .map(|mesh| read_mesh(&mesh, &buffers))
            .collect();
        let animations = load_animations(&gltf.document, &buffers);
        let roots = scene_roots(&gltf.document);
        drop(buffers);
        drop(resources);

        let decoding = decode_all(requests);

        let mut staged = Staged::default();
        let result = async {
            let mut asset = self.create_graph(backend, &mut staged, &roots, model_name)?;
            let images = decoding.await?;
            let mut textures = HashMap::with_capacity(images.len());
            for (image, decoded) in &images {
                let handle = backend.create_texture(decoded)?;
                staged.textures.push(handle);
                textures.insert(*image, handle);
            }
            self.create_renderables(backend, &gltf.document, &meshes, &textures, &mut asset)?;
            Ok::<_, SessionError>(asset)
        }
        .await;

        match result {
            Ok(mut asset) => {
                asset.textures = staged.textures;
                asset.animations = animations;
                self.place(backend, &mut asset);
                log::info!(
                    "Loaded {} in {} ms: {} entities, {} textures, {} animations",
                    model_name,
                    started.elapsed().as_millis(),
                    asset.entity_count(),
                    texture_jobs,
                    asset.animations.len()
                );
                Ok(asset)
            }
            Err(e) => {
                log::warn!("Loading {} failed: {}", model_name, e);
                staged.rollback(backend);
                Err(e)
            }
        }
    }

    /// Create the root and one entity per node, depth-first in declaration
    /// order, with local transforms and names.
    fn create_graph<B: RenderBackend>(
        &self,
        backend: &mut B,
        staged: &mut Staged,
        roots: &[gltf::Node<'_>],
        model_name: &str,
    ) -> Result<LoadedAsset> {
        let mut graph = SceneGraph::new();
        let mut names = NameMap::new();
        let mut node_entities = HashMap::new();

        let root = backend.create_entity()?;
        staged.entities.push(root);
        graph.insert(root, None, None, Transform::new());

        let mut stack: Vec<(gltf::Node<'_>, Entity)> =
            roots.iter().rev().map(|node| (node.clone(), root)).collect();
        let mut visited = HashSet::new();
        while let Some((node, parent)) = stack.pop() {
            if !visited.insert(node.index()) {
                log::warn!("Node {} is referenced twice; skipping the copy.", node.index());
                continue;
            }
            let entity = backend.create_entity()?;
            staged.entities.push(entity);
            let name = node.name().map(str::to_string);
            if let Some(name) = &name {
                if let Some(previous) = names.insert(name.clone(), entity) {
                    log::warn!(
                        "Duplicate node name {:?} in {}: {:?} replaces {:?}",
                        name,
                        model_name,
                        entity,
                        previous
                    );
                }
            }
            graph.insert(
                entity,
                name,
                Some(parent),
                Transform::from_decomposed(node.transform().decomposed()),
            );
            node_entities.insert(node.index(), entity);
            let children: Vec<_> = node.children().collect();
            stack.extend(children.into_iter().rev().map(|child| (child, entity)));
        }

        Ok(LoadedAsset {
            name: model_name.to_string(),
            root,
            graph,
            names,
            node_entities,
            textures: Vec::new(),
            animations: Vec::new(),
            bounds: None,
            root_transform: Matrix4::identity(),
        })
    }

    fn create_renderables<B: RenderBackend>(
        &self,
        backend: &mut B,
        document: &gltf::Document,
        meshes: &[Vec<PrimitiveGeometry>],
        textures: &HashMap<usize, TextureHandle>,
        asset: &mut LoadedAsset,
    ) -> Result<()> {
        let materials: Vec<MaterialDesc> = document
            .materials()
            .map(|material| material_desc(&material, textures))
            .collect();

        for node in document.nodes() {
            let (Some(mesh), Some(&entity)) = (node.mesh(), asset.node_entities.get(&node.index()))
            else {
                continue;
            };
            let Some(geometry) = meshes.get(mesh.index()).filter(|g| !g.is_empty()) else {
                continue;
            };
            let primitives: Vec<MeshPrimitive> = geometry
                .iter()
                .map(|p| MeshPrimitive {
                    vertices: p.vertices.clone(),
                    indices: p.indices.clone(),
                    material: p
                        .material
                        .and_then(|m| materials.get(m).cloned())
                        .unwrap_or_default(),
                })
                .collect();
            backend.create_renderable(entity, &primitives)?;

            let info = RenderableInfo {
                declared_colors: primitives.iter().map(|p| p.material.base_color).collect(),
                bounds: geometry
                    .iter()
                    .map(|p| p.bounds)
                    .reduce(|acc, b| acc.union(&b)),
            };
            if let Some(node) = asset.graph.node_mut(entity) {
                node.renderable = Some(info);
            }
        }
        Ok(())
    }

    /// Compute bounds and the root transform, then push world transforms.
    fn place<B: RenderBackend>(&self, backend: &mut B, asset: &mut LoadedAsset) {
        asset.graph.update_world_transforms(Matrix4::identity());
        asset.bounds = asset.graph.world_bounds();
        asset.root_transform = match (self.auto_scale, asset.bounds) {
            (true, Some(bounds)) => fit_to_unit_cube(&bounds, self.object_position.into()),
            _ => Matrix4::identity(),
        };
        asset.graph.update_world_transforms(asset.root_transform);
        push_transforms(backend, &asset.graph);
    }
}

fn material_desc(
    material: &gltf::Material<'_>,
    textures: &HashMap<usize, TextureHandle>,
) -> MaterialDesc {
    let pbr = material.pbr_metallic_roughness();
    MaterialDesc {
        name: material.name().map(str::to_string),
        base_color: Rgba(pbr.base_color_factor()),
        base_color_texture: pbr
            .base_color_texture()
            .and_then(|info| textures.get(&info.texture().source().index()).copied()),
        double_sided: material.double_sided(),
        blend: material.alpha_mode() == gltf::material::AlphaMode::Blend,
    }
}

/// Nodes to instantiate: the default scene, else the first scene, else every
/// node that is nobody's child.
fn scene_roots<'a>(document: &'a gltf::Document) -> Vec<gltf::Node<'a>> {
    if let Some(scene) = document.default_scene().or_else(|| document.scenes().next()) {
        return scene.nodes().collect();
    }
    let children: HashSet<usize> = document
        .nodes()
        .flat_map(|node| node.children().map(|c| c.index()))
        .collect();
    document
        .nodes()
        .filter(|node| !children.contains(&node.index()))
        .collect()
}

/// Scale uniformly so the largest extent becomes 2, centred on `center`.
pub fn fit_to_unit_cube(bounds: &Aabb, center: Vector3<f32>) -> Matrix4<f32> {
    let extent = bounds.extent();
    let max_extent = extent.x.max(extent.y).max(extent.z);
    if max_extent <= f32::EPSILON || !max_extent.is_finite() {
        return Matrix4::from_translation(center - bounds.center());
    }
    let scale = 2.0 / max_extent;
    Matrix4::from_translation(center)
        * Matrix4::from_scale(scale)
        * Matrix4::from_translation(-bounds.center())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::Vector4;

    #[test]
    fn fit_maps_bounds_into_a_cube_around_the_target() {
        let bounds = Aabb::new([0.0, 0.0, 0.0], [4.0, 2.0, 1.0]);
        let fit = fit_to_unit_cube(&bounds, Vector3::new(0.0, 0.0, -4.0));
        let min = fit * Vector4::new(0.0, 0.0, 0.0, 1.0);
        let max = fit * Vector4::new(4.0, 2.0, 1.0, 1.0);
        assert_eq!(min.truncate(), Vector3::new(-1.0, -0.5, -4.25));
        assert_eq!(max.truncate(), Vector3::new(1.0, 0.5, -3.75));
    }

    #[test]
    fn flat_bounds_are_only_centred() {
        let bounds = Aabb::new([1.0, 1.0, 1.0], [1.0, 1.0, 1.0]);
        let fit = fit_to_unit_cube(&bounds, Vector3::new(0.0, 0.0, 0.0));
        let moved = fit * Vector4::new(1.0, 1.0, 1.0, 1.0);
        assert_eq!(moved.truncate(), Vector3::new(0.0, 0.0, 0.0));
    }
}
