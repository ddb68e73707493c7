//! In-memory rendering backend.
//!
//! Keeps a record of every entity, renderable, texture and environment object
//! it is asked to create, and validates the scene on every frame. Hosts without
//! a GPU use it to drive the session headless; the test-suite uses it to
//! observe what the session did.
//!
//! Recognised [`BackendOptions`](crate::config::BackendOptions) keys:
//! - `texture_budget`: number of live textures before creation fails
//! - `entity_budget`: number of live entities before creation fails

use std::collections::{BTreeMap, BTreeSet};

use cgmath::{Matrix4, SquareMatrix};

use crate::{
    backend::{
        DecodedImage, IblData, IndirectLightHandle, MeshPrimitive, RenderBackend, SkyboxData,
        SkyboxHandle, TextureHandle,
    },
    camera::CameraMatrices,
    config::{SessionConfig, ViewOptions},
    data_structures::{color::Rgba, scene_graph::Entity},
    error::BackendError,
};

#[derive(Clone, Debug, PartialEq)]
pub struct PrimitiveRecord {
    pub base_color: Rgba,
    pub texture: Option<TextureHandle>,
    pub vertex_count: usize,
    pub index_count: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EntityRecord {
    pub transform: Matrix4<f32>,
    pub primitives: Vec<PrimitiveRecord>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextureRecord {
    pub label: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct IndirectLightRecord {
    pub intensity: f32,
    pub irradiance_sh: [[f32; 3]; 9],
    pub reflection_size: u32,
}

#[derive(Debug, Default)]
pub struct RecordingBackend {
    next_id: u64,
    next_entity: u32,
    entities: BTreeMap<Entity, EntityRecord>,
    scene: BTreeSet<Entity>,
    textures: BTreeMap<TextureHandle, TextureRecord>,
    indirect_lights: BTreeMap<IndirectLightHandle, IndirectLightRecord>,
    skyboxes: BTreeMap<SkyboxHandle, u32>,
    environment: Option<(IndirectLightHandle, SkyboxHandle)>,
    camera: Option<CameraMatrices>,
    viewport: [u32; 2],
    view_options: Option<ViewOptions>,
    clear_color: Rgba,
    frames: u64,
    texture_budget: Option<usize>,
    entity_budget: Option<usize>,
    destroyed: bool,
}

impl RecordingBackend {
    fn next_handle(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn live_entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Entities currently part of the rendered scene, in id order.
    pub fn scene_entities(&self) -> Vec<Entity> {
        self.scene.iter().copied().collect()
    }

    pub fn entity(&self, entity: Entity) -> Option<&EntityRecord> {
        self.entities.get(&entity)
    }

    pub fn base_color(&self, entity: Entity, primitive: usize) -> Option<Rgba> {
        self.entities
            .get(&entity)
            .and_then(|record| record.primitives.get(primitive))
            .map(|p| p.base_color)
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn texture(&self, texture: TextureHandle) -> Option<&TextureRecord> {
        self.textures.get(&texture)
    }

    pub fn indirect_light_count(&self) -> usize {
        self.indirect_lights.len()
    }

    pub fn indirect_light(&self, light: IndirectLightHandle) -> Option<&IndirectLightRecord> {
        self.indirect_lights.get(&light)
    }

    pub fn skybox_count(&self) -> usize {
        self.skyboxes.len()
    }

    pub fn environment(&self) -> Option<(IndirectLightHandle, SkyboxHandle)> {
        self.environment
    }

    pub fn camera(&self) -> Option<&CameraMatrices> {
        self.camera.as_ref()
    }

    pub fn viewport(&self) -> [u32; 2] {
        self.viewport
    }

    pub fn view_options(&self) -> Option<&ViewOptions> {
        self.view_options.as_ref()
    }

    pub fn clear_color(&self) -> Rgba {
        self.clear_color
    }

    pub fn frames_submitted(&self) -> u64 {
        self.frames
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    fn ensure_alive(&self) -> Result<(), BackendError> {
        if self.destroyed {
            return Err(BackendError::msg("backend context was destroyed"));
        }
        Ok(())
    }
}

impl RenderBackend for RecordingBackend {
    fn create_context(config: &SessionConfig) -> Result<Self, BackendError> {
        let options = &config.backend_options;
        log::info!("recording backend created with options {:?}", options);
        Ok(Self {
            texture_budget: options.get_parsed("texture_budget"),
            entity_budget: options.get_parsed("entity_budget"),
            clear_color: config.clear_color,
            viewport: config.viewport,
            ..Default::default()
        })
    }

    fn create_entity(&mut self) -> Result<Entity, BackendError> {
        self.ensure_alive()?;
        if let Some(budget) = self.entity_budget {
            if self.entities.len() >= budget {
                return Err(BackendError::msg(format!(
                    "entity budget of {budget} exhausted"
                )));
            }
        }
        // 0 is reserved as the null entity
        self.next_entity += 1;
        let entity = Entity::from_raw(self.next_entity);
        self.entities.insert(
            entity,
            EntityRecord {
                transform: Matrix4::identity(),
                primitives: Vec::new(),
            },
        );
        Ok(entity)
    }

    fn destroy_entity(&mut self, entity: Entity) {
        self.scene.remove(&entity);
        if self.entities.remove(&entity).is_none() {
            log::warn!("destroy of unknown entity {:?}", entity);
        }
    }

    fn set_transform(&mut self, entity: Entity, world: Matrix4<f32>) {
        if let Some(record) = self.entities.get_mut(&entity) {
            record.transform = world;
        }
    }

    fn create_texture(&mut self, image: &DecodedImage) -> Result<TextureHandle, BackendError> {
        self.ensure_alive()?;
        if let Some(budget) = self.texture_budget {
            if self.textures.len() >= budget {
                return Err(BackendError::msg(format!(
                    "texture budget of {budget} exhausted while uploading {}",
                    image.label
                )));
            }
        }
        let handle = TextureHandle::from_raw(self.next_handle());
        self.textures.insert(
            handle,
            TextureRecord {
                label: image.label.clone(),
                width: image.width,
                height: image.height,
            },
        );
        Ok(handle)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        let still_used = self
            .entities
            .values()
            .flat_map(|record| &record.primitives)
            .any(|p| p.texture == Some(texture));
        if still_used {
            log::warn!("texture {:?} destroyed while a renderable samples it", texture);
        }
        self.textures.remove(&texture);
    }

    fn create_renderable(
        &mut self,
        entity: Entity,
        primitives: &[MeshPrimitive],
    ) -> Result<(), BackendError> {
        self.ensure_alive()?;
        for primitive in primitives {
            if let Some(texture) = primitive.material.base_color_texture {
                if !self.textures.contains_key(&texture) {
                    return Err(BackendError::msg(format!(
                        "material samples unknown texture {texture:?}"
                    )));
                }
            }
        }
        let record = self
            .entities
            .get_mut(&entity)
            .ok_or_else(|| BackendError::msg(format!("unknown entity {entity:?}")))?;
        record.primitives = primitives
            .iter()
            .map(|p| PrimitiveRecord {
                base_color: p.material.base_color,
                texture: p.material.base_color_texture,
                vertex_count: p.vertices.len(),
                index_count: p.indices.len(),
            })
            .collect();
        Ok(())
    }

    fn set_base_color(&mut self, entity: Entity, primitive: usize, color: Rgba) -> bool {
        match self
            .entities
            .get_mut(&entity)
            .and_then(|record| record.primitives.get_mut(primitive))
        {
            Some(p) => {
                p.base_color = color;
                true
            }
            None => false,
        }
    }

    fn add_to_scene(&mut self, entities: &[Entity]) {
        for &entity in entities {
            if self.entities.contains_key(&entity) {
                self.scene.insert(entity);
            } else {
                log::warn!("cannot add unknown entity {:?} to the scene", entity);
            }
        }
    }

    fn remove_from_scene(&mut self, entities: &[Entity]) {
        for entity in entities {
            self.scene.remove(entity);
        }
    }

    fn create_indirect_light(
        &mut self,
        ibl: &IblData,
    ) -> Result<IndirectLightHandle, BackendError> {
        self.ensure_alive()?;
        ibl.reflections.validate()?;
        let handle = IndirectLightHandle::from_raw(self.next_handle());
        self.indirect_lights.insert(
            handle,
            IndirectLightRecord {
                intensity: ibl.intensity,
                irradiance_sh: ibl.irradiance_sh,
                reflection_size: ibl.reflections.size(),
            },
        );
        Ok(handle)
    }

    fn destroy_indirect_light(&mut self, light: IndirectLightHandle) {
        if self.environment.is_some_and(|(active, _)| active == light) {
            log::warn!("destroying the active indirect light {:?}", light);
            self.environment = None;
        }
        self.indirect_lights.remove(&light);
    }

    fn create_skybox(&mut self, skybox: &SkyboxData) -> Result<SkyboxHandle, BackendError> {
        self.ensure_alive()?;
        skybox.cubemap.validate()?;
        let handle = SkyboxHandle::from_raw(self.next_handle());
        self.skyboxes.insert(handle, skybox.cubemap.size());
        Ok(handle)
    }

    fn destroy_skybox(&mut self, skybox: SkyboxHandle) {
        if self.environment.is_some_and(|(_, active)| active == skybox) {
            log::warn!("destroying the active skybox {:?}", skybox);
            self.environment = None;
        }
        self.skyboxes.remove(&skybox);
    }

    fn set_environment(&mut self, environment: Option<(IndirectLightHandle, SkyboxHandle)>) {
        self.environment = environment;
    }

    fn set_camera(&mut self, camera: &CameraMatrices) {
        self.camera = Some(*camera);
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = [width, height];
    }

    fn set_view_options(&mut self, options: &ViewOptions) {
        self.view_options = Some(options.clone());
    }

    fn submit_frame(&mut self) -> Result<(), BackendError> {
        self.ensure_alive()?;
        if let Some((light, skybox)) = self.environment {
            if !self.indirect_lights.contains_key(&light) || !self.skyboxes.contains_key(&skybox) {
                return Err(BackendError::msg("scene references a destroyed environment"));
            }
        }
        self.frames += 1;
        Ok(())
    }

    fn destroy_context(&mut self) {
        if !self.entities.is_empty() || !self.textures.is_empty() {
            log::warn!(
                "backend destroyed with {} entities and {} textures still alive",
                self.entities.len(),
                self.textures.len()
            );
        }
        self.scene.clear();
        self.entities.clear();
        self.textures.clear();
        self.environment = None;
        self.indirect_lights.clear();
        self.skyboxes.clear();
        self.destroyed = true;
    }
}
