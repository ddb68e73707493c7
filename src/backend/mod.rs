//! Rendering backend capability interface.
//!
//! The session never talks to a graphics API directly. It drives a
//! [`RenderBackend`], which owns the engine, scene, view and renderer and
//! exposes entity, texture, environment and frame operations.
//!
//! - `recording` is an in-memory backend that keeps every object it is asked
//!   to create. It is what headless hosts and the test-suite run on.
//! - `gpu` (feature `wgpu-backend`) renders offscreen through wgpu.

pub mod recording;
#[cfg(feature = "wgpu-backend")]
pub mod gpu;

use crate::{
    camera::CameraMatrices,
    config::{SessionConfig, ViewOptions},
    data_structures::{color::Rgba, scene_graph::Entity},
    error::BackendError,
};

/// Vertex layout shared by every backend.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ModelVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tex_coords: [f32; 2],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(u64);

impl TextureHandle {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndirectLightHandle(u64);

impl IndirectLightHandle {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SkyboxHandle(u64);

impl SkyboxHandle {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// A decoded RGBA8 image ready for upload.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedImage {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
    /// Color data is sRGB encoded (base color maps are, data maps are not).
    pub srgb: bool,
}

/// Per-primitive material instance parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct MaterialDesc {
    pub name: Option<String>,
    pub base_color: Rgba,
    pub base_color_texture: Option<TextureHandle>,
    pub double_sided: bool,
    pub blend: bool,
}

impl Default for MaterialDesc {
    fn default() -> Self {
        Self {
            name: None,
            base_color: Rgba::WHITE,
            base_color_texture: None,
            double_sided: false,
            blend: false,
        }
    }
}

/// Geometry and material of one drawable primitive.
#[derive(Clone, Debug)]
pub struct MeshPrimitive {
    pub vertices: Vec<ModelVertex>,
    pub indices: Vec<u32>,
    pub material: MaterialDesc,
}

/// One mip level of a cubemap. Faces are ordered +X, -X, +Y, -Y, +Z, -Z and
/// hold `size * size` linear RGBA texels each.
#[derive(Clone, Debug, PartialEq)]
pub struct CubemapLevel {
    pub size: u32,
    pub faces: Vec<Vec<[f32; 4]>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Cubemap {
    pub levels: Vec<CubemapLevel>,
}

impl Cubemap {
    pub fn size(&self) -> u32 {
        self.levels.first().map(|level| level.size).unwrap_or(0)
    }

    /// Check that the levels form a square mip chain of six full faces.
    pub fn validate(&self) -> Result<(), BackendError> {
        let size = self.size();
        if size == 0 {
            return Err(BackendError::msg("cubemap has no levels"));
        }
        let max_levels = (u32::BITS - size.leading_zeros()) as usize;
        if self.levels.len() > max_levels {
            return Err(BackendError::msg(format!(
                "{} levels for a {size}px cubemap, at most {max_levels} allowed",
                self.levels.len()
            )));
        }
        for (index, level) in self.levels.iter().enumerate() {
            let expected = (size >> index).max(1);
            let texels = expected as usize * expected as usize;
            if level.size != expected
                || level.faces.len() != 6
                || level.faces.iter().any(|face| face.len() != texels)
            {
                return Err(BackendError::msg(format!(
                    "cubemap level {index} is not six {expected}x{expected} faces"
                )));
            }
        }
        Ok(())
    }
}

/// Image-based lighting: prefiltered reflections plus irradiance expressed as
/// 3-band spherical harmonics.
#[derive(Clone, Debug, PartialEq)]
pub struct IblData {
    pub reflections: Cubemap,
    pub irradiance_sh: [[f32; 3]; 9],
    pub intensity: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SkyboxData {
    pub cubemap: Cubemap,
}

/// The capabilities the session needs from a rendering engine.
///
/// Entities created here are not visible until added to the scene. Destroying
/// an entity also releases its renderable and the GPU buffers behind it.
/// All calls happen on the thread that drives [`RenderBackend::submit_frame`].
pub trait RenderBackend {
    /// Create engine, scene, view and renderer.
    fn create_context(config: &SessionConfig) -> Result<Self, BackendError>
    where
        Self: Sized;

    fn create_entity(&mut self) -> Result<Entity, BackendError>;

    fn destroy_entity(&mut self, entity: Entity);

    fn set_transform(&mut self, entity: Entity, world: cgmath::Matrix4<f32>);

    fn create_texture(&mut self, image: &DecodedImage) -> Result<TextureHandle, BackendError>;

    fn destroy_texture(&mut self, texture: TextureHandle);

    /// Attach a renderable with one material instance per primitive.
    fn create_renderable(
        &mut self,
        entity: Entity,
        primitives: &[MeshPrimitive],
    ) -> Result<(), BackendError>;

    /// Overwrite the base color of one primitive's material instance. Returns
    /// `false` if the entity has no such primitive.
    fn set_base_color(&mut self, entity: Entity, primitive: usize, color: Rgba) -> bool;

    fn add_to_scene(&mut self, entities: &[Entity]);

    fn remove_from_scene(&mut self, entities: &[Entity]);

    fn create_indirect_light(&mut self, ibl: &IblData)
    -> Result<IndirectLightHandle, BackendError>;

    fn destroy_indirect_light(&mut self, light: IndirectLightHandle);

    fn create_skybox(&mut self, skybox: &SkyboxData) -> Result<SkyboxHandle, BackendError>;

    fn destroy_skybox(&mut self, skybox: SkyboxHandle);

    /// Install (or clear) the scene's indirect light and background together.
    fn set_environment(&mut self, environment: Option<(IndirectLightHandle, SkyboxHandle)>);

    fn set_camera(&mut self, camera: &CameraMatrices);

    /// Resize the render target. Sizes are non-zero.
    fn set_viewport(&mut self, width: u32, height: u32);

    fn set_view_options(&mut self, options: &ViewOptions);

    /// Render and present one frame of the current scene.
    fn submit_frame(&mut self) -> Result<(), BackendError>;

    /// Release engine, scene, view and renderer. The backend is unusable afterwards.
    fn destroy_context(&mut self);
}
