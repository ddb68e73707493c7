//! Offscreen wgpu renderer.
//!
//! Renders into an owned color target instead of a window surface; hosts
//! present the result themselves or read it back with
//! [`WgpuBackend::capture_frame`]. Shading is deliberately plain: base color
//! factor times base color map, lit by the indirect light's irradiance
//! harmonics plus a dielectric reflection, in front of the skybox.
//!
//! Recognised [`BackendOptions`](crate::config::BackendOptions) keys, besides
//! the adapter options of [`context::GpuContext`]: `width` and `height`
//! override the configured viewport.

pub mod context;
pub mod pipeline;
pub mod texture;

use std::{
    collections::{BTreeSet, HashMap},
    iter,
};

use anyhow::Context as _;
use cgmath::{Matrix4, SquareMatrix};
use wgpu::util::DeviceExt;

use crate::{
    backend::{
        Cubemap, DecodedImage, IblData, IndirectLightHandle, MaterialDesc, MeshPrimitive,
        RenderBackend, SkyboxData, SkyboxHandle, TextureHandle,
    },
    camera::CameraMatrices,
    config::{SessionConfig, ViewOptions},
    data_structures::{color::Rgba, scene_graph::Entity},
    error::BackendError,
};

use self::{
    context::GpuContext,
    pipeline::{CameraUniform, EnvironmentUniform, Layouts, Pipelines, PrimitiveUniform},
    texture::Texture,
};

/// Exposure of a camera at f/16, 1/125 s, ISO 100.
const EXPOSURE: f32 = 1.0 / (1.2 * 32_000.0);
const MSAA_SAMPLES: u32 = 4;

struct GpuPrimitive {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    material: MaterialDesc,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

struct GpuEntity {
    transform: Matrix4<f32>,
    primitives: Vec<GpuPrimitive>,
}

struct GpuIndirectLight {
    reflections: Texture,
    irradiance_sh: [[f32; 3]; 9],
    intensity: f32,
}

struct GpuSkybox {
    cubemap: Texture,
    bind_group: wgpu::BindGroup,
}

struct Targets {
    size: [u32; 2],
    color: Texture,
    msaa: Option<Texture>,
    depth: Texture,
}

impl Targets {
    fn new(device: &wgpu::Device, size: [u32; 2], sample_count: u32) -> Self {
        Self {
            size,
            color: Texture::create_color_target(device, size, 1, "color_target"),
            msaa: (sample_count > 1).then(|| {
                Texture::create_color_target(device, size, sample_count, "msaa_target")
            }),
            depth: Texture::create_depth_texture(device, size, sample_count, "depth_texture"),
        }
    }
}

fn build_frame_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    camera_buffer: &wgpu::Buffer,
    environment_buffer: &wgpu::Buffer,
    reflections: &wgpu::TextureView,
    sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: environment_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::TextureView(reflections),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
        label: Some("frame_bind_group"),
    })
}

pub struct WgpuBackend {
    ctx: GpuContext,
    layouts: Layouts,
    pipelines: Pipelines,
    targets: Targets,
    clear_colour: wgpu::Color,
    camera_buffer: wgpu::Buffer,
    environment_buffer: wgpu::Buffer,
    frame_bind_group: wgpu::BindGroup,
    cube_sampler: wgpu::Sampler,
    empty_cubemap: Texture,
    white: Texture,
    next_id: u64,
    next_entity: u32,
    entities: HashMap<Entity, GpuEntity>,
    scene: BTreeSet<Entity>,
    textures: HashMap<TextureHandle, Texture>,
    indirect_lights: HashMap<IndirectLightHandle, GpuIndirectLight>,
    skyboxes: HashMap<SkyboxHandle, GpuSkybox>,
    environment: Option<(IndirectLightHandle, SkyboxHandle)>,
    destroyed: bool,
}

impl WgpuBackend {
    fn next_handle(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.ctx.adapter_info
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.ctx.device
    }

    fn ensure_alive(&self) -> Result<(), BackendError> {
        if self.destroyed {
            return Err(BackendError::msg("backend context was destroyed"));
        }
        Ok(())
    }

    fn check_cubemap(&self, cubemap: &Cubemap) -> Result<(), BackendError> {
        cubemap.validate()?;
        let limit = self.ctx.device.limits().max_texture_dimension_2d;
        if cubemap.size() > limit {
            return Err(BackendError::msg(format!(
                "{}px cubemap exceeds the device limit of {limit}px",
                cubemap.size()
            )));
        }
        Ok(())
    }

    fn write_primitive_uniform(&self, transform: Matrix4<f32>, primitive: &GpuPrimitive) {
        let uniform = PrimitiveUniform {
            model: transform.into(),
            base_color: primitive.material.base_color.into(),
        };
        self.ctx
            .queue
            .write_buffer(&primitive.uniform_buffer, 0, bytemuck::cast_slice(&[uniform]));
    }

    /// Copy the last rendered frame back to the CPU.
    pub fn capture_frame(&self) -> anyhow::Result<image::RgbaImage> {
        let [width, height] = self.targets.size;
        let u32_size = std::mem::size_of::<u32>() as u32;
        let unpadded = u32_size * width;
        let padded = unpadded.next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let output_buffer = self.ctx.device.create_buffer(&wgpu::BufferDescriptor {
            size: (padded * height) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            label: Some("capture buffer"),
            mapped_at_creation: false,
        });
        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Capture Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture: &self.targets.color.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &output_buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.ctx.queue.submit(iter::once(encoder.finish()));

        // NOTE: the mapping has to be requested before polling, otherwise the
        // receive below never resolves.
        let buffer_slice = output_buffer.slice(..);
        let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.ctx
            .device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .context("waiting for the frame copy")?;
        futures::executor::block_on(rx.receive())
            .context("frame copy was dropped")?
            .context("mapping the frame copy")?;

        let data = buffer_slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((unpadded * height) as usize);
        for row in data.chunks(padded as usize).take(height as usize) {
            pixels.extend_from_slice(&row[..unpadded as usize]);
        }
        drop(data);
        output_buffer.unmap();
        image::RgbaImage::from_raw(width, height, pixels).context("frame size mismatch")
    }
}

impl RenderBackend for WgpuBackend {
    fn create_context(config: &SessionConfig) -> Result<Self, BackendError> {
        let options = &config.backend_options;
        let ctx = futures::executor::block_on(GpuContext::new(options))?;
        let size = [
            options.get_parsed("width").unwrap_or(config.viewport[0]),
            options.get_parsed("height").unwrap_or(config.viewport[1]),
        ];
        let sample_count = if config.view_options.msaa {
            MSAA_SAMPLES
        } else {
            1
        };

        let layouts = Layouts::new(&ctx.device);
        let pipelines = Pipelines::new(&ctx.device, &layouts, sample_count);
        let targets = Targets::new(&ctx.device, size, sample_count);

        let camera_buffer = ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Camera Buffer"),
                contents: bytemuck::cast_slice(&[CameraUniform {
                    view_proj: Matrix4::identity().into(),
                    inv_view_proj: Matrix4::identity().into(),
                    eye: [0.0, 0.0, 0.0, 1.0],
                }]),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });
        let environment_buffer = ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Environment Buffer"),
                contents: bytemuck::cast_slice(&[EnvironmentUniform {
                    sh: [[0.0; 4]; 9],
                    params: [0.0; 4],
                }]),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });
        let empty_cubemap = Texture::empty_cubemap(&ctx.device, &ctx.queue);
        let white = Texture::white(&ctx.device, &ctx.queue);
        let [r, g, b, a] = config.clear_color.0;

        let cube_sampler = texture::create_default_sampler(&ctx.device);
        let frame_bind_group = build_frame_bind_group(
            &ctx.device,
            &layouts.frame,
            &camera_buffer,
            &environment_buffer,
            &empty_cubemap.view,
            &cube_sampler,
        );

        log::info!(
            "wgpu backend ready: {}x{}, {} samples",
            size[0],
            size[1],
            sample_count
        );
        Ok(Self {
            ctx,
            layouts,
            pipelines,
            targets,
            clear_colour: wgpu::Color {
                r: f64::from(r),
                g: f64::from(g),
                b: f64::from(b),
                a: f64::from(a),
            },
            camera_buffer,
            environment_buffer,
            frame_bind_group,
            cube_sampler,
            empty_cubemap,
            white,
            next_id: 0,
            next_entity: 0,
            entities: HashMap::new(),
            scene: BTreeSet::new(),
            textures: HashMap::new(),
            indirect_lights: HashMap::new(),
            skyboxes: HashMap::new(),
            environment: None,
            destroyed: false,
        })
    }

    fn create_entity(&mut self) -> Result<Entity, BackendError> {
        self.ensure_alive()?;
        self.next_entity += 1;
        let entity = Entity::from_raw(self.next_entity);
        self.entities.insert(
            entity,
            GpuEntity {
                transform: Matrix4::identity(),
                primitives: Vec::new(),
            },
        );
        Ok(entity)
    }

    fn destroy_entity(&mut self, entity: Entity) {
        self.scene.remove(&entity);
        if let Some(record) = self.entities.remove(&entity) {
            for primitive in record.primitives {
                primitive.vertex_buffer.destroy();
                primitive.index_buffer.destroy();
                primitive.uniform_buffer.destroy();
            }
        }
    }

    fn set_transform(&mut self, entity: Entity, world: Matrix4<f32>) {
        let Some(record) = self.entities.get_mut(&entity) else {
            return;
        };
        record.transform = world;
        let Some(record) = self.entities.get(&entity) else {
            return;
        };
        for primitive in &record.primitives {
            self.write_primitive_uniform(world, primitive);
        }
    }

    fn create_texture(&mut self, image: &DecodedImage) -> Result<TextureHandle, BackendError> {
        self.ensure_alive()?;
        let limit = self.ctx.device.limits().max_texture_dimension_2d;
        if image.width == 0 || image.height == 0 || image.width > limit || image.height > limit {
            return Err(BackendError::msg(format!(
                "texture {} is {}x{}, the device allows 1..={}",
                image.label, image.width, image.height, limit
            )));
        }
        let texture = Texture::from_decoded(&self.ctx.device, &self.ctx.queue, image);
        let handle = TextureHandle::from_raw(self.next_handle());
        self.textures.insert(handle, texture);
        Ok(handle)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if let Some(texture) = self.textures.remove(&texture) {
            texture.texture.destroy();
        }
    }

    fn create_renderable(
        &mut self,
        entity: Entity,
        primitives: &[MeshPrimitive],
    ) -> Result<(), BackendError> {
        self.ensure_alive()?;
        let transform = self
            .entities
            .get(&entity)
            .map(|record| record.transform)
            .ok_or_else(|| BackendError::msg(format!("unknown entity {entity:?}")))?;

        let mut created = Vec::with_capacity(primitives.len());
        for primitive in primitives {
            let base_color = match primitive.material.base_color_texture {
                Some(handle) => self.textures.get(&handle).ok_or_else(|| {
                    BackendError::msg(format!("material samples unknown texture {handle:?}"))
                })?,
                None => &self.white,
            };
            let device = &self.ctx.device;
            let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Vertex Buffer"),
                contents: bytemuck::cast_slice(&primitive.vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
            let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Index Buffer"),
                contents: bytemuck::cast_slice(&primitive.indices),
                usage: wgpu::BufferUsages::INDEX,
            });
            let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Primitive Buffer"),
                contents: bytemuck::cast_slice(&[PrimitiveUniform {
                    model: transform.into(),
                    base_color: primitive.material.base_color.into(),
                }]),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });
            let sampler = base_color.sampler.as_ref().unwrap_or(&self.cube_sampler);
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                layout: &self.layouts.material,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: uniform_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&base_color.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::Sampler(sampler),
                    },
                ],
                label: primitive.material.name.as_deref(),
            });
            created.push(GpuPrimitive {
                vertex_buffer,
                index_buffer,
                index_count: primitive.indices.len() as u32,
                material: primitive.material.clone(),
                uniform_buffer,
                bind_group,
            });
        }
        if let Some(record) = self.entities.get_mut(&entity) {
            record.primitives = created;
        }
        Ok(())
    }

    fn set_base_color(&mut self, entity: Entity, primitive: usize, color: Rgba) -> bool {
        let Some(record) = self.entities.get_mut(&entity) else {
            return false;
        };
        let transform = record.transform;
        let Some(target) = record.primitives.get_mut(primitive) else {
            return false;
        };
        target.material.base_color = color;
        if let Some(target) = self
            .entities
            .get(&entity)
            .and_then(|record| record.primitives.get(primitive))
        {
            self.write_primitive_uniform(transform, target);
        }
        true
    }

    fn add_to_scene(&mut self, entities: &[Entity]) {
        for &entity in entities {
            if self.entities.contains_key(&entity) {
                self.scene.insert(entity);
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
        self.check_cubemap(&ibl.reflections)?;
        let reflections =
            Texture::cubemap(&self.ctx.device, &self.ctx.queue, &ibl.reflections, "reflections");
        let handle = IndirectLightHandle::from_raw(self.next_handle());
        self.indirect_lights.insert(
            handle,
            GpuIndirectLight {
                reflections,
                irradiance_sh: ibl.irradiance_sh,
                intensity: ibl.intensity,
            },
        );
        Ok(handle)
    }

    fn destroy_indirect_light(&mut self, light: IndirectLightHandle) {
        if self.environment.is_some_and(|(active, _)| active == light) {
            self.set_environment(None);
        }
        if let Some(light) = self.indirect_lights.remove(&light) {
            light.reflections.texture.destroy();
        }
    }

    fn create_skybox(&mut self, skybox: &SkyboxData) -> Result<SkyboxHandle, BackendError> {
        self.ensure_alive()?;
        self.check_cubemap(&skybox.cubemap)?;
        let cubemap = Texture::cubemap(&self.ctx.device, &self.ctx.queue, &skybox.cubemap, "skybox");
        let sampler = cubemap.sampler.as_ref().unwrap_or(&self.cube_sampler);
        let bind_group = self
            .ctx
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                layout: &self.layouts.skybox,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&cubemap.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(sampler),
                    },
                ],
                label: Some("skybox_bind_group"),
            });
        let handle = SkyboxHandle::from_raw(self.next_handle());
        self.skyboxes.insert(handle, GpuSkybox { cubemap, bind_group });
        Ok(handle)
    }

    fn destroy_skybox(&mut self, skybox: SkyboxHandle) {
        if self.environment.is_some_and(|(_, active)| active == skybox) {
            self.set_environment(None);
        }
        if let Some(skybox) = self.skyboxes.remove(&skybox) {
            skybox.cubemap.texture.destroy();
        }
    }

    fn set_environment(&mut self, environment: Option<(IndirectLightHandle, SkyboxHandle)>) {
        self.environment = environment;
        let active = environment.and_then(|(light, _)| self.indirect_lights.get(&light));
        let uniform = match active {
            Some(light) => {
                let mut sh = [[0.0; 4]; 9];
                for (dst, src) in sh.iter_mut().zip(light.irradiance_sh) {
                    dst[..3].copy_from_slice(&src);
                }
                EnvironmentUniform {
                    sh,
                    params: [light.intensity * EXPOSURE, 1.0, 0.0, 0.0],
                }
            }
            None => EnvironmentUniform {
                sh: [[0.0; 4]; 9],
                params: [0.0; 4],
            },
        };
        self.ctx
            .queue
            .write_buffer(&self.environment_buffer, 0, bytemuck::cast_slice(&[uniform]));
        let reflections = active.map_or(&self.empty_cubemap, |light| &light.reflections);
        self.frame_bind_group = build_frame_bind_group(
            &self.ctx.device,
            &self.layouts.frame,
            &self.camera_buffer,
            &self.environment_buffer,
            &reflections.view,
            &self.cube_sampler,
        );
    }

    fn set_camera(&mut self, camera: &CameraMatrices) {
        let uniform = CameraUniform {
            view_proj: camera.view_proj().into(),
            inv_view_proj: camera.inv_view_proj().into(),
            eye: camera.eye.to_homogeneous().into(),
        };
        self.ctx
            .queue
            .write_buffer(&self.camera_buffer, 0, bytemuck::cast_slice(&[uniform]));
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        self.targets = Targets::new(&self.ctx.device, [width, height], self.pipelines.sample_count);
    }

    fn set_view_options(&mut self, options: &ViewOptions) {
        let sample_count = if options.msaa { MSAA_SAMPLES } else { 1 };
        if sample_count != self.pipelines.sample_count {
            self.pipelines = Pipelines::new(&self.ctx.device, &self.layouts, sample_count);
            self.targets = Targets::new(&self.ctx.device, self.targets.size, sample_count);
        }
        log::debug!("view options applied: {:?}", options);
    }

    fn submit_frame(&mut self) -> Result<(), BackendError> {
        self.ensure_alive()?;
        let skybox = match self.environment {
            Some((light, skybox)) => {
                if !self.indirect_lights.contains_key(&light) {
                    return Err(BackendError::msg("scene references a destroyed indirect light"));
                }
                Some(
                    self.skyboxes
                        .get(&skybox)
                        .ok_or_else(|| BackendError::msg("scene references a destroyed skybox"))?,
                )
            }
            None => None,
        };

        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });
        {
            let (view, resolve_target) = match &self.targets.msaa {
                Some(msaa) => (&msaa.view, Some(&self.targets.color.view)),
                None => (&self.targets.color.view, None),
            };
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_colour),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.targets.depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            render_pass.set_bind_group(0, &self.frame_bind_group, &[]);
            if let Some(skybox) = skybox {
                render_pass.set_pipeline(&self.pipelines.skybox);
                render_pass.set_bind_group(1, &skybox.bind_group, &[]);
                render_pass.draw(0..3, 0..1);
            }

            // opaque first, then blended primitives over them
            for blended in [false, true] {
                for entity in &self.scene {
                    let Some(record) = self.entities.get(entity) else {
                        continue;
                    };
                    for primitive in record
                        .primitives
                        .iter()
                        .filter(|p| p.material.blend == blended)
                    {
                        let pipeline = match (blended, primitive.material.double_sided) {
                            (true, _) => &self.pipelines.blend,
                            (false, true) => &self.pipelines.double_sided,
                            (false, false) => &self.pipelines.opaque,
                        };
                        render_pass.set_pipeline(pipeline);
                        render_pass.set_bind_group(1, &primitive.bind_group, &[]);
                        render_pass.set_vertex_buffer(0, primitive.vertex_buffer.slice(..));
                        render_pass.set_index_buffer(
                            primitive.index_buffer.slice(..),
                            wgpu::IndexFormat::Uint32,
                        );
                        render_pass.draw_indexed(0..primitive.index_count, 0, 0..1);
                    }
                }
            }
        }
        self.ctx.queue.submit(iter::once(encoder.finish()));
        Ok(())
    }

    fn destroy_context(&mut self) {
        let entities: Vec<Entity> = self.entities.keys().copied().collect();
        for entity in entities {
            self.destroy_entity(entity);
        }
        let textures: Vec<TextureHandle> = self.textures.keys().copied().collect();
        for texture in textures {
            self.destroy_texture(texture);
        }
        self.set_environment(None);
        let lights: Vec<IndirectLightHandle> = self.indirect_lights.keys().copied().collect();
        for light in lights {
            self.destroy_indirect_light(light);
        }
        let skyboxes: Vec<SkyboxHandle> = self.skyboxes.keys().copied().collect();
        for skybox in skyboxes {
            self.destroy_skybox(skybox);
        }
        self.destroyed = true;
        log::info!("wgpu backend destroyed");
    }
}
