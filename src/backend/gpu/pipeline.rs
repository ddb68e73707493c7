//! Render pipelines and bind group layouts of the wgpu backend.

use crate::backend::{ModelVertex, gpu::texture::Texture};

/// Per-frame data: view / projection and the eye position.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    pub view_proj: [[f32; 4]; 4],
    pub inv_view_proj: [[f32; 4]; 4],
    pub eye: [f32; 4],
}

/// Irradiance harmonics and scaled intensity of the active indirect light.
/// `params.x` is the exposed intensity, `params.y` is 1 when an
/// environment is installed.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct EnvironmentUniform {
    pub sh: [[f32; 4]; 9],
    pub params: [f32; 4],
}

/// Per-primitive data: world matrix and the material instance.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PrimitiveUniform {
    pub model: [[f32; 4]; 4],
    pub base_color: [f32; 4],
}

impl ModelVertex {
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<ModelVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 6]>() as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x2,
                },
            ],
        }
    }
}

fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn texture_entry(
    binding: u32,
    view_dimension: wgpu::TextureViewDimension,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            multisampled: false,
            view_dimension,
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
        },
        count: None,
    }
}

fn sampler_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    }
}

/// Group 0: camera, environment uniform, reflection cubemap.
pub fn frame_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[
            uniform_entry(0, wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT),
            uniform_entry(1, wgpu::ShaderStages::FRAGMENT),
            texture_entry(2, wgpu::TextureViewDimension::Cube),
            sampler_entry(3),
        ],
        label: Some("frame_bind_group_layout"),
    })
}

/// Group 1 of the model pipelines: primitive uniform and base color map.
pub fn material_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[
            uniform_entry(0, wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT),
            texture_entry(1, wgpu::TextureViewDimension::D2),
            sampler_entry(2),
        ],
        label: Some("material_bind_group_layout"),
    })
}

/// Group 1 of the skybox pipeline.
pub fn skybox_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[texture_entry(0, wgpu::TextureViewDimension::Cube), sampler_entry(1)],
        label: Some("skybox_bind_group_layout"),
    })
}

pub struct Layouts {
    pub frame: wgpu::BindGroupLayout,
    pub material: wgpu::BindGroupLayout,
    pub skybox: wgpu::BindGroupLayout,
}

impl Layouts {
    pub fn new(device: &wgpu::Device) -> Self {
        Self {
            frame: frame_layout(device),
            material: material_layout(device),
            skybox: skybox_layout(device),
        }
    }
}

/// Every pipeline the backend draws with, built for one sample count.
pub struct Pipelines {
    pub opaque: wgpu::RenderPipeline,
    pub double_sided: wgpu::RenderPipeline,
    pub blend: wgpu::RenderPipeline,
    pub skybox: wgpu::RenderPipeline,
    pub sample_count: u32,
}

impl Pipelines {
    pub fn new(device: &wgpu::Device, layouts: &Layouts, sample_count: u32) -> Self {
        let model_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Model Pipeline Layout"),
            bind_group_layouts: &[&layouts.frame, &layouts.material],
            push_constant_ranges: &[],
        });
        let model_shader = || wgpu::ShaderModuleDescriptor {
            label: Some("Model Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("model.wgsl").into()),
        };
        let model = |blend, cull_mode, depth_write_enabled| {
            mk_render_pipeline(
                device,
                &model_layout,
                PipelineOptions {
                    blend,
                    cull_mode,
                    depth_write_enabled,
                    depth_compare: wgpu::CompareFunction::Less,
                    sample_count,
                },
                &[ModelVertex::desc()],
                model_shader(),
            )
        };
        let opaque = model(Some(wgpu::BlendState::REPLACE), Some(wgpu::Face::Back), true);
        let double_sided = model(Some(wgpu::BlendState::REPLACE), None, true);
        let blend = model(Some(wgpu::BlendState::ALPHA_BLENDING), None, false);

        let skybox_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Skybox Pipeline Layout"),
            bind_group_layouts: &[&layouts.frame, &layouts.skybox],
            push_constant_ranges: &[],
        });
        let skybox = mk_render_pipeline(
            device,
            &skybox_layout,
            PipelineOptions {
                blend: Some(wgpu::BlendState::REPLACE),
                cull_mode: None,
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::LessEqual,
                sample_count,
            },
            &[],
            wgpu::ShaderModuleDescriptor {
                label: Some("Skybox Shader"),
                source: wgpu::ShaderSource::Wgsl(include_str!("skybox.wgsl").into()),
            },
        );

        Self {
            opaque,
            double_sided,
            blend,
            skybox,
            sample_count,
        }
    }
}

pub struct PipelineOptions {
    pub blend: Option<wgpu::BlendState>,
    pub cull_mode: Option<wgpu::Face>,
    pub depth_write_enabled: bool,
    pub depth_compare: wgpu::CompareFunction,
    pub sample_count: u32,
}

pub fn mk_render_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    options: PipelineOptions,
    vertex_layouts: &[wgpu::VertexBufferLayout],
    shader: wgpu::ShaderModuleDescriptor,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(shader);

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        cache: None,
        label: Some("Render Pipeline"),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: vertex_layouts,
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: Texture::COLOR_FORMAT,
                blend: options.blend,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: options.cull_mode,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: Texture::DEPTH_FORMAT,
            depth_write_enabled: options.depth_write_enabled,
            depth_compare: options.depth_compare,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState {
            count: options.sample_count,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
    })
}
