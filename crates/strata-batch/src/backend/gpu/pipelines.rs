use crate::backend::FrameUniforms;
use crate::batch::{BakedCorner, InstanceRecord, QuadCorner, Vertex, UNIFORM_BATCH_INSTANCES};

use super::TEXTURE_BINDINGS;

// ── blend ─────────────────────────────────────────────────────────────────

fn premul_alpha_blend() -> wgpu::BlendState {
    let component = wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
        operation: wgpu::BlendOperation::Add,
    };
    wgpu::BlendState {
        color: component,
        alpha: component,
    }
}

// ── vertex layouts ────────────────────────────────────────────────────────

const GEOMETRY_ATTRS: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
    0 => Float32x2, // position
    1 => Float32x2, // uv
    2 => Float32x4, // color
    3 => Uint32     // texture_slot
];

const BAKED_ATTRS: [wgpu::VertexAttribute; 2] = wgpu::vertex_attr_array![
    0 => Float32x2, // corner
    1 => Uint32     // instance
];

const CORNER_ATTRS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];

const INSTANCE_ATTRS: [wgpu::VertexAttribute; 6] = wgpu::vertex_attr_array![
    1 => Float32x2, // position
    2 => Float32x2, // size
    3 => Float32x4, // color
    4 => Float32x4, // uv_rect
    5 => Float32,   // rotation
    6 => Uint32     // texture_slot
];

fn layout<T>(step_mode: wgpu::VertexStepMode, attributes: &'static [wgpu::VertexAttribute]) -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<T>() as u64,
        step_mode,
        attributes,
    }
}

// ── pipelines ─────────────────────────────────────────────────────────────

/// Shared bind group layout plus one pipeline per vertex layout.
pub(super) struct Pipelines {
    pub bind_group_layout: wgpu::BindGroupLayout,
    pub geometry: wgpu::RenderPipeline,
    pub uniform_template: wgpu::RenderPipeline,
    pub instanced: wgpu::RenderPipeline,
}

impl Pipelines {
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat, label: &str) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&format!("{label} batch shader")),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/batch.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&format!("{label} batch bgl")),
            entries: &bind_group_layout_entries(),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("{label} batch pipeline layout")),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let build = |name: &str, entry_point: &str, buffers: &[wgpu::VertexBufferLayout<'_>]| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&format!("{label} {name} pipeline")),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some(entry_point),
                    compilation_options: Default::default(),
                    buffers,
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some("fs_main"),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: Some(premul_alpha_blend()),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            })
        };

        let geometry = build(
            "geometry",
            "vs_geometry",
            &[layout::<Vertex>(wgpu::VertexStepMode::Vertex, &GEOMETRY_ATTRS)],
        );
        let uniform_template = build(
            "uniform-array",
            "vs_uniform",
            &[layout::<BakedCorner>(wgpu::VertexStepMode::Vertex, &BAKED_ATTRS)],
        );
        let instanced = build(
            "instanced",
            "vs_instanced",
            &[
                layout::<QuadCorner>(wgpu::VertexStepMode::Vertex, &CORNER_ATTRS),
                layout::<InstanceRecord>(wgpu::VertexStepMode::Instance, &INSTANCE_ATTRS),
            ],
        );

        Self {
            bind_group_layout,
            geometry,
            uniform_template,
            instanced,
        }
    }
}

/// Size of the uniform instance array binding.
pub(super) const INSTANCE_ARRAY_BYTES: u64 =
    (UNIFORM_BATCH_INSTANCES * std::mem::size_of::<InstanceRecord>()) as u64;

fn bind_group_layout_entries() -> Vec<wgpu::BindGroupLayoutEntry> {
    let uniform = |binding: u32, size: u64| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: wgpu::BufferSize::new(size),
        },
        count: None,
    };

    let mut entries = vec![
        uniform(0, std::mem::size_of::<FrameUniforms>() as u64),
        uniform(1, INSTANCE_ARRAY_BYTES),
        wgpu::BindGroupLayoutEntry {
            binding: 2,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        },
    ];
    entries.extend((0..TEXTURE_BINDINGS).map(|unit| wgpu::BindGroupLayoutEntry {
        binding: 3 + unit,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }));
    entries
}
