use std::borrow::Cow;

use bytemuck::{Pod, Zeroable};
use wgpu::naga;
use wgpu::util::DeviceExt;

use crate::compile::{
    check_interface, load_shader_source, CompileError, LinkError, ParsedShader, ShaderCache,
    ShaderInterface, ShaderStage, FALLBACK_SCENE_GLSL, FALLBACK_VERTEX_GLSL,
};
use crate::notify::{CompileNotifier, FailureReports};
use crate::scenes::{SceneLabel, SceneRegistry};
use crate::types::{RendererConfig, RendererError};

/// Interleaved position and uv for the full-screen quad.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct QuadVertex {
    position: [f32; 2],
    uv: [f32; 2],
}

const QUAD_VERTICES: [QuadVertex; 4] = [
    QuadVertex {
        position: [-1.0, -1.0],
        uv: [0.0, 0.0],
    },
    QuadVertex {
        position: [1.0, -1.0],
        uv: [1.0, 0.0],
    },
    QuadVertex {
        position: [1.0, 1.0],
        uv: [1.0, 1.0],
    },
    QuadVertex {
        position: [-1.0, 1.0],
        uv: [0.0, 1.0],
    },
];

const QUAD_INDICES: [u32; 6] = [0, 1, 2, 2, 3, 0];

const QUAD_ATTRIBUTES: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2];

pub(crate) struct QuadGeometry {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
}

impl QuadGeometry {
    pub fn new(device: &wgpu::Device) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("quad vertices"),
            contents: bytemuck::cast_slice(&QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("quad indices"),
            contents: bytemuck::cast_slice(&QUAD_INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex_buffer,
            index_buffer,
            index_count: QUAD_INDICES.len() as u32,
        }
    }

    fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &QUAD_ATTRIBUTES,
        }
    }
}

pub(crate) struct PipelineLayouts {
    pub uniform_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
}

impl PipelineLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("scene uniform layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("scene pipeline layout"),
            bind_group_layouts: &[Some(&uniform_layout)],
            immediate_size: 0,
        });
        Self {
            uniform_layout,
            pipeline_layout,
        }
    }
}

/// Compiled module plus the interface the linker checks.
#[derive(Clone)]
pub(crate) struct ShaderHandle {
    module: wgpu::ShaderModule,
    interface: ShaderInterface,
}

impl ShaderHandle {
    /// Uploads a validated shader. Errors the device raises while creating the
    /// module come back as a compile error for the shader's stage.
    fn create(
        device: &wgpu::Device,
        label: &str,
        parsed: ParsedShader,
    ) -> Result<Self, CompileError> {
        let stage = parsed.stage;
        let scope = device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Glsl {
                shader: Cow::Owned(parsed.source),
                stage: stage.to_naga(),
                defines: &[],
            },
        });
        if let Some(err) = pollster::block_on(scope.pop()) {
            return Err(CompileError::new(stage, err.to_string()));
        }
        Ok(Self {
            module,
            interface: parsed.interface,
        })
    }
}

/// Shader capabilities the device can execute, starting from naga's
/// baseline.
pub(crate) fn shader_capabilities(features: wgpu::Features) -> naga::valid::Capabilities {
    use wgpu::naga::valid::Capabilities;

    let mut capabilities = Capabilities::default();
    for (feature, capability) in [
        (wgpu::Features::SHADER_F64, Capabilities::FLOAT64),
        (wgpu::Features::SHADER_F16, Capabilities::SHADER_FLOAT16),
        (wgpu::Features::SHADER_INT64, Capabilities::SHADER_INT64),
        (wgpu::Features::PRIMITIVE_INDEX, Capabilities::PRIMITIVE_INDEX),
    ] {
        capabilities.set(capability, features.contains(feature));
    }
    capabilities
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ProgramStatus {
    Ready,
    Degraded { log: String },
}

/// One linked scene program.
pub(crate) struct ScenePipeline {
    pub name: String,
    pub pipeline: wgpu::RenderPipeline,
    pub status: ProgramStatus,
}

impl SceneLabel for ScenePipeline {
    fn label(&self) -> &str {
        &self.name
    }

    fn is_degraded(&self) -> bool {
        matches!(self.status, ProgramStatus::Degraded { .. })
    }
}

/// Checks the stage interface and creates the render pipeline.
pub(crate) fn link(
    device: &wgpu::Device,
    layouts: &PipelineLayouts,
    format: wgpu::TextureFormat,
    label: &str,
    vertex: &ShaderHandle,
    fragment: &ShaderHandle,
) -> Result<wgpu::RenderPipeline, LinkError> {
    check_interface(&vertex.interface, &fragment.interface)?;

    let scope = device.push_error_scope(wgpu::ErrorFilter::Validation);
    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(&layouts.pipeline_layout),
        vertex: wgpu::VertexState {
            module: &vertex.module,
            entry_point: Some("main"),
            buffers: &[QuadGeometry::layout()],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
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
        fragment: Some(wgpu::FragmentState {
            module: &fragment.module,
            entry_point: Some("main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview_mask: None,
        cache: None,
    });
    match pollster::block_on(scope.pop()) {
        Some(err) => Err(LinkError::Pipeline(err.to_string())),
        None => Ok(pipeline),
    }
}

/// Compiles the configured shaders and links one program per scene.
///
/// Compile and link failures are reported through `notifier`, once per shader
/// file, and replaced by the built-in fallback so every configured scene
/// stays selectable. Shaders are validated against what `device` supports.
/// The shader cache only lives for the duration of this call.
pub(crate) fn build_scene_registry(
    device: &wgpu::Device,
    layouts: &PipelineLayouts,
    format: wgpu::TextureFormat,
    config: &RendererConfig,
    notifier: &dyn CompileNotifier,
) -> Result<SceneRegistry<ScenePipeline>, RendererError> {
    let mut cache: ShaderCache<ShaderHandle> =
        ShaderCache::with_capabilities(shader_capabilities(device.features()));
    let mut reports = FailureReports::new(notifier);
    let mut compile = |label: &str, source: &str, stage: ShaderStage| {
        cache.compile_with(source, stage, |parsed| {
            ShaderHandle::create(device, label, parsed)
        })
    };

    let fallback_vertex = compile("fallback vertex", FALLBACK_VERTEX_GLSL, ShaderStage::Vertex)
        .map_err(builtin_failure)?;
    let fallback_fragment = compile(
        "fallback scene",
        FALLBACK_SCENE_GLSL,
        ShaderStage::Fragment,
    )
    .map_err(builtin_failure)?;

    let vertex_source = load_shader_source(&config.vertex_shader);
    let vertex = match compile("scene vertex", &vertex_source, ShaderStage::Vertex) {
        Ok(handle) => handle,
        Err(err) => {
            tracing::error!(path = %config.vertex_shader.display(), error = %err, "vertex shader failed; using built-in vertex shader");
            reports.report(
                &config.vertex_shader,
                &format!("Vertex shader: {}", config.vertex_shader.display()),
                &err.log,
            );
            fallback_vertex.clone()
        }
    };

    let mut programs = Vec::with_capacity(config.scenes.len());
    for scene in &config.scenes {
        let source = load_shader_source(&scene.path);
        let linked = compile(&scene.name, &source, ShaderStage::Fragment)
            .map_err(ProgramFailure::Compile)
            .and_then(|fragment| {
                link(device, layouts, format, &scene.name, &vertex, &fragment)
                    .map_err(ProgramFailure::Link)
            });

        let program = match linked {
            Ok(pipeline) => {
                tracing::info!(scene = %scene.name, path = %scene.path.display(), "registered scene");
                ScenePipeline {
                    name: scene.name.clone(),
                    pipeline,
                    status: ProgramStatus::Ready,
                }
            }
            Err(failure) => {
                let log = failure.to_string();
                tracing::error!(scene = %scene.name, path = %scene.path.display(), error = %log, "scene failed; using fallback program");
                reports.report(&scene.path, &format!("Scene \"{}\"", scene.name), &log);
                let pipeline = link(
                    device,
                    layouts,
                    format,
                    &scene.name,
                    &fallback_vertex,
                    &fallback_fragment,
                )
                .map_err(|err| RendererError::BuiltinShader(err.to_string()))?;
                tracing::warn!(scene = %scene.name, "scene registered in degraded state");
                ScenePipeline {
                    name: scene.name.clone(),
                    pipeline,
                    status: ProgramStatus::Degraded { log },
                }
            }
        };
        programs.push(program);
    }

    let cached = cache.len();
    drop(cache);
    tracing::debug!(cached, "released shader cache");

    SceneRegistry::from_programs(programs).ok_or(RendererError::NoScenes)
}

#[derive(Debug, thiserror::Error)]
enum ProgramFailure {
    #[error(transparent)]
    Compile(CompileError),
    #[error("link failed: {0}")]
    Link(LinkError),
}

fn builtin_failure(err: CompileError) -> RendererError {
    RendererError::BuiltinShader(err.to_string())
}
