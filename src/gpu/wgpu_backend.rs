// fluid-cursor - GPU fluid simulation cursor effect
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

//! wgpu implementation of [`Backend`].
//!
//! Each draw is its own render pass and submission; the program's uniform
//! buffer is rewritten with `queue.write_buffer` right before it, so uniform
//! values never leak between passes. Pipelines are built lazily per
//! (program, target format, blend, offscreen) and cached.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use super::{
    Backend, BackendError, BlendMode, ContextKind, DataType, DrawCall, Filter, InternalFormat, PixelFormat, ProgramId,
    ShaderId, ShaderModule, ShaderStage, TextureDesc, TextureId,
};
use crate::shaders::reflect::{reflect_program, ProgramLayout};

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct QuadVertex {
    position: [f32; 2],
}

const QUAD_VERTICES: [QuadVertex; 4] = [
    QuadVertex { position: [-1.0, -1.0] },
    QuadVertex { position: [-1.0, 1.0] },
    QuadVertex { position: [1.0, 1.0] },
    QuadVertex { position: [1.0, -1.0] },
];
const QUAD_INDICES: [u16; 6] = [0, 1, 2, 0, 2, 3];

/// Vertex-stage override that flips clip-space y for offscreen targets.
const FLIP_Y: &str = "FLIP_Y";

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    desc: TextureDesc,
    format: wgpu::TextureFormat,
}

struct GpuShader {
    stage: ShaderStage,
    entry_point: String,
    source: String,
    module: wgpu::ShaderModule,
}

struct GpuProgram {
    vertex: ShaderId,
    fragment: ShaderId,
    layout: ProgramLayout,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    uniform_buffer: wgpu::Buffer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: ProgramId,
    format: wgpu::TextureFormat,
    blend: Option<BlendMode>,
    offscreen: bool,
}

struct SurfaceFrame {
    output: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
    cleared: bool,
}

pub struct WgpuBackend {
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,
    frame: Option<SurfaceFrame>,

    quad_vertices: wgpu::Buffer,
    quad_indices: wgpu::Buffer,
    linear_sampler: wgpu::Sampler,
    nearest_sampler: wgpu::Sampler,
    placeholder: GpuTexture,

    textures: HashMap<TextureId, GpuTexture>,
    shaders: HashMap<ShaderId, GpuShader>,
    programs: HashMap<ProgramId, GpuProgram>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    next_id: u32,
}

fn texture_format(internal_format: InternalFormat) -> wgpu::TextureFormat {
    match internal_format {
        InternalFormat::R16F => wgpu::TextureFormat::R16Float,
        InternalFormat::Rg16F => wgpu::TextureFormat::Rg16Float,
        // An unsized RGBA half-float texture is stored the same way.
        InternalFormat::Rgba16F | InternalFormat::Rgba => wgpu::TextureFormat::Rgba16Float,
    }
}

fn blend_state(blend: Option<BlendMode>) -> wgpu::BlendState {
    match blend {
        Some(BlendMode::PremultipliedOver) => wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING,
        None => wgpu::BlendState::REPLACE,
    }
}

fn create_gpu_texture(device: &wgpu::Device, label: &str, desc: TextureDesc) -> GpuTexture {
    let format = texture_format(desc.internal_format);
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: desc.width,
            height: desc.height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    GpuTexture {
        texture,
        view,
        desc,
        format,
    }
}

fn create_sampler(device: &wgpu::Device, label: &str, filter: wgpu::FilterMode) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some(label),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: filter,
        min_filter: filter,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    })
}

impl WgpuBackend {
    pub async fn new(window: Arc<winit::window::Window>, transparent: bool) -> anyhow::Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .context("Failed to create surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                ..Default::default()
            })
            .await
            .context("No compatible GPU adapter")?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Fluid Cursor Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await
            .context("Failed to create device")?;

        let info = adapter.get_info();
        log::info!("Using adapter '{}' ({:?})", info.name, info.backend);

        let size = window.inner_size();
        let surface_caps = surface.get_capabilities(&adapter);
        // Blending happens in linear space on the dye values directly.
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| !f.is_srgb())
            .copied()
            .or_else(|| surface_caps.formats.first().copied())
            .context("Surface reports no formats")?;
        let alpha_mode = if transparent
            && surface_caps
                .alpha_modes
                .contains(&wgpu::CompositeAlphaMode::PreMultiplied)
        {
            wgpu::CompositeAlphaMode::PreMultiplied
        } else {
            surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto)
        };

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        let quad_vertices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Quad Vertices"),
            contents: bytemuck::cast_slice(&QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let quad_indices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Quad Indices"),
            contents: bytemuck::cast_slice(&QUAD_INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });

        let linear_sampler = create_sampler(&device, "Linear Sampler", wgpu::FilterMode::Linear);
        let nearest_sampler = create_sampler(&device, "Nearest Sampler", wgpu::FilterMode::Nearest);
        let placeholder = create_gpu_texture(
            &device,
            "Placeholder Texture",
            TextureDesc {
                width: 1,
                height: 1,
                internal_format: InternalFormat::Rgba16F,
                format: PixelFormat::Rgba,
                data_type: DataType::HalfFloat,
                filter: Filter::Nearest,
            },
        );

        Ok(Self {
            adapter,
            device,
            queue,
            surface,
            surface_config,
            frame: None,
            quad_vertices,
            quad_indices,
            linear_sampler,
            nearest_sampler,
            placeholder,
            textures: HashMap::new(),
            shaders: HashMap::new(),
            programs: HashMap::new(),
            pipelines: HashMap::new(),
            next_id: 1,
        })
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn format_features(&self, format: wgpu::TextureFormat) -> wgpu::TextureFormatFeatures {
        self.adapter.get_texture_format_features(format)
    }

    fn create_pipeline(&self, key: PipelineKey) -> Result<wgpu::RenderPipeline, String> {
        let program = self.programs.get(&key.program).ok_or("unknown program")?;
        let vertex = self.shaders.get(&program.vertex).ok_or("unknown vertex shader")?;
        let fragment = self.shaders.get(&program.fragment).ok_or("unknown fragment shader")?;

        let constants = HashMap::from([(FLIP_Y.to_string(), if key.offscreen { -1.0 } else { 1.0 })]);

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&format!("{:?} Pipeline", key.program)),
            layout: Some(&program.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex.module,
                entry_point: &vertex.entry_point,
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &wgpu::vertex_attr_array![0 => Float32x2],
                }],
                compilation_options: wgpu::PipelineCompilationOptions {
                    constants: &constants,
                    ..Default::default()
                },
            },
            fragment: Some(wgpu::FragmentState {
                module: &fragment.module,
                entry_point: &fragment.entry_point,
                targets: &[Some(wgpu::ColorTargetState {
                    format: key.format,
                    blend: Some(blend_state(key.blend)),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
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
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
            cache: None,
        });
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => Err(err.to_string()),
            None => Ok(pipeline),
        }
    }

    fn ensure_pipeline(&mut self, key: PipelineKey) -> bool {
        if self.pipelines.contains_key(&key) {
            return true;
        }
        match self.create_pipeline(key) {
            Ok(pipeline) => {
                self.pipelines.insert(key, pipeline);
                true
            }
            Err(err) => {
                log::error!("Failed to build pipeline for {:?}: {}", key.program, err);
                false
            }
        }
    }

    fn reconfigure_surface(&mut self) {
        self.surface.configure(&self.device, &self.surface_config);
    }
}

impl Backend for WgpuBackend {
    fn context_kind(&self) -> ContextKind {
        ContextKind::Es3
    }

    fn supports_linear_filtering(&self) -> bool {
        self.format_features(wgpu::TextureFormat::Rgba16Float)
            .flags
            .contains(wgpu::TextureFormatFeatureFlags::FILTERABLE)
    }

    fn supports_render_format(
        &mut self,
        internal_format: InternalFormat,
        format: PixelFormat,
        data_type: DataType,
    ) -> bool {
        if data_type != DataType::HalfFloat {
            return false;
        }
        let wgpu_format = texture_format(internal_format);
        if wgpu_format.components() as usize != format.channels() {
            return false;
        }
        self.format_features(wgpu_format)
            .allowed_usages
            .contains(wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING)
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId, BackendError> {
        let max = self.device.limits().max_texture_dimension_2d;
        if desc.width == 0 || desc.height == 0 || desc.width > max || desc.height > max {
            return Err(BackendError::InvalidSize(desc.width, desc.height));
        }
        if !self.supports_render_format(desc.internal_format, desc.format, desc.data_type) {
            return Err(BackendError::UnsupportedFormat(desc.internal_format, desc.data_type));
        }
        let mut desc = *desc;
        if !self.supports_linear_filtering() {
            desc.filter = Filter::Nearest;
        }
        let id = TextureId(self.allocate_id());
        let texture = create_gpu_texture(&self.device, &format!("Field {}", id.0), desc);
        self.textures.insert(id, texture);
        Ok(id)
    }

    fn destroy_texture(&mut self, id: TextureId) {
        if let Some(texture) = self.textures.remove(&id) {
            texture.texture.destroy();
        }
    }

    fn compile_shader(&mut self, module: &ShaderModule<'_>) -> Result<ShaderId, String> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let shader = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(module.label),
            source: wgpu::ShaderSource::Wgsl(module.source.into()),
        });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(err.to_string());
        }

        let id = ShaderId(self.allocate_id());
        self.shaders.insert(
            id,
            GpuShader {
                stage: module.stage,
                entry_point: module.entry_point.to_string(),
                source: module.source.to_string(),
                module: shader,
            },
        );
        Ok(id)
    }

    fn link_program(&mut self, vertex: ShaderId, fragment: ShaderId) -> Result<(ProgramId, ProgramLayout), String> {
        let vs = self.shaders.get(&vertex).ok_or("unknown vertex shader")?;
        let fs = self.shaders.get(&fragment).ok_or("unknown fragment shader")?;
        if vs.stage != ShaderStage::Vertex || fs.stage != ShaderStage::Fragment {
            return Err("stage mismatch".to_string());
        }
        let layout = reflect_program(&vs.source, &fs.source)?;

        let mut entries = vec![wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }];
        for (_, binding) in layout.texture_bindings() {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: binding + 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            });
        }

        let label = format!("{} Bind Group Layout", fs.entry_point);
        let bind_group_layout = self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&label),
            entries: &entries,
        });
        let pipeline_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("{} Pipeline Layout", fs.entry_point)),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let uniform_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{} Uniforms", fs.entry_point)),
            size: layout.block_size.max(16) as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let id = ProgramId(self.allocate_id());
        self.programs.insert(
            id,
            GpuProgram {
                vertex,
                fragment,
                layout: layout.clone(),
                bind_group_layout,
                pipeline_layout,
                uniform_buffer,
            },
        );

        // Building the common offscreen variant surfaces interface mismatches now.
        let key = PipelineKey {
            program: id,
            format: wgpu::TextureFormat::Rgba16Float,
            blend: None,
            offscreen: true,
        };
        match self.create_pipeline(key) {
            Ok(pipeline) => {
                self.pipelines.insert(key, pipeline);
            }
            Err(err) => {
                self.programs.remove(&id);
                return Err(err);
            }
        }

        Ok((id, layout))
    }

    fn draw(&mut self, call: &DrawCall<'_>) {
        let (format, offscreen) = match call.target {
            Some(id) => match self.textures.get(&id) {
                Some(texture) => (texture.format, true),
                None => {
                    log::trace!("draw into unknown texture {:?}", id);
                    return;
                }
            },
            None => {
                if self.frame.is_none() {
                    log::trace!("draw to surface outside of a frame");
                    return;
                }
                (self.surface_config.format, false)
            }
        };
        if !self.programs.contains_key(&call.program) {
            log::trace!("draw with unknown program {:?}", call.program);
            return;
        }

        let key = PipelineKey {
            program: call.program,
            format,
            blend: call.blend,
            offscreen,
        };
        if !self.ensure_pipeline(key) {
            return;
        }

        // The surface starts each frame transparent.
        let load = match (call.target, self.frame.as_mut()) {
            (None, Some(frame)) if !frame.cleared => {
                frame.cleared = true;
                wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT)
            }
            _ => wgpu::LoadOp::Load,
        };

        let (Some(program), Some(pipeline)) = (self.programs.get(&call.program), self.pipelines.get(&key)) else {
            return;
        };

        if !call.uniforms.is_empty() {
            self.queue.write_buffer(&program.uniform_buffer, 0, call.uniforms);
        }

        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: program.uniform_buffer.as_entire_binding(),
        }];
        for (name, binding) in program.layout.texture_bindings() {
            let texture = call
                .textures
                .iter()
                .find(|t| t.binding == binding)
                .and_then(|t| self.textures.get(&t.texture))
                .unwrap_or_else(|| {
                    log::trace!("'{}' unbound, sampling placeholder", name);
                    &self.placeholder
                });
            let sampler = match texture.desc.filter {
                Filter::Linear => &self.linear_sampler,
                Filter::Nearest => &self.nearest_sampler,
            };
            entries.push(wgpu::BindGroupEntry {
                binding,
                resource: wgpu::BindingResource::TextureView(&texture.view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: binding + 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            });
        }
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: None,
            layout: &program.bind_group_layout,
            entries: &entries,
        });

        let view = match call.target {
            Some(id) => match self.textures.get(&id) {
                Some(texture) => &texture.view,
                None => return,
            },
            None => match &self.frame {
                Some(frame) => &frame.view,
                None => return,
            },
        };

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Fluid Pass Encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Fluid Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.set_vertex_buffer(0, self.quad_vertices.slice(..));
            pass.set_index_buffer(self.quad_indices.slice(..), wgpu::IndexFormat::Uint16);
            pass.draw_indexed(0..QUAD_INDICES.len() as u32, 0, 0..1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.surface_config.width, self.surface_config.height)
    }

    fn resize_surface(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        if width == self.surface_config.width && height == self.surface_config.height {
            return;
        }
        self.surface_config.width = width;
        self.surface_config.height = height;
        self.reconfigure_surface();
    }

    fn begin_frame(&mut self) -> bool {
        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.reconfigure_surface();
                return false;
            }
            Err(wgpu::SurfaceError::Timeout) => return false,
            Err(err) => {
                log::error!("Failed to acquire surface texture: {:?}", err);
                return false;
            }
        };
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.frame = Some(SurfaceFrame {
            output,
            view,
            cleared: false,
        });
        true
    }

    fn end_frame(&mut self) {
        if let Some(frame) = self.frame.take() {
            drop(frame.view);
            frame.output.present();
        }
    }

    fn read_pixels(&mut self, id: TextureId) -> Result<Vec<[f32; 4]>, BackendError> {
        let texture = self.textures.get(&id).ok_or(BackendError::UnknownTexture(id))?;
        let width = texture.desc.width;
        let height = texture.desc.height;
        let bytes_per_texel = texture
            .format
            .block_copy_size(None)
            .ok_or_else(|| BackendError::Readback(format!("{:?} cannot be copied", texture.format)))?;
        let channels = texture.format.components() as usize;

        let unpadded_row = width * bytes_per_texel;
        let padded_row = unpadded_row.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT) * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

        let staging_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Staging"),
            size: (padded_row * height) as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &texture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &staging_buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = staging_buffer.slice(..);
        let (sender, receiver) = futures_intrusive::channel::shared::oneshot_channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        match pollster::block_on(receiver.receive()) {
            Some(Ok(())) => {}
            Some(Err(err)) => return Err(BackendError::Readback(err.to_string())),
            None => return Err(BackendError::Readback("map callback dropped".to_string())),
        }

        let data = buffer_slice.get_mapped_range();
        let mut texels = Vec::with_capacity((width * height) as usize);
        for row in data.chunks(padded_row as usize).take(height as usize) {
            for texel in row[..unpadded_row as usize].chunks_exact(bytes_per_texel as usize) {
                let mut out = [0.0, 0.0, 0.0, 1.0];
                for (channel, bytes) in texel.chunks_exact(2).take(channels).enumerate() {
                    out[channel] = half::f16::from_bits(u16::from_le_bytes([bytes[0], bytes[1]])).to_f32();
                }
                texels.push(out);
            }
        }
        drop(data);
        staging_buffer.unmap();

        Ok(texels)
    }
}
