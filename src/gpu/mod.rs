// fluid-cursor - GPU fluid simulation cursor effect
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

//! The command surface the simulation core issues GPU work to.
//!
//! Everything above this module talks in terms of textures, compiled
//! shader stages, linked programs and full-screen draws. `WgpuBackend`
//! drives real hardware; `SoftwareBackend` evaluates the same kernels on
//! the CPU and doubles as the stub platform for tests.

pub mod format;
pub mod software;
pub mod wgpu_backend;

pub use format::{probe_capabilities, supported_format, Capabilities, FormatSpec};
pub use software::SoftwareBackend;
pub use wgpu_backend::WgpuBackend;

use crate::shaders::{reflect::ProgramLayout, KeywordSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(pub u32);

/// Class of rendering context the platform handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    /// Sized half-float formats with one, two and four channels.
    Es3,
    /// Only unsized four-channel half-float textures; narrower fields are
    /// promoted to RGBA.
    Legacy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InternalFormat {
    R16F,
    Rg16F,
    Rgba16F,
    /// Unsized RGBA, the only renderable format of a legacy context.
    Rgba,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Red,
    Rg,
    Rgba,
}

impl PixelFormat {
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Red => 1,
            PixelFormat::Rg => 2,
            PixelFormat::Rgba => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    HalfFloat,
    UnsignedByte,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Filter {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub internal_format: InternalFormat,
    pub format: PixelFormat,
    pub data_type: DataType,
    pub filter: Filter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

/// A preprocessed shader stage ready for the backend compiler.
#[derive(Debug, Clone, Copy)]
pub struct ShaderModule<'a> {
    pub label: &'a str,
    pub stage: ShaderStage,
    pub entry_point: &'a str,
    pub source: &'a str,
    pub keywords: &'a KeywordSet,
}

/// `src * 1 + dst * (1 - src.a)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendMode {
    PremultipliedOver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureBinding {
    pub binding: u32,
    pub texture: TextureId,
}

/// One full-screen quad. `target == None` draws to the visible surface.
#[derive(Debug, Clone, Copy)]
pub struct DrawCall<'a> {
    pub program: ProgramId,
    pub uniforms: &'a [u8],
    pub textures: &'a [TextureBinding],
    pub target: Option<TextureId>,
    pub blend: Option<BlendMode>,
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("texture {0:?} does not exist")]
    UnknownTexture(TextureId),
    #[error("format {0:?}/{1:?} is not renderable on this platform")]
    UnsupportedFormat(InternalFormat, DataType),
    #[error("cannot allocate a {0}x{1} texture")]
    InvalidSize(u32, u32),
    #[error("readback failed: {0}")]
    Readback(String),
}

pub trait Backend {
    fn context_kind(&self) -> ContextKind;

    fn supports_linear_filtering(&self) -> bool;

    /// Attempts to render into a 4x4 texture of the given format.
    fn supports_render_format(
        &mut self,
        internal_format: InternalFormat,
        format: PixelFormat,
        data_type: DataType,
    ) -> bool;

    /// Allocates a zero-cleared, clamp-to-edge texture usable as a render target.
    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId, BackendError>;

    fn destroy_texture(&mut self, id: TextureId);

    fn compile_shader(&mut self, module: &ShaderModule<'_>) -> Result<ShaderId, String>;

    fn link_program(
        &mut self,
        vertex: ShaderId,
        fragment: ShaderId,
    ) -> Result<(ProgramId, ProgramLayout), String>;

    fn draw(&mut self, call: &DrawCall<'_>);

    /// Backing-store size of the visible surface in device pixels.
    fn surface_size(&self) -> (u32, u32);

    fn resize_surface(&mut self, width: u32, height: u32);

    /// Acquires the visible surface for this frame. `false` skips drawing to it.
    fn begin_frame(&mut self) -> bool;

    fn end_frame(&mut self);

    /// Texels in rows of increasing `v`. Channels the format lacks read as 0,
    /// a missing alpha as 1.
    fn read_pixels(&mut self, id: TextureId) -> Result<Vec<[f32; 4]>, BackendError>;
}
