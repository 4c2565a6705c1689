// fluid-cursor - GPU fluid simulation cursor effect
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

//! Off-screen render targets: single fields and read/write ping-pong pairs.

use crate::gpu::{Backend, BackendError, DataType, Filter, InternalFormat, PixelFormat, TextureDesc, TextureId};
use crate::shaders::Program;

/// A texture the passes render into. Owns its texture handle; call
/// [`RenderTarget::release`] when it is superseded.
#[derive(Debug)]
pub struct RenderTarget {
    texture: TextureId,
    pub width: u32,
    pub height: u32,
    pub texel_size_x: f32,
    pub texel_size_y: f32,
    pub internal_format: InternalFormat,
    pub format: PixelFormat,
    pub data_type: DataType,
    pub filter: Filter,
}

impl RenderTarget {
    pub fn texture(&self) -> TextureId {
        self.texture
    }

    pub fn texel_size(&self) -> [f32; 2] {
        [self.texel_size_x, self.texel_size_y]
    }

    pub fn release<B: Backend + ?Sized>(self, backend: &mut B) {
        backend.destroy_texture(self.texture);
    }
}

/// Two same-sized targets; passes read from `read` and render into `write`.
#[derive(Debug)]
pub struct DoubleRenderTarget {
    read: RenderTarget,
    write: RenderTarget,
}

impl DoubleRenderTarget {
    pub fn read(&self) -> &RenderTarget {
        &self.read
    }

    pub fn write(&self) -> &RenderTarget {
        &self.write
    }

    pub fn width(&self) -> u32 {
        self.read.width
    }

    pub fn height(&self) -> u32 {
        self.read.height
    }

    pub fn texel_size(&self) -> [f32; 2] {
        self.read.texel_size()
    }

    pub fn swap(&mut self) {
        std::mem::swap(&mut self.read, &mut self.write);
    }

    pub fn release<B: Backend + ?Sized>(self, backend: &mut B) {
        self.read.release(backend);
        self.write.release(backend);
    }
}

pub fn create_target<B: Backend + ?Sized>(
    backend: &mut B,
    width: u32,
    height: u32,
    internal_format: InternalFormat,
    format: PixelFormat,
    data_type: DataType,
    filter: Filter,
) -> Result<RenderTarget, BackendError> {
    let texture = backend.create_texture(&TextureDesc {
        width,
        height,
        internal_format,
        format,
        data_type,
        filter,
    })?;

    Ok(RenderTarget {
        texture,
        width,
        height,
        texel_size_x: 1.0 / width as f32,
        texel_size_y: 1.0 / height as f32,
        internal_format,
        format,
        data_type,
        filter,
    })
}

pub fn create_double_target<B: Backend + ?Sized>(
    backend: &mut B,
    width: u32,
    height: u32,
    internal_format: InternalFormat,
    format: PixelFormat,
    data_type: DataType,
    filter: Filter,
) -> Result<DoubleRenderTarget, BackendError> {
    let read = create_target(backend, width, height, internal_format, format, data_type, filter)?;
    let write = match create_target(backend, width, height, internal_format, format, data_type, filter) {
        Ok(write) => write,
        Err(err) => {
            read.release(backend);
            return Err(err);
        }
    };
    Ok(DoubleRenderTarget { read, write })
}

/// Reallocates `target` at the new size and blits the old contents into it
/// through `copy`.
pub fn resize_target<B: Backend + ?Sized>(
    backend: &mut B,
    copy: &mut Program,
    target: &mut RenderTarget,
    width: u32,
    height: u32,
) -> Result<(), BackendError> {
    let resized = create_target(
        backend,
        width,
        height,
        target.internal_format,
        target.format,
        target.data_type,
        target.filter,
    )?;

    copy.set_vec2("texelSize", resized.texel_size());
    copy.set_texture("uTexture", target.texture());
    copy.draw(backend, Some(resized.texture()), None);

    std::mem::replace(target, resized).release(backend);
    Ok(())
}

/// The read side keeps its contents; the write side comes back empty.
pub fn resize_double_target<B: Backend + ?Sized>(
    backend: &mut B,
    copy: &mut Program,
    target: &mut DoubleRenderTarget,
    width: u32,
    height: u32,
) -> Result<(), BackendError> {
    if target.width() == width && target.height() == height {
        return Ok(());
    }

    resize_target(backend, copy, &mut target.read, width, height)?;
    let write = create_target(
        backend,
        width,
        height,
        target.write.internal_format,
        target.write.format,
        target.write.data_type,
        target.write.filter,
    )?;
    std::mem::replace(&mut target.write, write).release(backend);
    Ok(())
}

/// Grid size for a field of `base` resolution on a surface of the given size:
/// the short side gets `base` cells and the long side keeps the aspect ratio.
pub fn resolution(base: u32, surface_width: u32, surface_height: u32) -> (u32, u32) {
    let width = surface_width.max(1) as f32;
    let height = surface_height.max(1) as f32;
    let mut aspect_ratio = width / height;
    if aspect_ratio < 1.0 {
        aspect_ratio = 1.0 / aspect_ratio;
    }

    let min = base.max(1);
    let max = ((base as f32 * aspect_ratio).round() as u32).max(1);

    if width > height {
        (max, min)
    } else {
        (min, max)
    }
}
