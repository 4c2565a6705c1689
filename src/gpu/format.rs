// fluid-cursor - GPU fluid simulation cursor effect
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

use super::{Backend, ContextKind, DataType, Filter, InternalFormat, PixelFormat};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatSpec {
    pub internal_format: InternalFormat,
    pub format: PixelFormat,
}

/// Renderable formats chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub context: ContextKind,
    pub data_type: DataType,
    pub linear_filtering: bool,
    pub rgba: FormatSpec,
    pub rg: FormatSpec,
    pub r: FormatSpec,
}

impl Capabilities {
    /// The legacy path or missing linear filtering; shading and large dye
    /// fields are turned off.
    pub fn degraded(&self) -> bool {
        self.context == ContextKind::Legacy || !self.linear_filtering
    }

    pub fn filtering(&self) -> Filter {
        if self.linear_filtering {
            Filter::Linear
        } else {
            Filter::Nearest
        }
    }
}

/// Walks R -> RG -> RGBA until the platform can render to the format.
pub fn supported_format<B: Backend + ?Sized>(
    backend: &mut B,
    internal_format: InternalFormat,
    format: PixelFormat,
    data_type: DataType,
) -> Option<FormatSpec> {
    if backend.supports_render_format(internal_format, format, data_type) {
        return Some(FormatSpec {
            internal_format,
            format,
        });
    }

    match internal_format {
        InternalFormat::R16F => supported_format(backend, InternalFormat::Rg16F, PixelFormat::Rg, data_type),
        InternalFormat::Rg16F => {
            supported_format(backend, InternalFormat::Rgba16F, PixelFormat::Rgba, data_type)
        }
        _ => None,
    }
}

/// `None` means no usable render format exists at all.
pub fn probe_capabilities<B: Backend + ?Sized>(backend: &mut B) -> Option<Capabilities> {
    let linear_filtering = backend.supports_linear_filtering();
    let data_type = DataType::HalfFloat;

    if backend.context_kind() == ContextKind::Es3 {
        let rgba = supported_format(backend, InternalFormat::Rgba16F, PixelFormat::Rgba, data_type);
        let rg = supported_format(backend, InternalFormat::Rg16F, PixelFormat::Rg, data_type);
        let r = supported_format(backend, InternalFormat::R16F, PixelFormat::Red, data_type);

        if let (Some(rgba), Some(rg), Some(r)) = (rgba, rg, r) {
            return Some(Capabilities {
                context: ContextKind::Es3,
                data_type,
                linear_filtering,
                rgba,
                rg,
                r,
            });
        }
        log::info!("Sized half-float formats unavailable, falling back to RGBA half-float");
    }

    let rgba = supported_format(backend, InternalFormat::Rgba, PixelFormat::Rgba, data_type)?;
    Some(Capabilities {
        context: ContextKind::Legacy,
        data_type,
        linear_filtering,
        rgba,
        rg: rgba,
        r: rgba,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::SoftwareBackend;

    #[test]
    fn full_support_keeps_narrow_formats() {
        let mut backend = SoftwareBackend::new(16, 16);
        let caps = probe_capabilities(&mut backend).unwrap();
        assert_eq!(caps.context, ContextKind::Es3);
        assert_eq!(caps.r.internal_format, InternalFormat::R16F);
        assert_eq!(caps.rg.internal_format, InternalFormat::Rg16F);
        assert_eq!(caps.rgba.internal_format, InternalFormat::Rgba16F);
        assert!(!caps.degraded());
    }

    #[test]
    fn missing_red_cascades_to_rg() {
        let mut backend = SoftwareBackend::new(16, 16).without_format(InternalFormat::R16F);
        let spec = supported_format(&mut backend, InternalFormat::R16F, PixelFormat::Red, DataType::HalfFloat).unwrap();
        assert_eq!(spec.internal_format, InternalFormat::Rg16F);
        assert_eq!(spec.format, PixelFormat::Rg);
    }

    #[test]
    fn cascade_ends_after_rgba() {
        let mut backend = SoftwareBackend::new(16, 16)
            .without_format(InternalFormat::R16F)
            .without_format(InternalFormat::Rg16F)
            .without_format(InternalFormat::Rgba16F);
        assert!(supported_format(&mut backend, InternalFormat::R16F, PixelFormat::Red, DataType::HalfFloat).is_none());
    }

    #[test]
    fn legacy_context_promotes_everything_to_rgba() {
        let mut backend = SoftwareBackend::new(16, 16).with_context(ContextKind::Legacy);
        let caps = probe_capabilities(&mut backend).unwrap();
        assert_eq!(caps.context, ContextKind::Legacy);
        assert_eq!(caps.r, caps.rgba);
        assert_eq!(caps.rg.format, PixelFormat::Rgba);
        assert!(caps.degraded());
    }

    #[test]
    fn nothing_renderable_is_unsupported() {
        let mut backend = SoftwareBackend::new(16, 16)
            .without_format(InternalFormat::Rgba16F)
            .without_format(InternalFormat::Rgba);
        assert!(probe_capabilities(&mut backend).is_none());
    }
}
