// fluid-cursor - GPU fluid simulation cursor effect
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

//! CPU reference rasteriser.
//!
//! Evaluates the fragment kernels of `src/shaders` texel by texel on `f32`
//! grids with GL conventions: row 0 is `v` near 0, samples are taken at
//! texel centres, wrapping is clamp-to-edge. Used headless and as the stub
//! platform in tests, where formats and filtering can be switched off to
//! exercise the fallback paths.

use std::collections::{HashMap, HashSet};

use super::{
    Backend, BackendError, BlendMode, ContextKind, DataType, DrawCall, Filter, InternalFormat, PixelFormat, ProgramId,
    ShaderId, ShaderModule, ShaderStage, TextureDesc, TextureId,
};
use crate::shaders::{
    reflect::{reflect_program, ProgramLayout},
    MANUAL_FILTERING, SHADING,
};

type Vec4 = [f32; 4];

#[derive(Debug, Clone)]
struct SoftTexture {
    width: u32,
    height: u32,
    format: PixelFormat,
    filter: Filter,
    texels: Vec<Vec4>,
}

impl SoftTexture {
    fn new(width: u32, height: u32, format: PixelFormat, filter: Filter) -> Self {
        let mut texture = Self {
            width,
            height,
            format,
            filter,
            texels: Vec::new(),
        };
        texture.texels = vec![texture.mask([0.0; 4]); (width * height) as usize];
        texture
    }

    /// Drops channels the format cannot store.
    fn mask(&self, v: Vec4) -> Vec4 {
        match self.format {
            PixelFormat::Red => [v[0], 0.0, 0.0, 1.0],
            PixelFormat::Rg => [v[0], v[1], 0.0, 1.0],
            PixelFormat::Rgba => v,
        }
    }

    fn texel(&self, x: i64, y: i64) -> Vec4 {
        let x = x.clamp(0, self.width as i64 - 1) as usize;
        let y = y.clamp(0, self.height as i64 - 1) as usize;
        self.texels[y * self.width as usize + x]
    }

    fn sample(&self, uv: [f32; 2]) -> Vec4 {
        let w = self.width as f32;
        let h = self.height as f32;
        match self.filter {
            Filter::Nearest => self.texel((uv[0] * w).floor() as i64, (uv[1] * h).floor() as i64),
            Filter::Linear => {
                let fx = uv[0] * w - 0.5;
                let fy = uv[1] * h - 0.5;
                let x0 = fx.floor();
                let y0 = fy.floor();
                let tx = fx - x0;
                let ty = fy - y0;
                let (x0, y0) = (x0 as i64, y0 as i64);
                let a = self.texel(x0, y0);
                let b = self.texel(x0 + 1, y0);
                let c = self.texel(x0, y0 + 1);
                let d = self.texel(x0 + 1, y0 + 1);
                mix(mix(a, b, tx), mix(c, d, tx), ty)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kernel {
    Copy,
    Clear,
    Color,
    Splat,
    Advection { manual_filtering: bool },
    Divergence,
    Curl,
    Vorticity,
    Pressure,
    GradientSubtract,
    Display { shading: bool },
}

impl Kernel {
    fn for_entry_point(entry_point: &str, manual_filtering: bool, shading: bool) -> Option<Self> {
        Some(match entry_point {
            "copy_fs" => Kernel::Copy,
            "clear_fs" => Kernel::Clear,
            "color_fs" => Kernel::Color,
            "splat_fs" => Kernel::Splat,
            "advection_fs" => Kernel::Advection { manual_filtering },
            "divergence_fs" => Kernel::Divergence,
            "curl_fs" => Kernel::Curl,
            "vorticity_fs" => Kernel::Vorticity,
            "pressure_fs" => Kernel::Pressure,
            "gradient_subtract_fs" => Kernel::GradientSubtract,
            "display_fs" => Kernel::Display { shading },
            _ => return None,
        })
    }
}

#[derive(Debug, Clone)]
struct SoftShader {
    stage: ShaderStage,
    source: String,
    kernel: Option<Kernel>,
}

#[derive(Debug, Clone)]
struct SoftProgram {
    kernel: Kernel,
    layout: ProgramLayout,
}

pub struct SoftwareBackend {
    context: ContextKind,
    linear_filtering: bool,
    unsupported: HashSet<InternalFormat>,
    textures: HashMap<TextureId, SoftTexture>,
    shaders: HashMap<ShaderId, SoftShader>,
    programs: HashMap<ProgramId, SoftProgram>,
    surface: SoftTexture,
    next_id: u32,
    draws: usize,
    compiles: usize,
}

impl SoftwareBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            context: ContextKind::Es3,
            linear_filtering: true,
            unsupported: HashSet::new(),
            textures: HashMap::new(),
            shaders: HashMap::new(),
            programs: HashMap::new(),
            surface: SoftTexture::new(width.max(1), height.max(1), PixelFormat::Rgba, Filter::Nearest),
            next_id: 1,
            draws: 0,
            compiles: 0,
        }
    }

    pub fn with_context(mut self, context: ContextKind) -> Self {
        self.context = context;
        self
    }

    /// Makes rendering into `format` fail, as a platform lacking it would.
    pub fn without_format(mut self, format: InternalFormat) -> Self {
        self.unsupported.insert(format);
        self
    }

    pub fn without_linear_filtering(mut self) -> Self {
        self.linear_filtering = false;
        self
    }

    pub fn draw_count(&self) -> usize {
        self.draws
    }

    pub fn compile_count(&self) -> usize {
        self.compiles
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn texture_filter(&self, id: TextureId) -> Option<Filter> {
        self.textures.get(&id).map(|t| t.filter)
    }

    pub fn texture_format(&self, id: TextureId) -> Option<PixelFormat> {
        self.textures.get(&id).map(|t| t.format)
    }

    pub fn read_surface(&self) -> Vec<Vec4> {
        self.surface.texels.clone()
    }

    /// Overwrites the texels of `id`, rows of increasing `v`.
    pub fn write_pixels(&mut self, id: TextureId, texels: &[Vec4]) -> Result<(), BackendError> {
        let texture = self.textures.get_mut(&id).ok_or(BackendError::UnknownTexture(id))?;
        if texels.len() != texture.texels.len() {
            return Err(BackendError::InvalidSize(texture.width, texture.height));
        }
        for (dst, src) in texture.texels.iter_mut().zip(texels) {
            *dst = match texture.format {
                PixelFormat::Red => [src[0], 0.0, 0.0, 1.0],
                PixelFormat::Rg => [src[0], src[1], 0.0, 1.0],
                PixelFormat::Rgba => *src,
            };
        }
        Ok(())
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn format_supported(&self, internal_format: InternalFormat, format: PixelFormat) -> bool {
        let matches_format = matches!(
            (internal_format, format),
            (InternalFormat::R16F, PixelFormat::Red)
                | (InternalFormat::Rg16F, PixelFormat::Rg)
                | (InternalFormat::Rgba16F, PixelFormat::Rgba)
                | (InternalFormat::Rgba, PixelFormat::Rgba)
        );
        let available = self.context == ContextKind::Es3 || internal_format == InternalFormat::Rgba;
        matches_format && available && !self.unsupported.contains(&internal_format)
    }
}

struct Inputs<'a> {
    layout: &'a ProgramLayout,
    block: &'a [u8],
    textures: HashMap<&'a str, &'a SoftTexture>,
}

impl Inputs<'_> {
    fn value(&self, name: &str) -> Vec4 {
        self.layout.read(self.block, name).unwrap_or([0.0; 4])
    }

    fn f32(&self, name: &str) -> f32 {
        self.value(name)[0]
    }

    fn vec2(&self, name: &str) -> [f32; 2] {
        let v = self.value(name);
        [v[0], v[1]]
    }

    fn sample(&self, name: &str, uv: [f32; 2]) -> Vec4 {
        match self.textures.get(name) {
            Some(texture) => texture.sample(uv),
            None => [0.0, 0.0, 0.0, 1.0],
        }
    }

    fn bilerp(&self, name: &str, uv: [f32; 2], tsize: [f32; 2]) -> Vec4 {
        let st = [uv[0] / tsize[0] - 0.5, uv[1] / tsize[1] - 0.5];
        let iuv = [st[0].floor(), st[1].floor()];
        let fuv = [st[0] - iuv[0], st[1] - iuv[1]];
        let at = |ox: f32, oy: f32| self.sample(name, [(iuv[0] + ox) * tsize[0], (iuv[1] + oy) * tsize[1]]);
        let a = at(0.5, 0.5);
        let b = at(1.5, 0.5);
        let c = at(0.5, 1.5);
        let d = at(1.5, 1.5);
        mix(mix(a, b, fuv[0]), mix(c, d, fuv[0]), fuv[1])
    }
}

fn mix(a: Vec4, b: Vec4, t: f32) -> Vec4 {
    [
        a[0] + (b[0] - a[0]) * t,
        a[1] + (b[1] - a[1]) * t,
        a[2] + (b[2] - a[2]) * t,
        a[3] + (b[3] - a[3]) * t,
    ]
}

fn length3(v: Vec4) -> f32 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

struct Varyings {
    uv: [f32; 2],
    l: [f32; 2],
    r: [f32; 2],
    t: [f32; 2],
    b: [f32; 2],
}

fn shade(kernel: Kernel, inputs: &Inputs<'_>, v: &Varyings) -> Vec4 {
    match kernel {
        Kernel::Copy => inputs.sample("uTexture", v.uv),
        Kernel::Clear => {
            let value = inputs.f32("value");
            let c = inputs.sample("uTexture", v.uv);
            [c[0] * value, c[1] * value, c[2] * value, c[3] * value]
        }
        Kernel::Color => inputs.value("color"),
        Kernel::Splat => {
            let point = inputs.vec2("point");
            let color = inputs.value("color");
            let mut p = [v.uv[0] - point[0], v.uv[1] - point[1]];
            p[0] *= inputs.f32("aspectRatio");
            let falloff = (-(p[0] * p[0] + p[1] * p[1]) / inputs.f32("radius")).exp();
            let base = inputs.sample("uTarget", v.uv);
            [
                base[0] + falloff * color[0],
                base[1] + falloff * color[1],
                base[2] + falloff * color[2],
                1.0,
            ]
        }
        Kernel::Advection { manual_filtering } => {
            let texel_size = inputs.vec2("texelSize");
            let dt = inputs.f32("dt");
            let result = if manual_filtering {
                let vel = inputs.bilerp("uVelocity", v.uv, texel_size);
                let coord = [v.uv[0] - dt * vel[0] * texel_size[0], v.uv[1] - dt * vel[1] * texel_size[1]];
                inputs.bilerp("uSource", coord, inputs.vec2("dyeTexelSize"))
            } else {
                let vel = inputs.sample("uVelocity", v.uv);
                let coord = [v.uv[0] - dt * vel[0] * texel_size[0], v.uv[1] - dt * vel[1] * texel_size[1]];
                inputs.sample("uSource", coord)
            };
            let decay = 1.0 + inputs.f32("dissipation") * dt;
            [result[0] / decay, result[1] / decay, result[2] / decay, result[3] / decay]
        }
        Kernel::Divergence => {
            let mut l = inputs.sample("uVelocity", v.l)[0];
            let mut r = inputs.sample("uVelocity", v.r)[0];
            let mut t = inputs.sample("uVelocity", v.t)[1];
            let mut b = inputs.sample("uVelocity", v.b)[1];
            let c = inputs.sample("uVelocity", v.uv);
            if v.l[0] < 0.0 {
                l = -c[0];
            }
            if v.r[0] > 1.0 {
                r = -c[0];
            }
            if v.t[1] > 1.0 {
                t = -c[1];
            }
            if v.b[1] < 0.0 {
                b = -c[1];
            }
            [0.5 * (r - l + t - b), 0.0, 0.0, 1.0]
        }
        Kernel::Curl => {
            let l = inputs.sample("uVelocity", v.l)[1];
            let r = inputs.sample("uVelocity", v.r)[1];
            let t = inputs.sample("uVelocity", v.t)[0];
            let b = inputs.sample("uVelocity", v.b)[0];
            [0.5 * (r - l - t + b), 0.0, 0.0, 1.0]
        }
        Kernel::Vorticity => {
            let l = inputs.sample("uCurl", v.l)[0];
            let r = inputs.sample("uCurl", v.r)[0];
            let t = inputs.sample("uCurl", v.t)[0];
            let b = inputs.sample("uCurl", v.b)[0];
            let c = inputs.sample("uCurl", v.uv)[0];

            let mut force = [0.5 * (t.abs() - b.abs()), 0.5 * (r.abs() - l.abs())];
            let len = (force[0] * force[0] + force[1] * force[1]).sqrt() + 0.0001;
            let scale = inputs.f32("curl") * c / len;
            force = [force[0] * scale, -force[1] * scale];

            let dt = inputs.f32("dt");
            let vel = inputs.sample("uVelocity", v.uv);
            [
                (vel[0] + force[0] * dt).clamp(-1000.0, 1000.0),
                (vel[1] + force[1] * dt).clamp(-1000.0, 1000.0),
                0.0,
                1.0,
            ]
        }
        Kernel::Pressure => {
            let l = inputs.sample("uPressure", v.l)[0];
            let r = inputs.sample("uPressure", v.r)[0];
            let t = inputs.sample("uPressure", v.t)[0];
            let b = inputs.sample("uPressure", v.b)[0];
            let divergence = inputs.sample("uDivergence", v.uv)[0];
            [(l + r + b + t - divergence) * 0.25, 0.0, 0.0, 1.0]
        }
        Kernel::GradientSubtract => {
            let l = inputs.sample("uPressure", v.l)[0];
            let r = inputs.sample("uPressure", v.r)[0];
            let t = inputs.sample("uPressure", v.t)[0];
            let b = inputs.sample("uPressure", v.b)[0];
            let vel = inputs.sample("uVelocity", v.uv);
            [vel[0] - (r - l), vel[1] - (t - b), 0.0, 1.0]
        }
        Kernel::Display { shading } => {
            let mut c = inputs.sample("uTexture", v.uv);
            if shading {
                let lc = inputs.sample("uTexture", v.l);
                let rc = inputs.sample("uTexture", v.r);
                let tc = inputs.sample("uTexture", v.t);
                let bc = inputs.sample("uTexture", v.b);
                let dx = length3(rc) - length3(lc);
                let dy = length3(tc) - length3(bc);
                let texel_size = inputs.vec2("texelSize");
                let nz = (texel_size[0] * texel_size[0] + texel_size[1] * texel_size[1]).sqrt();
                let n_len = (dx * dx + dy * dy + nz * nz).sqrt();
                let diffuse = if n_len > 0.0 { (nz / n_len + 0.7).clamp(0.7, 1.0) } else { 1.0 };
                c = [c[0] * diffuse, c[1] * diffuse, c[2] * diffuse, c[3]];
            }
            let a = c[0].max(c[1]).max(c[2]);
            [c[0], c[1], c[2], a]
        }
    }
}

impl Backend for SoftwareBackend {
    fn context_kind(&self) -> ContextKind {
        self.context
    }

    fn supports_linear_filtering(&self) -> bool {
        self.linear_filtering
    }

    fn supports_render_format(
        &mut self,
        internal_format: InternalFormat,
        format: PixelFormat,
        _data_type: DataType,
    ) -> bool {
        self.format_supported(internal_format, format)
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId, BackendError> {
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::InvalidSize(desc.width, desc.height));
        }
        if !self.format_supported(desc.internal_format, desc.format) {
            return Err(BackendError::UnsupportedFormat(desc.internal_format, desc.data_type));
        }
        let filter = if self.linear_filtering { desc.filter } else { Filter::Nearest };
        let id = TextureId(self.allocate_id());
        self.textures
            .insert(id, SoftTexture::new(desc.width, desc.height, desc.format, filter));
        Ok(id)
    }

    fn destroy_texture(&mut self, id: TextureId) {
        self.textures.remove(&id);
    }

    fn compile_shader(&mut self, module: &ShaderModule<'_>) -> Result<ShaderId, String> {
        self.compiles += 1;
        if !module.source.contains(&format!("fn {}(", module.entry_point)) {
            return Err(format!("entry point '{}' not found", module.entry_point));
        }
        let kernel = match module.stage {
            ShaderStage::Vertex => None,
            ShaderStage::Fragment => Some(
                Kernel::for_entry_point(
                    module.entry_point,
                    module.keywords.contains(MANUAL_FILTERING),
                    module.keywords.contains(SHADING),
                )
                .ok_or_else(|| format!("no reference kernel for '{}'", module.entry_point))?,
            ),
        };
        let id = ShaderId(self.allocate_id());
        self.shaders.insert(
            id,
            SoftShader {
                stage: module.stage,
                source: module.source.to_string(),
                kernel,
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
        let kernel = fs.kernel.ok_or("fragment shader has no kernel")?;
        let layout = reflect_program(&vs.source, &fs.source)?;
        let id = ProgramId(self.allocate_id());
        self.programs.insert(
            id,
            SoftProgram {
                kernel,
                layout: layout.clone(),
            },
        );
        Ok((id, layout))
    }

    fn draw(&mut self, call: &DrawCall<'_>) {
        let Some(program) = self.programs.get(&call.program) else {
            log::trace!("draw with unknown program {:?}", call.program);
            return;
        };

        let mut textures = HashMap::new();
        for (name, binding) in program.layout.texture_bindings() {
            let bound = call
                .textures
                .iter()
                .find(|t| t.binding == binding)
                .and_then(|t| self.textures.get(&t.texture));
            if let Some(texture) = bound {
                textures.insert(name, texture);
            }
        }
        let inputs = Inputs {
            layout: &program.layout,
            block: call.uniforms,
            textures,
        };

        let (width, height) = match call.target {
            Some(id) => match self.textures.get(&id) {
                Some(t) => (t.width, t.height),
                None => {
                    log::trace!("draw into unknown texture {:?}", id);
                    return;
                }
            },
            None => (self.surface.width, self.surface.height),
        };

        let texel_size = inputs.vec2("texelSize");
        let mut output = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                let uv = [(x as f32 + 0.5) / width as f32, (y as f32 + 0.5) / height as f32];
                let varyings = Varyings {
                    uv,
                    l: [uv[0] - texel_size[0], uv[1]],
                    r: [uv[0] + texel_size[0], uv[1]],
                    t: [uv[0], uv[1] + texel_size[1]],
                    b: [uv[0], uv[1] - texel_size[1]],
                };
                output.push(shade(program.kernel, &inputs, &varyings));
            }
        }

        let target = match call.target {
            Some(id) => match self.textures.get_mut(&id) {
                Some(t) => t,
                None => return,
            },
            None => &mut self.surface,
        };
        for (index, src) in output.into_iter().enumerate() {
            let value = match call.blend {
                Some(BlendMode::PremultipliedOver) => {
                    let dst = target.texels[index];
                    let k = 1.0 - src[3];
                    [src[0] + dst[0] * k, src[1] + dst[1] * k, src[2] + dst[2] * k, src[3] + dst[3] * k]
                }
                None => src,
            };
            let masked = target.mask(value);
            target.texels[index] = masked;
        }
        self.draws += 1;
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.surface.width, self.surface.height)
    }

    fn resize_surface(&mut self, width: u32, height: u32) {
        self.surface = SoftTexture::new(width.max(1), height.max(1), PixelFormat::Rgba, Filter::Nearest);
    }

    /// Every frame composites onto a cleared, transparent surface.
    fn begin_frame(&mut self) -> bool {
        self.surface.texels.fill([0.0; 4]);
        true
    }

    fn end_frame(&mut self) {}

    fn read_pixels(&mut self, id: TextureId) -> Result<Vec<Vec4>, BackendError> {
        self.textures
            .get(&id)
            .map(|t| t.texels.clone())
            .ok_or(BackendError::UnknownTexture(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(width: u32, height: u32, filter: Filter) -> TextureDesc {
        TextureDesc {
            width,
            height,
            internal_format: InternalFormat::Rgba16F,
            format: PixelFormat::Rgba,
            data_type: DataType::HalfFloat,
            filter,
        }
    }

    #[test]
    fn textures_start_cleared() {
        let mut backend = SoftwareBackend::new(4, 4);
        let id = backend.create_texture(&desc(3, 2, Filter::Linear)).unwrap();
        let texels = backend.read_pixels(id).unwrap();
        assert_eq!(texels.len(), 6);
        assert!(texels.iter().all(|t| *t == [0.0; 4]));
    }

    #[test]
    fn narrow_formats_report_opaque_alpha() {
        let mut backend = SoftwareBackend::new(4, 4);
        let id = backend
            .create_texture(&TextureDesc {
                internal_format: InternalFormat::R16F,
                format: PixelFormat::Red,
                ..desc(2, 2, Filter::Nearest)
            })
            .unwrap();
        backend.write_pixels(id, &[[1.0, 2.0, 3.0, 4.0]; 4]).unwrap();
        assert_eq!(backend.read_pixels(id).unwrap()[0], [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn linear_sampling_interpolates_between_centres() {
        let mut texture = SoftTexture::new(2, 1, PixelFormat::Rgba, Filter::Linear);
        texture.texels = vec![[0.0; 4], [1.0; 4]];
        assert_eq!(texture.sample([0.25, 0.5])[0], 0.0);
        assert_eq!(texture.sample([0.5, 0.5])[0], 0.5);
        assert_eq!(texture.sample([0.75, 0.5])[0], 1.0);
        // clamp to edge
        assert_eq!(texture.sample([-3.0, 0.5])[0], 0.0);
        assert_eq!(texture.sample([4.0, 0.5])[0], 1.0);
    }

    #[test]
    fn nearest_sampling_picks_containing_texel() {
        let mut texture = SoftTexture::new(2, 1, PixelFormat::Rgba, Filter::Nearest);
        texture.texels = vec![[0.0; 4], [1.0; 4]];
        assert_eq!(texture.sample([0.49, 0.5])[0], 0.0);
        assert_eq!(texture.sample([0.51, 0.5])[0], 1.0);
    }

    #[test]
    fn missing_linear_filtering_forces_nearest() {
        let mut backend = SoftwareBackend::new(4, 4).without_linear_filtering();
        let id = backend.create_texture(&desc(2, 2, Filter::Linear)).unwrap();
        assert_eq!(backend.texture_filter(id), Some(Filter::Nearest));
    }

    #[test]
    fn unsupported_format_is_rejected() {
        let mut backend = SoftwareBackend::new(4, 4).without_format(InternalFormat::Rgba16F);
        assert!(!backend.supports_render_format(InternalFormat::Rgba16F, PixelFormat::Rgba, DataType::HalfFloat));
        assert!(matches!(
            backend.create_texture(&desc(2, 2, Filter::Nearest)),
            Err(BackendError::UnsupportedFormat(InternalFormat::Rgba16F, _))
        ));
        assert!(backend.create_texture(&desc(0, 2, Filter::Nearest)).is_err());
    }

    #[test]
    fn legacy_context_only_renders_unsized_rgba() {
        let mut backend = SoftwareBackend::new(4, 4).with_context(ContextKind::Legacy);
        assert!(!backend.supports_render_format(InternalFormat::Rg16F, PixelFormat::Rg, DataType::HalfFloat));
        assert!(backend.supports_render_format(InternalFormat::Rgba, PixelFormat::Rgba, DataType::HalfFloat));
    }
}
