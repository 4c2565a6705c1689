// fluid-cursor - GPU fluid simulation cursor effect
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

//! Fluid state and the per-step pass pipeline.
//!
//! Stage order of one step (each a full-screen pass, double-buffered fields
//! swapped after being written):
//!   curl -> vorticity -> divergence -> pressure clear -> Jacobi iterations
//!   -> gradient subtract -> advect velocity -> advect dye

use rand::Rng;

use crate::capture::CapturedFrame;
use crate::color::{generate_color, Rgb};
use crate::config::SimulationConfig;
use crate::gpu::{probe_capabilities, Backend, BackendError, BlendMode, Capabilities, Filter};
use crate::shaders::{
    compile_shader, keyword_set, KeywordSet, Material, Program, ShaderError, ShaderSource, ADVECTION, BASE_VERTEX,
    CLEAR, COLOR, COPY, CURL, DISPLAY, DIVERGENCE, GRADIENT_SUBTRACT, MANUAL_FILTERING, PRESSURE, SHADING, SPLAT,
    VORTICITY,
};
use crate::targets::{
    create_double_target, create_target, resize_double_target, resolution, DoubleRenderTarget, RenderTarget,
};

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("no renderable texture format on this platform")]
    Unsupported,
    #[error(transparent)]
    Shader(#[from] ShaderError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

const DISPLAY_UNIFORMS: &[&str] = &["texelSize", "uTexture"];

/// Every program the stepper draws with.
pub struct Programs {
    pub copy: Program,
    pub clear: Program,
    pub color: Program,
    pub splat: Program,
    pub advection: Program,
    pub divergence: Program,
    pub curl: Program,
    pub vorticity: Program,
    pub pressure: Program,
    pub gradient_subtract: Program,
    pub display: Material,
}

impl Programs {
    pub fn new<B: Backend + ?Sized>(backend: &mut B, caps: &Capabilities) -> Result<Self, ShaderError> {
        let none = KeywordSet::new();
        let vertex = compile_shader(backend, &BASE_VERTEX, &none);

        let advection_keywords = if caps.linear_filtering {
            KeywordSet::new()
        } else {
            keyword_set(&[MANUAL_FILTERING])
        };

        let mut link = |source: &ShaderSource, keywords: &KeywordSet| {
            let fragment = compile_shader(backend, source, keywords);
            Program::new(backend, &vertex, &fragment)
        };

        let programs = Self {
            copy: link(&COPY, &none),
            clear: link(&CLEAR, &none),
            color: link(&COLOR, &none),
            splat: link(&SPLAT, &none),
            advection: link(&ADVECTION, &advection_keywords),
            divergence: link(&DIVERGENCE, &none),
            curl: link(&CURL, &none),
            vorticity: link(&VORTICITY, &none),
            pressure: link(&PRESSURE, &none),
            gradient_subtract: link(&GRADIENT_SUBTRACT, &none),
            display: Material::new(vertex.clone(), DISPLAY),
        };
        programs.verify()?;
        Ok(programs)
    }

    fn verify(&self) -> Result<(), ShaderError> {
        self.copy.verify(&["texelSize", "uTexture"])?;
        self.clear.verify(&["texelSize", "uTexture", "value"])?;
        self.color.verify(&["texelSize", "color"])?;
        self.splat
            .verify(&["texelSize", "uTarget", "aspectRatio", "point", "color", "radius"])?;
        self.advection
            .verify(&["texelSize", "dyeTexelSize", "uVelocity", "uSource", "dt", "dissipation"])?;
        self.divergence.verify(&["texelSize", "uVelocity"])?;
        self.curl.verify(&["texelSize", "uVelocity"])?;
        self.vorticity
            .verify(&["texelSize", "uVelocity", "uCurl", "curl", "dt"])?;
        self.pressure.verify(&["texelSize", "uPressure", "uDivergence"])?;
        self.gradient_subtract
            .verify(&["texelSize", "uPressure", "uVelocity"])?;
        Ok(())
    }
}

/// The five simulation fields.
#[derive(Debug)]
pub struct Fields {
    pub dye: DoubleRenderTarget,
    pub velocity: DoubleRenderTarget,
    pub divergence: RenderTarget,
    pub curl: RenderTarget,
    pub pressure: DoubleRenderTarget,
}

impl Fields {
    fn release<B: Backend + ?Sized>(self, backend: &mut B) {
        self.dye.release(backend);
        self.velocity.release(backend);
        self.divergence.release(backend);
        self.curl.release(backend);
        self.pressure.release(backend);
    }
}

/// Simulation context: the backend, the active config, the programs and
/// the fields, passed explicitly to every stage.
pub struct FluidContext<B: Backend> {
    backend: B,
    caps: Capabilities,
    config: SimulationConfig,
    programs: Programs,
    fields: Fields,
}

impl<B: Backend> FluidContext<B> {
    /// Probes formats, compiles and verifies programs and allocates fields.
    /// A degraded platform forces shading off and a small dye field.
    pub fn new(mut backend: B, mut config: SimulationConfig) -> Result<Self, InitError> {
        let caps = probe_capabilities(&mut backend).ok_or(InitError::Unsupported)?;
        if caps.degraded() {
            log::info!("Degraded texture support ({:?}), disabling shading", caps.context);
            config.degrade_for_fallback();
        }

        let mut programs = Programs::new(&mut backend, &caps)?;
        let fields = allocate_fields(&mut backend, &caps, &config)?;

        select_display_keywords(&mut backend, &mut programs.display, &config)?;

        Ok(Self {
            backend,
            caps,
            config,
            programs,
            fields,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn programs(&self) -> &Programs {
        &self.programs
    }

    fn aspect_ratio(&self) -> f32 {
        let (width, height) = self.backend.surface_size();
        width.max(1) as f32 / height.max(1) as f32
    }

    /// Applies a new config. Render targets are only rebuilt when a
    /// resolution field changed.
    pub fn configure(&mut self, mut config: SimulationConfig) -> Result<(), InitError> {
        if self.caps.degraded() {
            config.degrade_for_fallback();
        }
        let rebuild = self.config.resolution_changed(&config);
        self.config = config;
        select_display_keywords(&mut self.backend, &mut self.programs.display, &self.config)?;
        if rebuild {
            log::debug!(
                "Resolution changed to sim {} / dye {}, rebuilding fields",
                self.config.sim_resolution,
                self.config.dye_resolution
            );
            self.init_framebuffers()?;
        }
        Ok(())
    }

    /// Sizes every field for the current surface. Dye and velocity keep their
    /// contents through a blit; the scalar fields are recreated.
    pub fn init_framebuffers(&mut self) -> Result<(), BackendError> {
        let (surface_width, surface_height) = self.backend.surface_size();
        let (sim_width, sim_height) = resolution(self.config.sim_resolution, surface_width, surface_height);
        let (dye_width, dye_height) = resolution(self.config.dye_resolution, surface_width, surface_height);
        let caps = self.caps;
        let data_type = caps.data_type;

        resize_double_target(
            &mut self.backend,
            &mut self.programs.copy,
            &mut self.fields.dye,
            dye_width,
            dye_height,
        )?;
        resize_double_target(
            &mut self.backend,
            &mut self.programs.copy,
            &mut self.fields.velocity,
            sim_width,
            sim_height,
        )?;

        let divergence = create_target(
            &mut self.backend,
            sim_width,
            sim_height,
            caps.r.internal_format,
            caps.r.format,
            data_type,
            Filter::Nearest,
        )?;
        std::mem::replace(&mut self.fields.divergence, divergence).release(&mut self.backend);

        let curl = create_target(
            &mut self.backend,
            sim_width,
            sim_height,
            caps.r.internal_format,
            caps.r.format,
            data_type,
            Filter::Nearest,
        )?;
        std::mem::replace(&mut self.fields.curl, curl).release(&mut self.backend);

        let pressure = create_double_target(
            &mut self.backend,
            sim_width,
            sim_height,
            caps.r.internal_format,
            caps.r.format,
            data_type,
            Filter::Nearest,
        )?;
        std::mem::replace(&mut self.fields.pressure, pressure).release(&mut self.backend);

        Ok(())
    }

    /// Advances the fields by `dt` seconds.
    pub fn step(&mut self, dt: f32) {
        self.compute_curl();
        self.apply_vorticity(dt);
        self.compute_divergence();
        self.clear_pressure();
        self.solve_pressure();
        self.subtract_gradient();
        self.advect_velocity(dt);
        self.advect_dye(dt);
    }

    pub fn compute_curl(&mut self) {
        let velocity = &self.fields.velocity;
        let program = &mut self.programs.curl;
        program.set_vec2("texelSize", velocity.texel_size());
        program.set_texture("uVelocity", velocity.read().texture());
        program.draw(&mut self.backend, Some(self.fields.curl.texture()), None);
    }

    pub fn apply_vorticity(&mut self, dt: f32) {
        let velocity = &mut self.fields.velocity;
        let program = &mut self.programs.vorticity;
        program.set_vec2("texelSize", velocity.texel_size());
        program.set_texture("uVelocity", velocity.read().texture());
        program.set_texture("uCurl", self.fields.curl.texture());
        program.set_f32("curl", self.config.curl);
        program.set_f32("dt", dt);
        program.draw(&mut self.backend, Some(velocity.write().texture()), None);
        velocity.swap();
    }

    pub fn compute_divergence(&mut self) {
        let velocity = &self.fields.velocity;
        let program = &mut self.programs.divergence;
        program.set_vec2("texelSize", velocity.texel_size());
        program.set_texture("uVelocity", velocity.read().texture());
        program.draw(&mut self.backend, Some(self.fields.divergence.texture()), None);
    }

    /// Damps last step's pressure by `config.pressure` as the solver's
    /// initial guess.
    pub fn clear_pressure(&mut self) {
        let pressure = &mut self.fields.pressure;
        let program = &mut self.programs.clear;
        program.set_vec2("texelSize", pressure.texel_size());
        program.set_texture("uTexture", pressure.read().texture());
        program.set_f32("value", self.config.pressure);
        program.draw(&mut self.backend, Some(pressure.write().texture()), None);
        pressure.swap();
    }

    /// `config.pressure_iterations` Jacobi passes.
    pub fn solve_pressure(&mut self) {
        let pressure = &mut self.fields.pressure;
        let program = &mut self.programs.pressure;
        program.set_vec2("texelSize", self.fields.velocity.texel_size());
        program.set_texture("uDivergence", self.fields.divergence.texture());
        for _ in 0..self.config.pressure_iterations {
            program.set_texture("uPressure", pressure.read().texture());
            program.draw(&mut self.backend, Some(pressure.write().texture()), None);
            pressure.swap();
        }
    }

    pub fn subtract_gradient(&mut self) {
        let velocity = &mut self.fields.velocity;
        let program = &mut self.programs.gradient_subtract;
        program.set_vec2("texelSize", velocity.texel_size());
        program.set_texture("uPressure", self.fields.pressure.read().texture());
        program.set_texture("uVelocity", velocity.read().texture());
        program.draw(&mut self.backend, Some(velocity.write().texture()), None);
        velocity.swap();
    }

    pub fn advect_velocity(&mut self, dt: f32) {
        let velocity = &mut self.fields.velocity;
        let program = &mut self.programs.advection;
        program.set_vec2("texelSize", velocity.texel_size());
        program.set_vec2("dyeTexelSize", velocity.texel_size());
        program.set_texture("uVelocity", velocity.read().texture());
        program.set_texture("uSource", velocity.read().texture());
        program.set_f32("dt", dt);
        program.set_f32("dissipation", self.config.velocity_dissipation);
        program.draw(&mut self.backend, Some(velocity.write().texture()), None);
        velocity.swap();
    }

    pub fn advect_dye(&mut self, dt: f32) {
        let dye = &mut self.fields.dye;
        let velocity = &self.fields.velocity;
        let program = &mut self.programs.advection;
        program.set_vec2("texelSize", velocity.texel_size());
        program.set_vec2("dyeTexelSize", dye.texel_size());
        program.set_texture("uVelocity", velocity.read().texture());
        program.set_texture("uSource", dye.read().texture());
        program.set_f32("dt", dt);
        program.set_f32("dissipation", self.config.density_dissipation);
        program.draw(&mut self.backend, Some(dye.write().texture()), None);
        dye.swap();
    }

    /// Splat radius in uv units, widened along x on landscape surfaces.
    fn correct_radius(&self, radius: f32) -> f32 {
        let aspect_ratio = self.aspect_ratio();
        if aspect_ratio > 1.0 {
            radius * aspect_ratio
        } else {
            radius
        }
    }

    /// Adds a Gaussian impulse `(dx, dy)` to velocity and `color` to dye,
    /// centred at uv `(x, y)`.
    pub fn splat(&mut self, x: f32, y: f32, dx: f32, dy: f32, color: Rgb) {
        let aspect_ratio = self.aspect_ratio();
        let radius = self.correct_radius(self.config.splat_radius / 100.0);

        let program = &mut self.programs.splat;
        program.set_f32("aspectRatio", aspect_ratio);
        program.set_vec2("point", [x, y]);
        program.set_f32("radius", radius);

        let velocity = &mut self.fields.velocity;
        program.set_vec2("texelSize", velocity.texel_size());
        program.set_texture("uTarget", velocity.read().texture());
        program.set_vec3("color", [dx, dy, 0.0]);
        program.draw(&mut self.backend, Some(velocity.write().texture()), None);
        velocity.swap();

        let dye = &mut self.fields.dye;
        program.set_vec2("texelSize", dye.texel_size());
        program.set_texture("uTarget", dye.read().texture());
        program.set_vec3("color", color.to_array());
        program.draw(&mut self.backend, Some(dye.write().texture()), None);
        dye.swap();
    }

    /// `amount` bright splats at random positions with strong random kicks.
    pub fn multiple_splats<R: Rng + ?Sized>(&mut self, amount: u32, rng: &mut R) {
        for _ in 0..amount {
            let color = generate_color(rng, self.config.intensity).scaled(10.0);
            let x = rng.gen::<f32>();
            let y = rng.gen::<f32>();
            let dx = 1000.0 * (rng.gen::<f32>() - 0.5);
            let dy = 1000.0 * (rng.gen::<f32>() - 0.5);
            self.splat(x, y, dx, dy, color);
        }
    }

    /// Composites the dye field into `target`, or the visible surface when
    /// `None`.
    pub fn render(&mut self, target: Option<&RenderTarget>) {
        let transparent = self.config.transparent;
        let blend = if target.is_none() || !transparent {
            Some(BlendMode::PremultipliedOver)
        } else {
            None
        };
        let target_texture = target.map(RenderTarget::texture);
        let (width, height) = match target {
            Some(target) => (target.width, target.height),
            None => self.backend.surface_size(),
        };

        if !transparent {
            let back = self.config.back_color;
            let program = &mut self.programs.color;
            program.set_vec4("color", [back.r, back.g, back.b, 1.0]);
            program.draw(&mut self.backend, target_texture, blend);
        }

        if let Some(program) = self.programs.display.program_mut() {
            program.set_vec2("texelSize", [1.0 / width.max(1) as f32, 1.0 / height.max(1) as f32]);
            program.set_texture("uTexture", self.fields.dye.read().texture());
            program.draw(&mut self.backend, target_texture, blend);
        }
    }

    /// Renders one frame at `config.capture_resolution` into a scratch
    /// target and reads it back.
    pub fn capture(&mut self) -> Result<CapturedFrame, BackendError> {
        let (surface_width, surface_height) = self.backend.surface_size();
        let (width, height) = resolution(self.config.capture_resolution, surface_width, surface_height);
        let target = create_target(
            &mut self.backend,
            width,
            height,
            self.caps.rgba.internal_format,
            self.caps.rgba.format,
            self.caps.data_type,
            Filter::Nearest,
        )?;

        self.render(Some(&target));
        let texels = self.backend.read_pixels(target.texture());
        target.release(&mut self.backend);

        Ok(CapturedFrame::from_texels(width, height, &texels?))
    }

    /// Releases every field texture and hands the backend back.
    pub fn release(mut self) -> B {
        self.fields.release(&mut self.backend);
        self.backend
    }
}

fn allocate_fields<B: Backend + ?Sized>(
    backend: &mut B,
    caps: &Capabilities,
    config: &SimulationConfig,
) -> Result<Fields, BackendError> {
    let (surface_width, surface_height) = backend.surface_size();
    let (sim_width, sim_height) = resolution(config.sim_resolution, surface_width, surface_height);
    let (dye_width, dye_height) = resolution(config.dye_resolution, surface_width, surface_height);
    let filtering = caps.filtering();
    let data_type = caps.data_type;

    log::info!(
        "Allocating fields: velocity {}x{}, dye {}x{}",
        sim_width,
        sim_height,
        dye_width,
        dye_height
    );

    let dye = create_double_target(
        backend,
        dye_width,
        dye_height,
        caps.rgba.internal_format,
        caps.rgba.format,
        data_type,
        filtering,
    )?;
    let velocity = create_double_target(
        backend,
        sim_width,
        sim_height,
        caps.rg.internal_format,
        caps.rg.format,
        data_type,
        filtering,
    )?;
    let divergence = create_target(
        backend,
        sim_width,
        sim_height,
        caps.r.internal_format,
        caps.r.format,
        data_type,
        Filter::Nearest,
    )?;
    let curl = create_target(
        backend,
        sim_width,
        sim_height,
        caps.r.internal_format,
        caps.r.format,
        data_type,
        Filter::Nearest,
    )?;
    let pressure = create_double_target(
        backend,
        sim_width,
        sim_height,
        caps.r.internal_format,
        caps.r.format,
        data_type,
        Filter::Nearest,
    )?;

    Ok(Fields {
        dye,
        velocity,
        divergence,
        curl,
        pressure,
    })
}

fn select_display_keywords<B: Backend + ?Sized>(
    backend: &mut B,
    display: &mut Material,
    config: &SimulationConfig,
) -> Result<(), ShaderError> {
    let keywords = if config.shading {
        keyword_set(&[SHADING])
    } else {
        KeywordSet::new()
    };
    display.set_keywords(backend, &keywords);
    match display.program() {
        Some(program) => program.verify(DISPLAY_UNIFORMS),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{ContextKind, InternalFormat, PixelFormat, SoftwareBackend};

    fn context(width: u32, height: u32) -> FluidContext<SoftwareBackend> {
        let config = SimulationConfig {
            sim_resolution: 16,
            dye_resolution: 32,
            ..SimulationConfig::default()
        };
        FluidContext::new(SoftwareBackend::new(width, height), config).unwrap()
    }

    #[test]
    fn fields_follow_surface_aspect() {
        let ctx = context(200, 100);
        let fields = ctx.fields();
        assert_eq!((fields.velocity.width(), fields.velocity.height()), (32, 16));
        assert_eq!((fields.dye.width(), fields.dye.height()), (64, 32));
        assert_eq!((fields.pressure.width(), fields.pressure.height()), (32, 16));
        assert_eq!(fields.curl.filter, Filter::Nearest);
        assert_eq!(fields.velocity.read().format, PixelFormat::Rg);
        assert_eq!(fields.divergence.format, PixelFormat::Red);
    }

    #[test]
    fn manual_filtering_without_linear_sampling() {
        let backend = SoftwareBackend::new(64, 64).without_linear_filtering();
        let ctx = FluidContext::new(backend, SimulationConfig::default()).unwrap();
        assert!(ctx.capabilities().degraded());
        assert!(!ctx.config().shading);
        assert_eq!(ctx.config().dye_resolution, crate::config::DEGRADED_DYE_RESOLUTION);
        assert_eq!(ctx.fields().dye.read().filter, Filter::Nearest);
    }

    #[test]
    fn unrenderable_platform_is_unsupported() {
        let backend = SoftwareBackend::new(64, 64)
            .with_context(ContextKind::Legacy)
            .without_format(InternalFormat::Rgba);
        assert!(matches!(
            FluidContext::new(backend, SimulationConfig::default()),
            Err(InitError::Unsupported)
        ));
    }

    #[test]
    fn step_issues_passes_in_fixed_count() {
        let mut ctx = context(64, 64);
        let iterations = ctx.config().pressure_iterations as usize;
        let before = ctx.backend().draw_count();
        ctx.step(1.0 / 60.0);
        // curl, vorticity, divergence, clear, N jacobi, gradient, 2 advections
        assert_eq!(ctx.backend().draw_count() - before, 7 + iterations);
    }

    #[test]
    fn cosmetic_configure_keeps_targets() {
        let mut ctx = context(64, 64);
        let dye = ctx.fields().dye.read().texture();
        let mut config = ctx.config().clone();
        config.shading = !config.shading;
        config.curl = 3.0;
        ctx.configure(config).unwrap();
        assert_eq!(ctx.fields().dye.read().texture(), dye);
        assert_eq!(ctx.programs().display.variant_count(), 2);
    }

    #[test]
    fn resolution_configure_resizes_and_keeps_dye() {
        let mut ctx = context(64, 64);
        ctx.splat(0.5, 0.5, 0.0, 0.0, Rgb::new(1.0, 0.0, 0.0));
        let mut config = ctx.config().clone();
        config.dye_resolution = 16;
        ctx.configure(config).unwrap();

        let dye = &ctx.fields().dye;
        assert_eq!((dye.width(), dye.height()), (16, 16));
        let id = dye.read().texture();
        let texels = ctx.backend.read_pixels(id).unwrap();
        let centre = texels[8 * 16 + 8];
        assert!(centre[0] > 0.1, "dye lost on resize: {:?}", centre);
    }

    #[test]
    fn splat_writes_velocity_and_dye() {
        let mut ctx = context(64, 64);
        ctx.splat(0.5, 0.5, 100.0, -50.0, Rgb::new(0.0, 0.5, 0.0));
        let (velocity_id, dye_id) = (ctx.fields().velocity.read().texture(), ctx.fields().dye.read().texture());
        let velocity = ctx.backend.read_pixels(velocity_id).unwrap();
        let centre = velocity[8 * 16 + 8];
        assert!(centre[0] > 0.0 && centre[1] < 0.0);
        let dye = ctx.backend.read_pixels(dye_id).unwrap();
        assert!(dye[16 * 32 + 16][1] > 0.0);
        assert_eq!(dye[16 * 32 + 16][0], 0.0);
    }

    #[test]
    fn render_composites_over_background() {
        let mut ctx = context(8, 8);
        let mut config = ctx.config().clone();
        config.back_color = Rgb::new(0.0, 0.0, 1.0);
        config.shading = false;
        ctx.configure(config).unwrap();
        ctx.render(None);
        let surface = ctx.backend().read_surface();
        // empty dye: alpha 0, background shows through
        assert!(surface.iter().all(|p| *p == [0.0, 0.0, 1.0, 1.0]));
    }

    #[test]
    fn transparent_render_leaves_only_dye() {
        let mut ctx = context(8, 8);
        let mut config = ctx.config().clone();
        config.transparent = true;
        config.shading = false;
        ctx.configure(config).unwrap();
        ctx.render(None);
        assert!(ctx.backend().read_surface().iter().all(|p| *p == [0.0; 4]));
    }

    #[test]
    fn transparent_frames_do_not_accumulate() {
        let mut ctx = context(16, 16);
        let mut config = ctx.config().clone();
        config.transparent = true;
        config.shading = false;
        ctx.configure(config).unwrap();
        ctx.splat(0.5, 0.5, 0.0, 0.0, Rgb::new(0.3, 0.1, 0.0));

        let mut seen = Vec::new();
        for _ in 0..3 {
            assert!(ctx.backend_mut().begin_frame());
            ctx.render(None);
            ctx.backend_mut().end_frame();
            seen.push(ctx.backend().read_surface()[8 * 16 + 8]);
        }
        assert!(seen[0][0] > 0.0);
        assert_eq!(seen[0], seen[1]);
        assert_eq!(seen[0], seen[2]);
    }

    #[test]
    fn capture_uses_capture_resolution() {
        let mut ctx = context(100, 50);
        let mut config = ctx.config().clone();
        config.capture_resolution = 20;
        ctx.configure(config).unwrap();
        let textures = ctx.backend().texture_count();
        let frame = ctx.capture().unwrap();
        assert_eq!((frame.width, frame.height), (40, 20));
        assert_eq!(frame.pixels.len(), 40 * 20 * 4);
        assert_eq!(ctx.backend().texture_count(), textures);
    }

    #[test]
    fn release_frees_every_field() {
        let ctx = context(32, 32);
        let backend = ctx.release();
        assert_eq!(backend.texture_count(), 0);
    }
}
