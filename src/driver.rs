// fluid-cursor - GPU fluid simulation cursor effect
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

//! Rate-limited frame loop around a [`FluidContext`].
//!
//! The host calls [`FrameDriver::frame`] from its redraw callback and
//! forwards pointer events. Nothing here panics or returns an error to the
//! host; failures show up in [`FrameDriver::status`] and the driver goes
//! quiet.

use std::time::{Duration, Instant};

use rand::Rng;

use crate::capture::CapturedFrame;
use crate::config::{DeviceProfile, SimulationConfig, TierLimits};
use crate::gpu::Backend;
use crate::pointer::{PointerTracker, Splat, SurfaceGeometry};
use crate::solver::{FluidContext, InitError};

/// Delay the host waits after mounting before creating the driver.
pub const MOUNT_DELAY: Duration = Duration::from_millis(100);

/// Without any interaction, stepping starts (with one ambient burst) after this long.
pub const IDLE_GRACE: Duration = Duration::from_secs(2);

/// Upper bound on the simulation timestep in seconds.
pub const MAX_DT: f32 = 1.0 / 60.0;

/// Frames arriving this much before the interval are still executed, so
/// vsync jitter does not halve the frame rate.
const FRAME_SLACK: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitStatus {
    Ready,
    Unsupported,
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameOutcome {
    /// Shut down or never initialised.
    Inactive,
    /// Too soon after the last executed frame.
    Skipped,
    Rendered { dt: f32, stepped: bool },
}

pub struct FrameDriver<B: Backend> {
    context: Option<FluidContext<B>>,
    status: InitStatus,
    limits: TierLimits,
    pointers: PointerTracker,
    active: bool,
    started_at: Instant,
    last_frame: Instant,
    interacted: bool,
    ambient_seeded: bool,
}

impl<B: Backend> FrameDriver<B> {
    pub fn new(backend: B, profile: &DeviceProfile, config: SimulationConfig, now: Instant) -> Self {
        Self::with_pointers(backend, profile, config, now, PointerTracker::new())
    }

    /// Like [`FrameDriver::new`] with a caller-supplied tracker (and its RNG).
    pub fn with_pointers(
        backend: B,
        profile: &DeviceProfile,
        config: SimulationConfig,
        now: Instant,
        pointers: PointerTracker,
    ) -> Self {
        let limits = profile.limits();
        log::info!(
            "Device tier {:?}: {} fps, pixel ratio cap {}",
            profile.tier(),
            limits.target_fps,
            limits.max_pixel_ratio
        );

        let (context, status) = match FluidContext::new(backend, config) {
            Ok(context) => (Some(context), InitStatus::Ready),
            Err(InitError::Unsupported) => {
                log::info!("No supported rendering path, fluid effect disabled");
                (None, InitStatus::Unsupported)
            }
            Err(err) => {
                log::warn!("Fluid effect failed to initialise: {}", err);
                (None, InitStatus::Error(err.to_string()))
            }
        };

        Self {
            active: context.is_some(),
            context,
            status,
            limits,
            pointers,
            started_at: now,
            last_frame: now,
            interacted: false,
            ambient_seeded: false,
        }
    }

    pub fn status(&self) -> &InitStatus {
        &self.status
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn limits(&self) -> TierLimits {
        self.limits
    }

    pub fn context(&self) -> Option<&FluidContext<B>> {
        self.context.as_ref()
    }

    pub fn context_mut(&mut self) -> Option<&mut FluidContext<B>> {
        self.context.as_mut()
    }

    pub fn pointers(&self) -> &PointerTracker {
        &self.pointers
    }

    pub fn has_interacted(&self) -> bool {
        self.interacted
    }

    /// Device pixel ratio capped by the device tier.
    pub fn effective_pixel_ratio(&self, device_pixel_ratio: f32) -> f32 {
        device_pixel_ratio.min(self.limits.max_pixel_ratio)
    }

    fn geometry(&self, device_pixel_ratio: f32) -> Option<SurfaceGeometry> {
        let (width, height) = self.context.as_ref()?.backend().surface_size();
        Some(SurfaceGeometry {
            width,
            height,
            pixel_ratio: self.effective_pixel_ratio(device_pixel_ratio),
        })
    }

    fn live_context(&mut self) -> Option<&mut FluidContext<B>> {
        if !self.active {
            return None;
        }
        self.context.as_mut()
    }

    pub fn pointer_down(&mut self, id: i64, client_x: f32, client_y: f32, device_pixel_ratio: f32) {
        let Some(geometry) = self.geometry(device_pixel_ratio) else {
            return;
        };
        let Some(context) = self.live_context() else {
            return;
        };
        let intensity = context.config().intensity;
        let splat = self
            .pointers
            .pointer_down(id, client_x, client_y, &geometry, intensity);
        self.interacted = true;
        if let Some(context) = self.live_context() {
            apply_splat(context, &splat);
        }
    }

    pub fn pointer_move(&mut self, id: i64, client_x: f32, client_y: f32, device_pixel_ratio: f32) {
        let Some(geometry) = self.geometry(device_pixel_ratio) else {
            return;
        };
        let Some(context) = self.live_context() else {
            return;
        };
        if !context.config().track_pointer {
            return;
        }
        let intensity = context.config().intensity;
        self.pointers
            .pointer_move(id, client_x, client_y, &geometry, intensity);
        self.interacted = true;
    }

    pub fn pointer_up(&mut self, id: i64) {
        if !self.active {
            return;
        }
        self.pointers.pointer_up(id);
    }

    /// Runs one scheduled frame. `client_size` is the surface size in
    /// logical pixels.
    pub fn frame(&mut self, now: Instant, client_size: (f32, f32), device_pixel_ratio: f32) -> FrameOutcome {
        if !self.active || self.context.is_none() {
            return FrameOutcome::Inactive;
        }

        let interval = Duration::from_secs_f32(1.0 / self.limits.target_fps.max(1) as f32);
        let elapsed = now.saturating_duration_since(self.last_frame);
        if elapsed + FRAME_SLACK < interval {
            return FrameOutcome::Skipped;
        }
        self.last_frame = now;
        let dt = elapsed.as_secs_f32().min(MAX_DT);

        let ratio = self.effective_pixel_ratio(device_pixel_ratio);
        let width = (client_size.0 * ratio).floor() as u32;
        let height = (client_size.1 * ratio).floor() as u32;
        if let Err(err) = self.resize(width, height) {
            self.fail(err);
            return FrameOutcome::Inactive;
        }

        let idle = now.saturating_duration_since(self.started_at) >= IDLE_GRACE;
        let Some(context) = self.context.as_mut() else {
            return FrameOutcome::Inactive;
        };

        if idle && !self.interacted && !self.ambient_seeded {
            let amount = self.pointers.rng().gen_range(5..25);
            log::debug!("Idle grace elapsed, seeding {} ambient splats", amount);
            context.multiple_splats(amount, self.pointers.rng());
            self.ambient_seeded = true;
        }

        let stepped = (self.interacted || idle) && !context.config().paused;
        if stepped {
            self.pointers.update_colors(dt, context.config());
            apply_inputs(context, &mut self.pointers);
            context.step(dt);
        }

        if context.backend_mut().begin_frame() {
            context.render(None);
            context.backend_mut().end_frame();
        }

        FrameOutcome::Rendered { dt, stepped }
    }

    /// Resizes the surface and fields when the backing store no longer
    /// matches. Zero sizes (minimised windows) are ignored.
    fn resize(&mut self, width: u32, height: u32) -> Result<(), InitError> {
        let Some(context) = self.context.as_mut() else {
            return Ok(());
        };
        if width == 0 || height == 0 || context.backend().surface_size() == (width, height) {
            return Ok(());
        }
        log::debug!("Surface resized to {}x{}", width, height);
        context.backend_mut().resize_surface(width, height);
        context.init_framebuffers()?;
        Ok(())
    }

    /// Applies a new config; targets are rebuilt only for resolution changes.
    pub fn configure(&mut self, config: SimulationConfig) {
        let Some(context) = self.live_context() else {
            return;
        };
        if let Err(err) = context.configure(config) {
            self.fail(err);
        }
    }

    /// Renders a still at the capture resolution.
    pub fn capture(&mut self) -> Option<CapturedFrame> {
        let context = self.live_context()?;
        match context.capture() {
            Ok(frame) => Some(frame),
            Err(err) => {
                log::warn!("Capture failed: {}", err);
                None
            }
        }
    }

    fn fail(&mut self, err: InitError) {
        log::warn!("Fluid effect stopped: {}", err);
        self.status = InitStatus::Error(err.to_string());
        self.shutdown();
    }

    /// Stops the loop for good and releases every GPU resource.
    pub fn shutdown(&mut self) {
        self.active = false;
        if let Some(context) = self.context.take() {
            drop(context.release());
        }
    }
}

fn apply_splat<B: Backend>(context: &mut FluidContext<B>, splat: &Splat) {
    context.splat(splat.x, splat.y, splat.dx, splat.dy, splat.color);
}

/// Pending moves become splats once per frame, in registration order.
fn apply_inputs<B: Backend>(context: &mut FluidContext<B>, pointers: &mut PointerTracker) {
    for splat in pointers.take_splats(context.config().splat_force) {
        apply_splat(context, &splat);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{InternalFormat, SoftwareBackend};
    use crate::pointer::MOUSE_POINTER_ID;
    use rand::{rngs::StdRng, SeedableRng};

    fn small_config() -> SimulationConfig {
        SimulationConfig {
            sim_resolution: 16,
            dye_resolution: 32,
            pressure_iterations: 4,
            ..SimulationConfig::default()
        }
    }

    fn driver(profile: &DeviceProfile, start: Instant) -> FrameDriver<SoftwareBackend> {
        FrameDriver::with_pointers(
            SoftwareBackend::new(64, 64),
            profile,
            small_config(),
            start,
            PointerTracker::with_rng(StdRng::seed_from_u64(1)),
        )
    }

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn frames_are_rate_limited_per_tier() {
        let start = Instant::now();
        let mut low = driver(&DeviceProfile::LOW_END, start);
        assert_eq!(low.frame(start + ms(20), (64.0, 64.0), 1.0), FrameOutcome::Skipped);
        assert!(matches!(low.frame(start + ms(34), (64.0, 64.0), 1.0), FrameOutcome::Rendered { .. }));
        assert_eq!(low.frame(start + ms(50), (64.0, 64.0), 1.0), FrameOutcome::Skipped);

        let mut desktop = driver(&DeviceProfile::DESKTOP, start);
        assert!(matches!(desktop.frame(start + ms(17), (64.0, 64.0), 1.0), FrameOutcome::Rendered { .. }));
    }

    #[test]
    fn dt_is_clamped() {
        let start = Instant::now();
        let mut driver = driver(&DeviceProfile::DESKTOP, start);
        match driver.frame(start + Duration::from_secs(5), (64.0, 64.0), 1.0) {
            FrameOutcome::Rendered { dt, .. } => assert_eq!(dt, MAX_DT),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn stepping_waits_for_interaction_but_rendering_does_not() {
        let start = Instant::now();
        let mut driver = driver(&DeviceProfile::DESKTOP, start);
        let draws = driver.context().unwrap().backend().draw_count();
        assert_eq!(
            driver.frame(start + ms(20), (64.0, 64.0), 1.0),
            FrameOutcome::Rendered {
                dt: 0.02f32.min(MAX_DT),
                stepped: false
            }
        );
        assert!(driver.context().unwrap().backend().draw_count() > draws);

        driver.pointer_move(MOUSE_POINTER_ID, 10.0, 10.0, 1.0);
        assert!(matches!(
            driver.frame(start + ms(40), (64.0, 64.0), 1.0),
            FrameOutcome::Rendered { stepped: true, .. }
        ));
    }

    #[test]
    fn idle_grace_starts_ambient_animation_once() {
        let start = Instant::now();
        let mut driver = driver(&DeviceProfile::DESKTOP, start);
        let outcome = driver.frame(start + IDLE_GRACE + ms(1), (64.0, 64.0), 1.0);
        assert!(matches!(outcome, FrameOutcome::Rendered { stepped: true, .. }));
        assert!(driver.ambient_seeded);

        let dye = driver.context().unwrap().fields().dye.read().texture();
        let context = driver.context_mut().unwrap();
        let texels = context.backend_mut().read_pixels(dye).unwrap();
        assert!(texels.iter().any(|t| t[0] + t[1] + t[2] > 0.0));
    }

    #[test]
    fn paused_renders_without_stepping() {
        let start = Instant::now();
        let mut driver = driver(&DeviceProfile::DESKTOP, start);
        let mut config = small_config();
        config.paused = true;
        driver.configure(config);
        driver.pointer_move(MOUSE_POINTER_ID, 10.0, 10.0, 1.0);
        assert!(matches!(
            driver.frame(start + ms(20), (64.0, 64.0), 1.0),
            FrameOutcome::Rendered { stepped: false, .. }
        ));
    }

    #[test]
    fn disabled_tracking_ignores_moves() {
        let start = Instant::now();
        let mut driver = driver(&DeviceProfile::DESKTOP, start);
        let mut config = small_config();
        config.track_pointer = false;
        driver.configure(config);
        driver.pointer_move(MOUSE_POINTER_ID, 10.0, 10.0, 1.0);
        assert!(!driver.has_interacted());
        assert!(driver.pointers().pointers().is_empty());
    }

    #[test]
    fn pointer_down_splats_immediately() {
        let start = Instant::now();
        let mut driver = driver(&DeviceProfile::DESKTOP, start);
        let draws = driver.context().unwrap().backend().draw_count();
        driver.pointer_down(MOUSE_POINTER_ID, 32.0, 32.0, 1.0);
        assert_eq!(driver.context().unwrap().backend().draw_count(), draws + 2);
        assert!(driver.has_interacted());
    }

    #[test]
    fn surface_follows_capped_pixel_ratio() {
        let start = Instant::now();
        let mut driver = driver(&DeviceProfile::MOBILE, start);
        driver.frame(start + ms(30), (101.0, 50.0), 3.0);
        let context = driver.context().unwrap();
        // 101 * 1.5 = 151.5, 50 * 1.5 = 75
        assert_eq!(context.backend().surface_size(), (151, 75));
        assert_eq!(context.fields().velocity.height(), 16);
        assert_eq!(context.fields().velocity.width(), 32);
    }

    #[test]
    fn shutdown_releases_and_silences() {
        let start = Instant::now();
        let mut driver = driver(&DeviceProfile::DESKTOP, start);
        driver.shutdown();
        assert!(!driver.is_active());
        assert!(driver.context().is_none());
        assert_eq!(driver.frame(start + ms(100), (64.0, 64.0), 1.0), FrameOutcome::Inactive);
        driver.pointer_down(MOUSE_POINTER_ID, 1.0, 1.0, 1.0);
        assert!(driver.capture().is_none());
    }

    #[test]
    fn unsupported_platform_reports_status() {
        let backend = SoftwareBackend::new(64, 64)
            .without_format(InternalFormat::Rgba16F)
            .without_format(InternalFormat::Rgba);
        let start = Instant::now();
        let mut driver = FrameDriver::new(backend, &DeviceProfile::DESKTOP, small_config(), start);
        assert_eq!(driver.status(), &InitStatus::Unsupported);
        assert!(!driver.is_active());
        assert_eq!(driver.frame(start + ms(100), (64.0, 64.0), 1.0), FrameOutcome::Inactive);
    }
}
