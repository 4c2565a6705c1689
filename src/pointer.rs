// fluid-cursor - GPU fluid simulation cursor effect
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

//! Mouse and touch contacts turned into splat requests.

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::color::{generate_color, wrap, Rgb};
use crate::config::SimulationConfig;

/// The mouse is a single contact that is never retired.
pub const MOUSE_POINTER_ID: i64 = -1;

/// Backing-store size of the surface and the pixel ratio that maps client
/// coordinates onto it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceGeometry {
    pub width: u32,
    pub height: u32,
    pub pixel_ratio: f32,
}

impl SurfaceGeometry {
    pub fn aspect_ratio(&self) -> f32 {
        self.width.max(1) as f32 / self.height.max(1) as f32
    }

    /// Client coordinates to uv, y pointing up.
    pub fn texcoord(&self, client_x: f32, client_y: f32) -> [f32; 2] {
        let x = client_x * self.pixel_ratio;
        let y = client_y * self.pixel_ratio;
        [x / self.width.max(1) as f32, 1.0 - y / self.height.max(1) as f32]
    }

    /// Scales a uv delta so that equal screen distances give equal deltas on
    /// both axes.
    pub fn correct_delta(&self, delta: [f32; 2]) -> [f32; 2] {
        let aspect_ratio = self.aspect_ratio();
        let mut corrected = delta;
        if aspect_ratio < 1.0 {
            corrected[0] *= aspect_ratio;
        }
        if aspect_ratio > 1.0 {
            corrected[1] /= aspect_ratio;
        }
        corrected
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointerState {
    pub id: i64,
    pub texcoord: [f32; 2],
    pub prev_texcoord: [f32; 2],
    pub delta: [f32; 2],
    pub down: bool,
    pub moved: bool,
    pub color: Rgb,
}

impl PointerState {
    fn new(id: i64, texcoord: [f32; 2], color: Rgb) -> Self {
        Self {
            id,
            texcoord,
            prev_texcoord: texcoord,
            delta: [0.0, 0.0],
            down: false,
            moved: false,
            color,
        }
    }
}

/// One Gaussian injection into velocity and dye.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Splat {
    pub x: f32,
    pub y: f32,
    pub dx: f32,
    pub dy: f32,
    pub color: Rgb,
}

pub struct PointerTracker {
    pointers: Vec<PointerState>,
    color_timer: f32,
    rng: StdRng,
}

impl Default for PointerTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PointerTracker {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            pointers: Vec::new(),
            color_timer: 0.0,
            rng,
        }
    }

    /// Contacts in registration order.
    pub fn pointers(&self) -> &[PointerState] {
        &self.pointers
    }

    pub fn get(&self, id: i64) -> Option<&PointerState> {
        self.pointers.iter().find(|p| p.id == id)
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Index of the record for `id`. Unknown touches take over a retired
    /// touch record whose last move has been consumed before a new one is
    /// registered.
    fn slot(&mut self, id: i64, texcoord: [f32; 2], intensity: f32) -> usize {
        if let Some(index) = self.pointers.iter().position(|p| p.id == id) {
            return index;
        }
        let color = generate_color(&mut self.rng, intensity);
        if id != MOUSE_POINTER_ID {
            if let Some(index) = self
                .pointers
                .iter()
                .position(|p| p.id != MOUSE_POINTER_ID && !p.down && !p.moved)
            {
                self.pointers[index] = PointerState::new(id, texcoord, color);
                return index;
            }
        }
        self.pointers.push(PointerState::new(id, texcoord, color));
        self.pointers.len() - 1
    }

    /// Presses contact `id` and returns the amplified click splat to inject
    /// right away.
    pub fn pointer_down(
        &mut self,
        id: i64,
        client_x: f32,
        client_y: f32,
        geometry: &SurfaceGeometry,
        intensity: f32,
    ) -> Splat {
        let texcoord = geometry.texcoord(client_x, client_y);
        let index = self.slot(id, texcoord, intensity);
        let color = generate_color(&mut self.rng, intensity);

        let pointer = &mut self.pointers[index];
        pointer.id = id;
        pointer.down = true;
        pointer.moved = false;
        pointer.texcoord = texcoord;
        pointer.prev_texcoord = texcoord;
        pointer.delta = [0.0, 0.0];
        pointer.color = color;

        let dx = 10.0 * (self.rng.gen::<f32>() - 0.5);
        let dy = 30.0 * (self.rng.gen::<f32>() - 0.5);
        Splat {
            x: texcoord[0],
            y: texcoord[1],
            dx,
            dy,
            color: generate_color(&mut self.rng, intensity).scaled(10.0),
        }
    }

    pub fn pointer_move(&mut self, id: i64, client_x: f32, client_y: f32, geometry: &SurfaceGeometry, intensity: f32) {
        let texcoord = geometry.texcoord(client_x, client_y);
        let index = self.slot(id, texcoord, intensity);
        let pointer = &mut self.pointers[index];

        pointer.prev_texcoord = pointer.texcoord;
        pointer.texcoord = texcoord;
        pointer.delta = geometry.correct_delta([
            texcoord[0] - pointer.prev_texcoord[0],
            texcoord[1] - pointer.prev_texcoord[1],
        ]);
        pointer.moved = pointer.delta[0].abs() > 0.0 || pointer.delta[1].abs() > 0.0;
    }

    pub fn pointer_up(&mut self, id: i64) {
        if let Some(pointer) = self.pointers.iter_mut().find(|p| p.id == id) {
            pointer.down = false;
        }
    }

    /// Advances the colour timer; every wrap past 1 recolours all contacts.
    pub fn update_colors(&mut self, dt: f32, config: &SimulationConfig) {
        if !config.colorful {
            return;
        }
        self.color_timer += dt * config.color_update_speed;
        if self.color_timer >= 1.0 {
            self.color_timer = wrap(self.color_timer, 0.0, 1.0);
            for pointer in &mut self.pointers {
                pointer.color = generate_color(&mut self.rng, config.intensity);
            }
        }
    }

    /// Splats for every contact that moved since the last call, in
    /// registration order; clears `moved`.
    pub fn take_splats(&mut self, splat_force: f32) -> Vec<Splat> {
        self.pointers
            .iter_mut()
            .filter(|p| p.moved)
            .map(|pointer| {
                pointer.moved = false;
                Splat {
                    x: pointer.texcoord[0],
                    y: pointer.texcoord[1],
                    dx: pointer.delta[0] * splat_force,
                    dy: pointer.delta[1] * splat_force,
                    color: pointer.color,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tracker() -> PointerTracker {
        PointerTracker::with_rng(StdRng::seed_from_u64(42))
    }

    fn square() -> SurfaceGeometry {
        SurfaceGeometry {
            width: 200,
            height: 200,
            pixel_ratio: 1.0,
        }
    }

    #[test]
    fn texcoords_flip_y_and_scale_by_pixel_ratio() {
        let geometry = SurfaceGeometry {
            width: 400,
            height: 200,
            pixel_ratio: 2.0,
        };
        assert_eq!(geometry.texcoord(100.0, 25.0), [0.5, 0.75]);
    }

    #[test]
    fn down_issues_click_splat_and_resets_delta() {
        let mut pointers = tracker();
        let splat = pointers.pointer_down(MOUSE_POINTER_ID, 50.0, 150.0, &square(), 1.0);
        assert_eq!((splat.x, splat.y), (0.25, 0.25));
        assert!(splat.dx.abs() <= 5.0 && splat.dy.abs() <= 15.0);
        assert_relative_eq!(splat.color.max_channel(), 1.5, epsilon = 1e-5);

        let pointer = pointers.get(MOUSE_POINTER_ID).unwrap();
        assert!(pointer.down && !pointer.moved);
        assert_eq!(pointer.delta, [0.0, 0.0]);
    }

    #[test]
    fn moves_in_opposite_directions_mirror_deltas() {
        let mut pointers = tracker();
        let geometry = square();
        pointers.pointer_move(MOUSE_POINTER_ID, 100.0, 100.0, &geometry, 1.0);
        assert!(!pointers.get(MOUSE_POINTER_ID).unwrap().moved);

        pointers.pointer_move(MOUSE_POINTER_ID, 110.0, 100.0, &geometry, 1.0);
        let first = pointers.get(MOUSE_POINTER_ID).unwrap().clone();
        pointers.pointer_move(MOUSE_POINTER_ID, 100.0, 100.0, &geometry, 1.0);
        let second = pointers.get(MOUSE_POINTER_ID).unwrap().clone();

        assert!(first.moved && second.moved);
        assert_relative_eq!(first.delta[0], 0.05, epsilon = 1e-6);
        assert_relative_eq!(first.delta[0], -second.delta[0]);
        assert_eq!(first.delta[1], 0.0);
        assert_eq!(second.delta[1], 0.0);
    }

    #[test]
    fn delta_is_aspect_corrected() {
        let landscape = SurfaceGeometry {
            width: 400,
            height: 200,
            pixel_ratio: 1.0,
        };
        assert_eq!(landscape.correct_delta([0.1, 0.1]), [0.1, 0.05]);
        let portrait = SurfaceGeometry {
            width: 200,
            height: 400,
            pixel_ratio: 1.0,
        };
        assert_eq!(portrait.correct_delta([0.1, 0.1]), [0.05, 0.1]);
        assert_eq!(square().correct_delta([0.1, 0.1]), [0.1, 0.1]);
    }

    #[test]
    fn splats_are_taken_once_in_registration_order() {
        let mut pointers = tracker();
        let geometry = square();
        pointers.pointer_down(7, 10.0, 10.0, &geometry, 1.0);
        pointers.pointer_down(MOUSE_POINTER_ID, 20.0, 20.0, &geometry, 1.0);
        pointers.pointer_move(MOUSE_POINTER_ID, 40.0, 20.0, &geometry, 1.0);
        pointers.pointer_move(7, 10.0, 30.0, &geometry, 1.0);
        // a later move coalesces with the earlier one
        pointers.pointer_move(7, 10.0, 50.0, &geometry, 1.0);

        let splats = pointers.take_splats(1000.0);
        assert_eq!(splats.len(), 2);
        assert_relative_eq!(splats[0].dy, -100.0, epsilon = 1e-3);
        assert_relative_eq!(splats[1].dx, 100.0, epsilon = 1e-3);
        assert!(pointers.take_splats(1000.0).is_empty());
    }

    #[test]
    fn up_keeps_record_and_touch_slots_are_recycled() {
        let mut pointers = tracker();
        let geometry = square();
        pointers.pointer_down(1, 10.0, 10.0, &geometry, 1.0);
        pointers.pointer_up(1);
        assert!(!pointers.get(1).unwrap().down);

        pointers.pointer_down(2, 10.0, 10.0, &geometry, 1.0);
        assert_eq!(pointers.pointers().len(), 1);
        assert_eq!(pointers.pointers()[0].id, 2);

        pointers.pointer_down(3, 10.0, 10.0, &geometry, 1.0);
        assert_eq!(pointers.pointers().len(), 2);
    }

    #[test]
    fn released_touch_keeps_its_pending_move() {
        let mut pointers = tracker();
        let geometry = square();
        pointers.pointer_down(1, 10.0, 10.0, &geometry, 1.0);
        pointers.pointer_move(1, 30.0, 10.0, &geometry, 1.0);
        pointers.pointer_up(1);

        pointers.pointer_down(2, 50.0, 50.0, &geometry, 1.0);
        assert_eq!(pointers.pointers().len(), 2);
        assert!(pointers.get(1).unwrap().moved);

        let splats = pointers.take_splats(1000.0);
        assert_eq!(splats.len(), 1);
        assert_relative_eq!(splats[0].dx, 100.0, epsilon = 1e-3);

        // consumed, so the record is free again
        pointers.pointer_down(3, 10.0, 10.0, &geometry, 1.0);
        assert_eq!(pointers.pointers().len(), 2);
        assert!(pointers.get(1).is_none());
    }

    #[test]
    fn colors_cycle_when_timer_wraps() {
        let mut pointers = tracker();
        pointers.pointer_move(MOUSE_POINTER_ID, 10.0, 10.0, &square(), 1.0);
        let initial = pointers.get(MOUSE_POINTER_ID).unwrap().color;
        let config = SimulationConfig {
            color_update_speed: 10.0,
            ..SimulationConfig::default()
        };

        pointers.update_colors(0.05, &config);
        assert_eq!(pointers.get(MOUSE_POINTER_ID).unwrap().color, initial);
        pointers.update_colors(0.06, &config);
        assert_ne!(pointers.get(MOUSE_POINTER_ID).unwrap().color, initial);
        assert!(pointers.color_timer >= 0.0 && pointers.color_timer < 1.0);

        let frozen = pointers.get(MOUSE_POINTER_ID).unwrap().color;
        let still = SimulationConfig {
            colorful: false,
            ..config
        };
        pointers.update_colors(10.0, &still);
        assert_eq!(pointers.get(MOUSE_POINTER_ID).unwrap().color, frozen);
    }
}
