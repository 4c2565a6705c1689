// fluid-cursor - GPU fluid simulation cursor effect
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Dye colour scale applied to freshly generated pointer colours.
pub const DYE_COLOR_SCALE: f32 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0.0, g: 0.0, b: 0.0 };

    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub fn scaled(self, factor: f32) -> Self {
        Self {
            r: self.r * factor,
            g: self.g * factor,
            b: self.b * factor,
        }
    }

    pub fn max_channel(self) -> f32 {
        self.r.max(self.g).max(self.b)
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }
}

impl From<[f32; 3]> for Rgb {
    fn from(c: [f32; 3]) -> Self {
        Self::new(c[0], c[1], c[2])
    }
}

pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb {
    let i = (h * 6.0).floor();
    let f = h * 6.0 - i;
    let p = v * (1.0 - s);
    let q = v * (1.0 - f * s);
    let t = v * (1.0 - (1.0 - f) * s);

    match (i as i32).rem_euclid(6) {
        0 => Rgb::new(v, t, p),
        1 => Rgb::new(q, v, p),
        2 => Rgb::new(p, v, t),
        3 => Rgb::new(p, q, v),
        4 => Rgb::new(t, p, v),
        _ => Rgb::new(v, p, q),
    }
}

/// Random fully saturated hue, dimmed so that overlapping splats stay subtle.
pub fn generate_color<R: Rng + ?Sized>(rng: &mut R, intensity: f32) -> Rgb {
    hsv_to_rgb(rng.gen::<f32>(), 1.0, 1.0).scaled(DYE_COLOR_SCALE * intensity)
}

/// Wraps `value` into `[min, max)`. Negative inputs wrap too.
pub fn wrap(value: f32, min: f32, max: f32) -> f32 {
    let range = max - min;
    if range == 0.0 {
        return min;
    }
    let wrapped = (value - min).rem_euclid(range) + min;
    // rem_euclid rounds up to `range` for tiny negative offsets
    if wrapped >= max {
        min
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn primary_hues() {
        assert_eq!(hsv_to_rgb(0.0, 1.0, 1.0), Rgb::new(1.0, 0.0, 0.0));
        let green = hsv_to_rgb(1.0 / 3.0, 1.0, 1.0);
        assert_relative_eq!(green.g, 1.0);
        assert!(green.r < 1e-5 && green.b < 1e-5);
        let blue = hsv_to_rgb(2.0 / 3.0, 1.0, 1.0);
        assert_relative_eq!(blue.b, 1.0);
    }

    #[test]
    fn generated_colors_are_dim() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..64 {
            let c = generate_color(&mut rng, 1.0);
            assert_relative_eq!(c.max_channel(), DYE_COLOR_SCALE, epsilon = 1e-6);
        }
    }

    #[test]
    fn wrap_stays_in_range() {
        assert_relative_eq!(wrap(1.25, 0.0, 1.0), 0.25);
        assert_relative_eq!(wrap(3.5, 0.0, 1.0), 0.5);
        assert_relative_eq!(wrap(-0.25, 0.0, 1.0), 0.75);
        assert_eq!(wrap(5.0, 2.0, 2.0), 2.0);
        for i in -40..40 {
            let w = wrap(i as f32 * 0.37, 0.0, 1.0);
            assert!((0.0..1.0).contains(&w), "wrap({}) = {}", i as f32 * 0.37, w);
        }
    }

    #[test]
    fn tiny_negative_offsets_stay_below_max() {
        let w = wrap(-1e-9, 0.0, 1.0);
        assert!((0.0..1.0).contains(&w), "wrap(-1e-9) = {}", w);
        assert!(wrap(2.0 - 1e-9, 2.0, 3.0) < 3.0);
    }
}
