// fluid-cursor - GPU fluid simulation cursor effect
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::color::Rgb;

pub const SETTINGS_FILE_NAME: &str = "fluid_settings.json";
pub const PROFILE_ENV_VAR: &str = "FLUID_CURSOR_PROFILE";

/// Dye resolution used when the platform only offers the degraded texture path.
pub const DEGRADED_DYE_RESOLUTION: u32 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Low,
    Medium,
    #[default]
    High,
}

/// Coarse device classification supplied by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub is_low_end: bool,
    pub is_mobile: bool,
    pub recommended_quality: Quality,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceTier {
    LowEnd,
    Mobile,
    Desktop,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierLimits {
    pub target_fps: u32,
    pub max_pixel_ratio: f32,
}

impl DeviceProfile {
    pub const LOW_END: DeviceProfile = DeviceProfile {
        is_low_end: true,
        is_mobile: true,
        recommended_quality: Quality::Low,
    };
    pub const MOBILE: DeviceProfile = DeviceProfile {
        is_low_end: false,
        is_mobile: true,
        recommended_quality: Quality::Medium,
    };
    pub const DESKTOP: DeviceProfile = DeviceProfile {
        is_low_end: false,
        is_mobile: false,
        recommended_quality: Quality::High,
    };

    pub fn tier(&self) -> DeviceTier {
        if self.is_low_end || self.recommended_quality == Quality::Low {
            DeviceTier::LowEnd
        } else if self.is_mobile {
            DeviceTier::Mobile
        } else {
            DeviceTier::Desktop
        }
    }

    pub fn limits(&self) -> TierLimits {
        match self.tier() {
            DeviceTier::LowEnd => TierLimits {
                target_fps: 30,
                max_pixel_ratio: 1.0,
            },
            DeviceTier::Mobile => TierLimits {
                target_fps: 45,
                max_pixel_ratio: 1.5,
            },
            DeviceTier::Desktop => TierLimits {
                target_fps: 60,
                max_pixel_ratio: 2.0,
            },
        }
    }

    /// Reads `FLUID_CURSOR_PROFILE` (`low`, `mobile`, `desktop`).
    pub fn from_env() -> Option<Self> {
        let value = std::env::var(PROFILE_ENV_VAR).ok()?;
        match value.trim().to_ascii_lowercase().as_str() {
            "low" | "lowend" | "low-end" => Some(Self::LOW_END),
            "mobile" => Some(Self::MOBILE),
            "desktop" => Some(Self::DESKTOP),
            other => {
                log::warn!("Unknown {} value '{}', ignoring", PROFILE_ENV_VAR, other);
                None
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    pub sim_resolution: u32,
    pub dye_resolution: u32,
    pub capture_resolution: u32,
    pub density_dissipation: f32,
    pub velocity_dissipation: f32,
    pub pressure: f32,           // Damping of last frame's pressure as the Jacobi initial guess
    pub pressure_iterations: u32,
    pub curl: f32,               // Vorticity confinement strength
    pub splat_radius: f32,
    pub splat_force: f32,
    pub shading: bool,
    pub colorful: bool,          // Cycle pointer colours automatically
    pub color_update_speed: f32,
    pub back_color: Rgb,
    pub transparent: bool,
    pub intensity: f32,
    pub track_pointer: bool,
    pub paused: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self::for_tier(DeviceTier::Desktop)
    }
}

impl SimulationConfig {
    pub fn for_profile(profile: &DeviceProfile) -> Self {
        let mut config = Self::for_tier(profile.tier());
        if profile.tier() == DeviceTier::Desktop && profile.recommended_quality == Quality::Medium {
            config.dye_resolution = 512;
        }
        config
    }

    pub fn for_tier(tier: DeviceTier) -> Self {
        let base = Self {
            sim_resolution: 128,
            dye_resolution: 1024,
            capture_resolution: 512,
            density_dissipation: 1.0,
            velocity_dissipation: 0.2,
            pressure: 0.8,
            pressure_iterations: 20,
            curl: 30.0,
            splat_radius: 0.25,
            splat_force: 6000.0,
            shading: true,
            colorful: true,
            color_update_speed: 10.0,
            back_color: Rgb::BLACK,
            transparent: false,
            intensity: 1.0,
            track_pointer: true,
            paused: false,
        };

        match tier {
            DeviceTier::Desktop => base,
            DeviceTier::Mobile => Self {
                sim_resolution: 96,
                dye_resolution: 512,
                pressure_iterations: 15,
                ..base
            },
            DeviceTier::LowEnd => Self {
                sim_resolution: 64,
                dye_resolution: 256,
                capture_resolution: 256,
                pressure_iterations: 10,
                curl: 20.0,
                shading: false,
                ..base
            },
        }
    }

    /// Whether moving from `self` to `other` requires new render targets.
    pub fn resolution_changed(&self, other: &SimulationConfig) -> bool {
        self.sim_resolution != other.sim_resolution || self.dye_resolution != other.dye_resolution
    }

    pub fn degrade_for_fallback(&mut self) {
        self.shading = false;
        self.dye_resolution = DEGRADED_DYE_RESOLUTION;
    }

    pub fn default_path() -> PathBuf {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(SETTINGS_FILE_NAME)
    }

    pub fn load_from_disk(path: &Path) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&data)?;
        config.sanitize();
        Ok(config)
    }

    pub fn save_to_disk(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn sanitize(&mut self) {
        self.sim_resolution = self.sim_resolution.clamp(8, 1024);
        self.dye_resolution = self.dye_resolution.clamp(8, 4096);
        self.capture_resolution = self.capture_resolution.clamp(8, 4096);
        self.density_dissipation = self.density_dissipation.clamp(0.0, 10.0);
        self.velocity_dissipation = self.velocity_dissipation.clamp(0.0, 10.0);
        self.pressure = self.pressure.clamp(0.0, 1.0);
        self.pressure_iterations = self.pressure_iterations.min(200);
        self.curl = self.curl.clamp(0.0, 100.0);
        self.splat_radius = self.splat_radius.clamp(0.001, 5.0);
        self.splat_force = self.splat_force.clamp(0.0, 100_000.0);
        self.color_update_speed = self.color_update_speed.clamp(0.0, 100.0);
        self.intensity = self.intensity.clamp(0.0, 10.0);
        // shading, colorful, transparent, track_pointer and paused require no sanitizing
        self.back_color = Rgb::new(
            self.back_color.r.clamp(0.0, 1.0),
            self.back_color.g.clamp(0.0, 1.0),
            self.back_color.b.clamp(0.0, 1.0),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_from_profile() {
        assert_eq!(DeviceProfile::LOW_END.tier(), DeviceTier::LowEnd);
        assert_eq!(DeviceProfile::MOBILE.tier(), DeviceTier::Mobile);
        assert_eq!(DeviceProfile::DESKTOP.tier(), DeviceTier::Desktop);

        let low_quality_desktop = DeviceProfile {
            recommended_quality: Quality::Low,
            ..DeviceProfile::DESKTOP
        };
        assert_eq!(low_quality_desktop.tier(), DeviceTier::LowEnd);
    }

    #[test]
    fn tier_limits() {
        assert_eq!(DeviceProfile::LOW_END.limits().target_fps, 30);
        assert_eq!(DeviceProfile::MOBILE.limits().target_fps, 45);
        assert_eq!(DeviceProfile::DESKTOP.limits().target_fps, 60);
        assert!(DeviceProfile::LOW_END.limits().max_pixel_ratio < DeviceProfile::DESKTOP.limits().max_pixel_ratio);
    }

    #[test]
    fn presets_scale_with_tier() {
        let low = SimulationConfig::for_profile(&DeviceProfile::LOW_END);
        let desktop = SimulationConfig::for_profile(&DeviceProfile::DESKTOP);
        assert!(low.sim_resolution < desktop.sim_resolution);
        assert!(low.dye_resolution < desktop.dye_resolution);
        assert!(!low.shading);
        assert!(desktop.shading);

        let medium = DeviceProfile {
            recommended_quality: Quality::Medium,
            ..DeviceProfile::DESKTOP
        };
        assert_eq!(SimulationConfig::for_profile(&medium).dye_resolution, 512);
    }

    #[test]
    fn resolution_change_detection() {
        let a = SimulationConfig::default();
        let mut b = a.clone();
        b.shading = !b.shading;
        b.curl = 5.0;
        assert!(!a.resolution_changed(&b));
        b.dye_resolution = 256;
        assert!(a.resolution_changed(&b));
    }

    #[test]
    fn sanitize_clamps_out_of_range_values() {
        let mut config = SimulationConfig {
            pressure: 3.0,
            sim_resolution: 0,
            back_color: Rgb::new(2.0, -1.0, 0.5),
            ..Default::default()
        };
        config.sanitize();
        assert_eq!(config.pressure, 1.0);
        assert_eq!(config.sim_resolution, 8);
        assert_eq!(config.back_color, Rgb::new(1.0, 0.0, 0.5));
    }

    #[test]
    fn settings_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILE_NAME);
        let mut config = SimulationConfig::for_tier(DeviceTier::Mobile);
        config.curl = 12.5;
        config.save_to_disk(&path).unwrap();
        let loaded = SimulationConfig::load_from_disk(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: SimulationConfig = serde_json::from_str(r#"{ "curl": 4.0 }"#).unwrap();
        assert_eq!(config.curl, 4.0);
        assert_eq!(config.pressure_iterations, SimulationConfig::default().pressure_iterations);
    }
}
