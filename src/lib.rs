// fluid-cursor - GPU fluid simulation cursor effect
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

//! Interactive fluid simulation drawn behind a pointer.
//!
//! [`FluidContext`] owns the GPU fields and runs one stable-fluids step per
//! call; [`FrameDriver`] wraps it with the frame-rate cap, idle animation and
//! pointer bookkeeping a host needs.

pub mod capture;
pub mod color;
pub mod config;
pub mod driver;
pub mod gpu;
pub mod pointer;
pub mod shaders;
pub mod solver;
pub mod targets;

pub use capture::{save_capture, CapturedFrame};
pub use color::Rgb;
pub use config::{DeviceProfile, DeviceTier, Quality, SimulationConfig, TierLimits};
pub use driver::{FrameDriver, FrameOutcome, InitStatus, IDLE_GRACE, MOUNT_DELAY};
pub use gpu::{Backend, SoftwareBackend, WgpuBackend};
pub use pointer::{PointerTracker, MOUSE_POINTER_ID};
pub use solver::{FluidContext, InitError};
