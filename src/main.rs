// fluid-cursor - GPU fluid simulation cursor effect
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

use std::{path::PathBuf, sync::Arc, time::Instant};

use fluid_cursor::{
    save_capture, DeviceProfile, FrameDriver, InitStatus, SimulationConfig, WgpuBackend, MOUNT_DELAY,
    MOUSE_POINTER_ID,
};
use winit::{
    event::{ElementState, Event, KeyEvent, MouseButton, TouchPhase, WindowEvent},
    event_loop::EventLoop,
    keyboard::{KeyCode, PhysicalKey},
};

const CAPTURE_DIR: &str = "captures";

fn load_config(profile: &DeviceProfile) -> SimulationConfig {
    let path = SimulationConfig::default_path();
    if !path.exists() {
        return SimulationConfig::for_profile(profile);
    }
    match SimulationConfig::load_from_disk(&path) {
        Ok(config) => {
            log::info!("Loaded settings from {}", path.display());
            config
        }
        Err(err) => {
            log::warn!("Ignoring {}: {:?}", path.display(), err);
            SimulationConfig::for_profile(profile)
        }
    }
}

fn main() -> anyhow::Result<()> {
    use env_logger::Env;
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let profile = DeviceProfile::from_env().unwrap_or(DeviceProfile::DESKTOP);
    let config = load_config(&profile);
    let transparent = config.transparent;

    let event_loop = EventLoop::new()?;
    let window = Arc::new(
        event_loop.create_window(
            winit::window::WindowAttributes::default()
                .with_title("Fluid Cursor")
                .with_transparent(transparent)
                .with_inner_size(winit::dpi::LogicalSize::new(1280, 720)),
        )?,
    );

    std::thread::sleep(MOUNT_DELAY);
    let backend = pollster::block_on(WgpuBackend::new(window.clone(), transparent))?;
    let mut driver = FrameDriver::new(backend, &profile, config, Instant::now());
    match driver.status() {
        InitStatus::Ready => log::info!("Fluid simulation ready"),
        InitStatus::Unsupported => log::warn!("Platform cannot run the fluid simulation"),
        InitStatus::Error(message) => log::error!("Fluid simulation failed: {}", message),
    }

    let mut cursor = (0.0f32, 0.0f32);
    let capture_dir = PathBuf::from(CAPTURE_DIR);

    event_loop.run(move |event, target| match event {
        Event::WindowEvent { event, window_id } if window_id == window.id() => {
            let scale = window.scale_factor() as f32;
            match event {
                WindowEvent::CloseRequested => {
                    driver.shutdown();
                    target.exit();
                }
                WindowEvent::CursorMoved { position, .. } => {
                    // physical to logical
                    cursor = (position.x as f32 / scale, position.y as f32 / scale);
                    driver.pointer_move(MOUSE_POINTER_ID, cursor.0, cursor.1, scale);
                }
                WindowEvent::MouseInput {
                    state: button_state,
                    button: MouseButton::Left,
                    ..
                } => match button_state {
                    ElementState::Pressed => driver.pointer_down(MOUSE_POINTER_ID, cursor.0, cursor.1, scale),
                    ElementState::Released => driver.pointer_up(MOUSE_POINTER_ID),
                },
                WindowEvent::Touch(touch) => {
                    let id = touch.id as i64;
                    let x = touch.location.x as f32 / scale;
                    let y = touch.location.y as f32 / scale;
                    match touch.phase {
                        TouchPhase::Started => driver.pointer_down(id, x, y, scale),
                        TouchPhase::Moved => driver.pointer_move(id, x, y, scale),
                        TouchPhase::Ended | TouchPhase::Cancelled => driver.pointer_up(id),
                    }
                }
                WindowEvent::KeyboardInput {
                    event:
                        KeyEvent {
                            physical_key,
                            state: ElementState::Pressed,
                            repeat: false,
                            ..
                        },
                    ..
                } => match physical_key {
                    PhysicalKey::Code(KeyCode::KeyP) => {
                        if let Some(frame) = driver.capture() {
                            if let Err(err) = save_capture(&frame, &capture_dir) {
                                log::error!("Failed to save capture: {:?}", err);
                            }
                        }
                    }
                    PhysicalKey::Code(KeyCode::KeyS) => {
                        if let Some(context) = driver.context() {
                            let path = SimulationConfig::default_path();
                            match context.config().save_to_disk(&path) {
                                Ok(()) => log::info!("Saved settings to {}", path.display()),
                                Err(err) => log::error!("Failed to save settings: {:?}", err),
                            }
                        }
                    }
                    PhysicalKey::Code(KeyCode::Escape) => {
                        driver.shutdown();
                        target.exit();
                    }
                    _ => {}
                },
                WindowEvent::RedrawRequested => {
                    let size = window.inner_size();
                    let logical = (size.width as f32 / scale, size.height as f32 / scale);
                    driver.frame(Instant::now(), logical, scale);
                }
                _ => {}
            }
        }
        Event::AboutToWait => {
            if driver.is_active() {
                window.request_redraw();
            }
        }
        _ => {}
    })?;

    Ok(())
}
