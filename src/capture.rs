// fluid-cursor - GPU fluid simulation cursor effect
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

use std::path::{Path, PathBuf};

use image::RgbaImage;

/// An 8-bit RGBA still of the composited dye field, top row first.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl CapturedFrame {
    /// Converts texels in rows of increasing `v` (bottom row first) into
    /// clamped 8-bit pixels with the top row first.
    pub fn from_texels(width: u32, height: u32, texels: &[[f32; 4]]) -> Self {
        let width_px = width as usize;
        let mut pixels = Vec::with_capacity(width_px * height as usize * 4);
        for row in (0..height as usize).rev() {
            for texel in &texels[row * width_px..(row + 1) * width_px] {
                for channel in texel {
                    pixels.push((channel.clamp(0.0, 1.0) * 255.0) as u8);
                }
            }
        }
        Self { width, height, pixels }
    }

    pub fn to_image(&self) -> Option<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.pixels.clone())
    }

    pub fn save_png(&self, path: &Path) -> anyhow::Result<()> {
        let image = self
            .to_image()
            .ok_or_else(|| anyhow::anyhow!("capture buffer does not match {}x{}", self.width, self.height))?;
        image.save_with_format(path, image::ImageFormat::Png)?;
        Ok(())
    }
}

pub fn capture_file_name(time: chrono::DateTime<chrono::Local>) -> String {
    format!("fluid_capture_{}.png", time.format("%Y%m%d_%H%M%S"))
}

/// Writes `frame` into `dir` under a timestamped name and returns the path.
pub fn save_capture(frame: &CapturedFrame, dir: &Path) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(capture_file_name(chrono::Local::now()));
    frame.save_png(&path)?;
    log::info!("Saved capture {}x{} to {}", frame.width, frame.height, path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn rows_are_flipped_and_clamped() {
        // bottom row red, top row over-bright green
        let texels = vec![
            [1.0, 0.0, 0.0, 1.0],
            [1.0, 0.0, 0.0, 1.0],
            [0.0, 2.0, 0.0, 1.0],
            [0.0, 2.0, -1.0, 0.5],
        ];
        let frame = CapturedFrame::from_texels(2, 2, &texels);
        assert_eq!(&frame.pixels[0..4], &[0, 255, 0, 255]);
        assert_eq!(&frame.pixels[4..8], &[0, 255, 0, 127]);
        assert_eq!(&frame.pixels[8..12], &[255, 0, 0, 255]);
    }

    #[test]
    fn file_names_carry_the_timestamp() {
        let time = chrono::Local.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(capture_file_name(time), "fluid_capture_20250304_050607.png");
    }

    #[test]
    fn png_is_written_and_readable() {
        let dir = tempfile::tempdir().unwrap();
        let frame = CapturedFrame::from_texels(3, 2, &[[0.5, 0.25, 1.0, 1.0]; 6]);
        let path = save_capture(&frame, dir.path()).unwrap();
        let decoded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (3, 2));
        assert_eq!(decoded.get_pixel(0, 0).0, [127, 63, 255, 255]);
    }
}
