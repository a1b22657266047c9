//! Annotated frame output.
//!
//! The verdict is burned into a copy of the frame as `LABEL: Yes (0.87)` in
//! the top-left corner, green when present and red otherwise, with any
//! reported detection boxes outlined in the same colour. Frames are written
//! as `frame_{index:06}.jpg`.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::Result;
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::detect::{BoundingBox, Detection, Verdict};
use crate::error::SurveyError;
use crate::frame::Frame;

const JPEG_QUALITY: u8 = 95;
const PRESENT_RGB: [u8; 3] = [0, 255, 0];
const ABSENT_RGB: [u8; 3] = [255, 0, 0];
const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;
const TEXT_ORIGIN: (u32, u32) = (10, 10);
const BOX_THICKNESS: u32 = 2;

/// File name for a saved frame.
pub fn frame_file_name(index: u64) -> String {
    format!("frame_{:06}.jpg", index)
}

/// Overlay text for a verdict.
pub fn verdict_text(label: &str, verdict: &Verdict) -> String {
    format!(
        "{}: {} ({:.2})",
        label,
        if verdict.present { "Yes" } else { "No" },
        verdict.confidence
    )
}

/// Render an annotated copy of `frame`.
pub fn annotate(
    frame: &Frame,
    label: &str,
    verdict: &Verdict,
    detections: &[Detection],
) -> Result<RgbImage> {
    let mut image = frame.to_rgb_image()?;
    let color = if verdict.present {
        PRESENT_RGB
    } else {
        ABSENT_RGB
    };
    for bbox in detections.iter().filter_map(|d| d.bbox.as_ref()) {
        draw_box(&mut image, bbox, color);
    }
    let scale = (frame.height / 160).clamp(1, 4);
    draw_text(
        &mut image,
        &verdict_text(label, verdict),
        TEXT_ORIGIN,
        scale,
        color,
    );
    Ok(image)
}

/// Writes annotated frames into one directory.
pub struct FrameSaver {
    dir: PathBuf,
    label: String,
    dir_ready: bool,
}

impl FrameSaver {
    pub fn new(dir: impl Into<PathBuf>, label: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            label: label.into(),
            dir_ready: false,
        }
    }

    /// Annotate and persist one frame, returning the written path.
    pub fn save(
        &mut self,
        index: u64,
        frame: &Frame,
        verdict: &Verdict,
        detections: &[Detection],
    ) -> crate::Result<PathBuf> {
        let path = self.dir.join(frame_file_name(index));
        let persistence = |reason: String| SurveyError::Persistence {
            path: path.clone(),
            reason,
        };

        if !self.dir_ready {
            fs::create_dir_all(&self.dir).map_err(|e| persistence(e.to_string()))?;
            self.dir_ready = true;
        }

        let image = annotate(frame, &self.label, verdict, detections)
            .map_err(|e| persistence(e.to_string()))?;
        let file = File::create(&path).map_err(|e| persistence(e.to_string()))?;
        let mut writer = BufWriter::new(file);
        JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY)
            .encode_image(&image)
            .map_err(|e| persistence(e.to_string()))?;
        writer.flush().map_err(|e| persistence(e.to_string()))?;
        Ok(path)
    }
}

fn draw_box(image: &mut RgbImage, bbox: &BoundingBox, color: [u8; 3]) {
    let fw = image.width() as f32;
    let fh = image.height() as f32;
    let x1 = (bbox.x * fw).clamp(0.0, fw - 1.0) as u32;
    let y1 = (bbox.y * fh).clamp(0.0, fh - 1.0) as u32;
    let x2 = ((bbox.x + bbox.w) * fw).clamp(0.0, fw - 1.0) as u32;
    let y2 = ((bbox.y + bbox.h) * fh).clamp(0.0, fh - 1.0) as u32;
    if x1 >= x2 || y1 >= y2 {
        return;
    }

    // each pass is one pixel further in; stop once the ring would vanish
    for t in 0..BOX_THICKNESS {
        let (Some(w), Some(h)) = (
            (x2 - x1 + 1).checked_sub(2 * t),
            (y2 - y1 + 1).checked_sub(2 * t),
        ) else {
            break;
        };
        if w == 0 || h == 0 {
            break;
        }
        let rect = Rect::at((x1 + t) as i32, (y1 + t) as i32).of_size(w, h);
        draw_hollow_rect_mut(image, rect, Rgb(color));
    }
}

fn draw_text(image: &mut RgbImage, text: &str, origin: (u32, u32), scale: u32, color: [u8; 3]) {
    let advance = (GLYPH_WIDTH + 1) * scale;
    let mut cursor_x = origin.0;
    for ch in text.chars() {
        if cursor_x >= image.width() {
            break;
        }
        if let Some(rows) = glyph(ch.to_ascii_uppercase()) {
            for (row, bits) in rows.iter().enumerate() {
                for col in 0..GLYPH_WIDTH {
                    if (bits >> (GLYPH_WIDTH - 1 - col)) & 1 == 0 {
                        continue;
                    }
                    for dy in 0..scale {
                        for dx in 0..scale {
                            let x = cursor_x + col * scale + dx;
                            let y = origin.1 + row as u32 * scale + dy;
                            if let Some(px) = image.get_pixel_mut_checked(x, y) {
                                *px = Rgb(color);
                            }
                        }
                    }
                }
            }
        }
        cursor_x += advance;
    }
}

/// 5x7 bitmap glyphs, one byte per row, low five bits used.
fn glyph(ch: char) -> Option<[u8; GLYPH_HEIGHT as usize]> {
    let rows = match ch {
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1E],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        '(' => [0x02, 0x04, 0x08, 0x08, 0x08, 0x04, 0x02],
        ')' => [0x08, 0x04, 0x02, 0x02, 0x02, 0x04, 0x08],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        '_' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1F],
        '/' => [0x00, 0x01, 0x02, 0x04, 0x08, 0x10, 0x00],
        ' ' => [0x00; 7],
        _ => return None,
    };
    Some(rows)
}
