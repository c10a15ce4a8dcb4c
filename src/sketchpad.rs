//! Headless drawing surface.
//!
//! Mirrors a canvas painted black with white, round-capped strokes. Pointer
//! handling lives with whoever owns the pad; the pad only records where the pen
//! goes and rasterizes each segment.

use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::bitmap::Bitmap;
use crate::error::{PipelineError, Result};

pub const BACKGROUND: [u8; 4] = [0, 0, 0, 255];
pub const INK: [u8; 4] = [255, 255, 255, 255];
pub const DEFAULT_PEN_WIDTH: f32 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DrawingState {
    Idle,
    Drawing { last: (f32, f32) },
}

#[derive(Debug, Clone)]
pub struct Sketchpad {
    canvas: RgbaImage,
    pen_width: f32,
    state: DrawingState,
}

impl Sketchpad {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        Self::with_pen_width(width, height, DEFAULT_PEN_WIDTH)
    }

    pub fn with_pen_width(width: u32, height: u32, pen_width: f32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(PipelineError::Sketch(format!(
                "canvas must be non-empty, got {width}x{height}"
            )));
        }
        if !(pen_width.is_finite() && pen_width > 0.0) {
            return Err(PipelineError::Sketch(format!(
                "pen width must be positive, got {pen_width}"
            )));
        }
        Ok(Self {
            canvas: RgbaImage::from_pixel(width, height, Rgba(BACKGROUND)),
            pen_width,
            state: DrawingState::Idle,
        })
    }

    pub fn state(&self) -> DrawingState {
        self.state
    }

    pub fn pen_down(&mut self, x: f32, y: f32) {
        self.state = DrawingState::Drawing { last: (x, y) };
    }

    /// Strokes from the previous pen position; a no-op while the pen is up.
    pub fn pen_move(&mut self, x: f32, y: f32) {
        if let DrawingState::Drawing { last } = self.state {
            self.segment(last, (x, y));
            self.state = DrawingState::Drawing { last: (x, y) };
        }
    }

    pub fn pen_up(&mut self) {
        self.state = DrawingState::Idle;
    }

    pub fn stroke(&mut self, points: &[(f32, f32)]) {
        let Some((&(x, y), rest)) = points.split_first() else {
            return;
        };
        self.pen_down(x, y);
        for &(x, y) in rest {
            self.pen_move(x, y);
        }
        self.pen_up();
    }

    pub fn clear(&mut self) {
        for p in self.canvas.pixels_mut() {
            *p = Rgba(BACKGROUND);
        }
    }

    pub fn snapshot(&self) -> Bitmap {
        Bitmap::from(self.canvas.clone())
    }

    /// Paints every pixel whose center lies within half a pen width of the
    /// segment, which yields round caps at both ends.
    fn segment(&mut self, from: (f32, f32), to: (f32, f32)) {
        let radius = self.pen_width / 2.0;
        let (w, h) = (self.canvas.width() as f32, self.canvas.height() as f32);

        let min_x = (from.0.min(to.0) - radius).floor().max(0.0);
        let max_x = (from.0.max(to.0) + radius).ceil().min(w - 1.0);
        let min_y = (from.1.min(to.1) - radius).floor().max(0.0);
        let max_y = (from.1.max(to.1) + radius).ceil().min(h - 1.0);
        if min_x > max_x || min_y > max_y {
            return;
        }

        for y in min_y as u32..=max_y as u32 {
            for x in min_x as u32..=max_x as u32 {
                let center = (x as f32 + 0.5, y as f32 + 0.5);
                if distance_to_segment(center, from, to) <= radius {
                    self.canvas.put_pixel(x, y, Rgba(INK));
                }
            }
        }
    }
}

fn distance_to_segment(p: (f32, f32), a: (f32, f32), b: (f32, f32)) -> f32 {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq == 0.0 {
        0.0
    } else {
        (((p.0 - a.0) * dx + (p.1 - a.1) * dy) / len_sq).clamp(0.0, 1.0)
    };
    let (cx, cy) = (a.0 + t * dx, a.1 + t * dy);
    ((p.0 - cx).powi(2) + (p.1 - cy).powi(2)).sqrt()
}

/// A recorded drawing: canvas size plus the pen path of each stroke.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sketch {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub pen_width: Option<f32>,
    pub strokes: Vec<Vec<[f32; 2]>>,
}

impl Sketch {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|err| PipelineError::Sketch(err.to_string()))
    }

    pub fn replay(&self) -> Result<Sketchpad> {
        let mut pad = Sketchpad::with_pen_width(
            self.width,
            self.height,
            self.pen_width.unwrap_or(DEFAULT_PEN_WIDTH),
        )?;
        for stroke in &self.strokes {
            let points: Vec<(f32, f32)> = stroke.iter().map(|&[x, y]| (x, y)).collect();
            pad.stroke(&points);
        }
        log::debug!(
            "replayed {} strokes on a {}x{} pad",
            self.strokes.len(),
            self.width,
            self.height
        );
        Ok(pad)
    }
}
