//! Captured image frames.

use serde_json::{Map, Value};
use uuid::Uuid;

/// Open string-keyed metadata attached to a frame.
pub type Metadata = Map<String, Value>;

/// Metadata key holding the bridge's receipt time, in epoch seconds.
pub const CAPTURE_EPOCH_KEY: &str = "capture_epoch";

/// A decoded image: `height` rows of `width` pixels, each with `channels`
/// interleaved 8-bit samples.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelGrid {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub data: Vec<u8>,
}

impl PixelGrid {
    /// Wrap raw interleaved samples.  Returns `None` when `data` does not
    /// hold exactly `width * height * channels` samples.
    pub fn new(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Option<Self> {
        let expected = width as usize * height as usize * channels as usize;
        (channels > 0 && data.len() == expected).then_some(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// `(rows, cols)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.height as usize, self.width as usize)
    }

    /// Sample at column `x`, row `y`, channel `c`.
    pub fn get(&self, x: u32, y: u32, c: u8) -> Option<u8> {
        if x >= self.width || y >= self.height || c >= self.channels {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * self.channels as usize
            + c as usize;
        self.data.get(idx).copied()
    }

    /// Collapse channels to one by taking the arithmetic mean of every
    /// channel of each pixel (alpha included).
    pub fn channel_mean(&self) -> IntensityGrid {
        let channels = self.channels.max(1) as usize;
        let data = self
            .data
            .chunks_exact(channels)
            .map(|px| px.iter().map(|&v| f32::from(v)).sum::<f32>() / channels as f32)
            .collect();
        IntensityGrid {
            width: self.width,
            height: self.height,
            data,
        }
    }
}

/// A single-channel image in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct IntensityGrid {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl IntensityGrid {
    /// `(rows, cols)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.height as usize, self.width as usize)
    }

    pub fn get(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// Mean over all pixels; `0.0` for an empty grid.
    pub fn mean(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().sum::<f32>() / self.data.len() as f32
    }
}

/// A frame accepted by the capture endpoint and waiting for the consumer.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// Correlates the ingestion and consumption log lines of one frame.
    pub id: Uuid,
    pub pixels: PixelGrid,
    /// Always contains [`CAPTURE_EPOCH_KEY`].
    pub metadata: Metadata,
}

impl CapturedFrame {
    /// Build a frame and stamp `capture_epoch` with the receipt time,
    /// replacing any sender-supplied value.
    pub fn new(pixels: PixelGrid, mut metadata: Metadata, capture_epoch: f64) -> Self {
        metadata.insert(CAPTURE_EPOCH_KEY.to_string(), Value::from(capture_epoch));
        Self {
            id: Uuid::new_v4(),
            pixels,
            metadata,
        }
    }

    /// Receipt time recorded by the bridge.
    pub fn capture_epoch(&self) -> Option<f64> {
        self.metadata.get(CAPTURE_EPOCH_KEY).and_then(Value::as_f64)
    }

    /// Reduce to the consumer's `(single-channel pixels, metadata)` shape.
    pub fn into_reduced(self) -> (IntensityGrid, Metadata) {
        let reduced = if self.pixels.channels == 1 {
            IntensityGrid {
                width: self.pixels.width,
                height: self.pixels.height,
                data: self.pixels.data.iter().map(|&v| f32::from(v)).collect(),
            }
        } else {
            self.pixels.channel_mean()
        };
        (reduced, self.metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pixel_grid_rejects_wrong_length() {
        assert!(PixelGrid::new(2, 2, 3, vec![0; 11]).is_none());
        assert!(PixelGrid::new(2, 2, 0, vec![]).is_none());
        assert!(PixelGrid::new(2, 2, 3, vec![0; 12]).is_some());
    }

    #[test]
    fn channel_mean_averages_every_channel() {
        // 2×1 RGB: (30, 60, 90) and (255, 0, 0)
        let grid = PixelGrid::new(2, 1, 3, vec![30, 60, 90, 255, 0, 0]).unwrap();
        let reduced = grid.channel_mean();
        assert_eq!(reduced.shape(), (1, 2));
        assert!((reduced.get(0, 0).unwrap() - 60.0).abs() < 1e-5);
        assert!((reduced.get(1, 0).unwrap() - 85.0).abs() < 1e-5);
    }

    #[test]
    fn channel_mean_includes_alpha() {
        let grid = PixelGrid::new(1, 1, 4, vec![0, 0, 0, 255]).unwrap();
        assert!((grid.channel_mean().data[0] - 63.75).abs() < 1e-5);
    }

    #[test]
    fn get_is_row_major() {
        let grid = PixelGrid::new(3, 2, 1, vec![0, 1, 2, 3, 4, 5]).unwrap();
        assert_eq!(grid.get(2, 1, 0), Some(5));
        assert_eq!(grid.get(0, 1, 0), Some(3));
        assert_eq!(grid.get(3, 0, 0), None);
        assert_eq!(grid.shape(), (2, 3));
    }

    #[test]
    fn capture_epoch_overrides_sender_value() {
        let mut meta = Metadata::new();
        meta.insert(CAPTURE_EPOCH_KEY.into(), json!(1.0));
        meta.insert("probe".into(), json!("ultrasound"));
        let grid = PixelGrid::new(1, 1, 1, vec![7]).unwrap();
        let frame = CapturedFrame::new(grid, meta, 1234.5);
        assert_eq!(frame.capture_epoch(), Some(1234.5));
        assert_eq!(frame.metadata["probe"], json!("ultrasound"));
    }

    #[test]
    fn into_reduced_passes_single_channel_through() {
        let grid = PixelGrid::new(2, 1, 1, vec![10, 20]).unwrap();
        let (reduced, meta) = CapturedFrame::new(grid, Metadata::new(), 1.0).into_reduced();
        assert_eq!(reduced.data, vec![10.0, 20.0]);
        assert!(meta.contains_key(CAPTURE_EPOCH_KEY));
    }
}
