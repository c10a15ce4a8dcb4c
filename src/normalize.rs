use crate::bitmap::Bitmap;
use crate::config::{ChannelMode, PipelineConfig, DATASET_MEAN, DATASET_STD};

/// One-channel intensities laid out as `[1, 1, height, width]`, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTensor {
    data: Vec<f32>,
    height: usize,
    width: usize,
}

impl NormalizedTensor {
    pub fn new(data: Vec<f32>, height: usize, width: usize) -> Self {
        Self {
            data,
            height,
            width,
        }
    }

    pub fn shape(&self) -> [usize; 4] {
        [1, 1, self.height, self.width]
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalizer {
    pub mean: f32,
    pub std: f32,
    pub channel: ChannelMode,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self {
            mean: DATASET_MEAN,
            std: DATASET_STD,
            channel: ChannelMode::Red,
        }
    }
}

impl From<&PipelineConfig> for Normalizer {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            mean: config.mean,
            std: config.std,
            channel: config.channel,
        }
    }
}

impl Normalizer {
    /// Scales each pixel to `[0, 1]`, subtracts the mean, then divides by the
    /// standard deviation.
    pub fn normalize(&self, bitmap: &Bitmap) -> NormalizedTensor {
        let data = bitmap
            .pixels()
            .map(|pixel| {
                let value = self.intensity(pixel) as f32 / 255.0;
                let value = value - self.mean;
                value / self.std
            })
            .collect();

        NormalizedTensor::new(data, bitmap.height() as usize, bitmap.width() as usize)
    }

    fn intensity(&self, [r, g, b, _]: [u8; 4]) -> u8 {
        match self.channel {
            ChannelMode::Red => r,
            ChannelMode::Luminance => {
                let luma = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
                luma.round().clamp(0.0, 255.0) as u8
            }
        }
    }
}
