use burn::config::Config;
use image::imageops::FilterType;

/// Mean of the training set intensities, after scaling to `[0, 1]`.
pub const DATASET_MEAN: f32 = 0.1309;
/// Standard deviation of the training set intensities, after scaling to `[0, 1]`.
pub const DATASET_STD: f32 = 0.3018;

/// Which channel(s) feed the normalizer.
#[derive(Config, Debug, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    /// Red channel only; correct for the grayscale drawings the pad produces.
    Red,
    /// Rec. 601 luma, robust to colored input.
    Luminance,
}

#[derive(Config, Debug, Copy, PartialEq, Eq)]
pub enum ResampleFilter {
    Nearest,
    Triangle,
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl From<ResampleFilter> for FilterType {
    fn from(filter: ResampleFilter) -> Self {
        match filter {
            ResampleFilter::Nearest => FilterType::Nearest,
            ResampleFilter::Triangle => FilterType::Triangle,
            ResampleFilter::CatmullRom => FilterType::CatmullRom,
            ResampleFilter::Gaussian => FilterType::Gaussian,
            ResampleFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

#[derive(Config, Debug)]
pub struct PipelineConfig {
    #[config(default = 28)]
    pub width: u32,
    #[config(default = 28)]
    pub height: u32,
    #[config(default = "DATASET_MEAN")]
    pub mean: f32,
    #[config(default = "DATASET_STD")]
    pub std: f32,
    #[config(default = 10)]
    pub num_classes: usize,
    #[config(default = "String::from(\"input\")")]
    pub input_name: String,
    /// Output tensor to read; the first output is used when unset.
    pub output_name: Option<String>,
    #[config(default = "ChannelMode::Red")]
    pub channel: ChannelMode,
    #[config(default = "ResampleFilter::Triangle")]
    pub filter: ResampleFilter,
    /// Invert drawings with a light background before resampling.
    #[config(default = false)]
    pub auto_invert: bool,
    /// Where models fetched from a URL are stored.
    #[config(default = "String::from(\"model_cache\")")]
    pub cache_dir: String,
}
