use std::fs::{self, File};
use std::path::{Path, PathBuf};

use burn::backend::NdArray;
use burn::module::Module;
use burn::nn;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, RecorderError};
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};

use crate::error::{LoadError, RunError};
use crate::provider::{ModelLocator, ModelProvider, TensorMap, TensorValue};

/// Backend alias (NdArray, f32)
pub type Cpu = NdArray<f32>;

pub const IMAGE_SIZE: usize = 28;
pub const NUM_CLASSES: usize = 10;
pub const INPUT_SHAPE: [usize; 4] = [1, 1, IMAGE_SIZE, IMAGE_SIZE];
pub const OUTPUT_NAME: &str = "output";

const RECORD_EXTENSION: &str = "mpk";

/// CNN digit classifier: conv -> relu -> pool -> flatten -> linear
#[derive(Module, Debug)]
pub struct DigitCnn<B: Backend> {
    conv: nn::conv::Conv2d<B>,
    relu: nn::Relu,
    pool: nn::pool::MaxPool2d,
    fc: nn::Linear<B>,
}

impl<B: Backend> DigitCnn<B> {
    pub fn new(device: &B::Device) -> Self {
        let conv = nn::conv::Conv2dConfig::new([1, 8], [3, 3])
            .with_padding(nn::PaddingConfig2d::Same)
            .init(device);
        let pool = nn::pool::MaxPool2dConfig::new([2, 2])
            .with_strides([2, 2])
            .init();
        let half = IMAGE_SIZE / 2;
        let fc = nn::LinearConfig::new(8 * half * half, NUM_CLASSES).init(device);

        Self {
            conv,
            relu: nn::Relu::new(),
            pool,
            fc,
        }
    }

    /// `[batch, 1, 28, 28]` -> `[batch, 10]` logits
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.conv.forward(x);
        let x = self.relu.forward(x);
        let x = self.pool.forward(x);
        let x = x.flatten(1, 3);
        self.fc.forward(x)
    }

    /// Writes the weights as a named MessagePack record (`.mpk` is appended).
    pub fn save(&self, path: impl Into<PathBuf>) -> Result<(), RecorderError> {
        self.clone().save_file(path.into(), &recorder())
    }

    pub fn load(path: impl Into<PathBuf>, device: &B::Device) -> Result<Self, RecorderError> {
        Self::new(device).load_file(path.into(), &recorder(), device)
    }
}

fn recorder() -> NamedMpkFileRecorder<FullPrecisionSettings> {
    NamedMpkFileRecorder::<FullPrecisionSettings>::new()
}

/// Serves [`DigitCnn`] weights from local record files or URLs.
#[derive(Debug, Clone)]
pub struct BurnModelProvider {
    device: <Cpu as Backend>::Device,
    cache_dir: PathBuf,
    input_name: String,
}

impl BurnModelProvider {
    pub fn new(input_name: impl Into<String>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            device: Default::default(),
            cache_dir: cache_dir.into(),
            input_name: input_name.into(),
        }
    }

    fn resolve(&self, locator: &ModelLocator) -> Result<PathBuf, LoadError> {
        let path = match locator {
            ModelLocator::Path(path) => path.clone(),
            ModelLocator::Url(url) => download_if_needed(url, &self.cache_dir)?,
        };
        if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION) {
            return Err(LoadError::Unsupported(path.display().to_string()));
        }
        if !path.exists() {
            return Err(LoadError::NotFound(path.display().to_string()));
        }
        Ok(path)
    }
}

impl ModelProvider for BurnModelProvider {
    type Handle = DigitCnn<Cpu>;

    fn load(&self, locator: &ModelLocator) -> Result<Self::Handle, LoadError> {
        let path = self.resolve(locator)?;
        log::info!("Loading model from {}", path.display());
        DigitCnn::load(path, &self.device).map_err(|err| LoadError::Decode(err.to_string()))
    }

    fn run(&self, handle: &Self::Handle, mut inputs: TensorMap) -> Result<TensorMap, RunError> {
        let input = inputs
            .remove(&self.input_name)
            .ok_or_else(|| RunError::MissingInput(self.input_name.clone()))?;
        if input.shape != INPUT_SHAPE || input.data.len() != input.num_elements() {
            return Err(RunError::Shape {
                expected: INPUT_SHAPE.to_vec(),
                found: input.shape,
            });
        }

        let x = Tensor::<Cpu, 4>::from_data(TensorData::new(input.data, INPUT_SHAPE), &self.device);
        let logits = handle.forward(x);
        let shape = logits.dims().to_vec();
        let scores = logits
            .into_data()
            .to_vec::<f32>()
            .map_err(|err| RunError::Runtime(format!("{err:?}")))?;

        let mut outputs = TensorMap::new();
        outputs.insert(OUTPUT_NAME.to_string(), TensorValue::new(shape, scores));
        Ok(outputs)
    }
}

/// Fetches `url` into `cache_dir` unless a copy is already there.
fn download_if_needed(url: &str, cache_dir: &Path) -> Result<PathBuf, LoadError> {
    fs::create_dir_all(cache_dir)?;
    let fname = url
        .split(['?', '#'])
        .next()
        .unwrap_or(url)
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or("model.mpk");
    let path = cache_dir.join(fname);

    if path.exists() {
        log::info!("Using cached model {}", path.display());
        return Ok(path);
    }

    log::info!("Downloading {url} ...");
    let fetch = || -> Result<(), LoadError> {
        let mut resp = reqwest::blocking::get(url)
            .and_then(|resp| resp.error_for_status())
            .map_err(|err| LoadError::Download(err.to_string()))?;
        let mut out = File::create(&path)?;
        resp.copy_to(&mut out)
            .map_err(|err| LoadError::Download(err.to_string()))?;
        Ok(())
    };
    if let Err(err) = fetch() {
        let _ = fs::remove_file(&path);
        return Err(err);
    }
    log::info!("Saved to {}", path.display());
    Ok(path)
}
