//! Hand-drawn digit recognition: snapshot a sketch, resample it to 28x28,
//! normalize it to the training statistics and classify it with a CNN.

pub mod bitmap;
pub mod classify;
pub mod config;
pub mod error;
pub mod evaluate;
pub mod mnist;
pub mod model;
pub mod normalize;
pub mod provider;
pub mod resample;
pub mod session;
pub mod sketchpad;

pub use bitmap::Bitmap;
pub use classify::{argmax, classify, ClassificationResult};
pub use config::{ChannelMode, PipelineConfig, ResampleFilter};
pub use error::{LoadError, PipelineError, RunError};
pub use model::{BurnModelProvider, DigitCnn};
pub use normalize::{NormalizedTensor, Normalizer};
pub use provider::{ModelLocator, ModelProvider, TensorMap, TensorValue};
pub use resample::resample;
pub use session::{Outcome, Prediction, Session};
pub use sketchpad::{Sketch, Sketchpad};
