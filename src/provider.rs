use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::error::{LoadError, RunError};
use crate::normalize::NormalizedTensor;

/// A dense f32 tensor passed to or returned from a model.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorValue {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl TensorValue {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Self {
        Self { shape, data }
    }

    pub fn num_elements(&self) -> usize {
        self.shape.iter().product()
    }
}

impl From<NormalizedTensor> for TensorValue {
    fn from(tensor: NormalizedTensor) -> Self {
        let shape = tensor.shape().to_vec();
        Self::new(shape, tensor.into_vec())
    }
}

/// Named model inputs or outputs.
pub type TensorMap = BTreeMap<String, TensorValue>;

/// Where a model resource lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelLocator {
    Path(PathBuf),
    Url(String),
}

impl ModelLocator {
    pub fn parse(locator: &str) -> Self {
        if locator.starts_with("http://") || locator.starts_with("https://") {
            ModelLocator::Url(locator.to_string())
        } else {
            ModelLocator::Path(PathBuf::from(locator))
        }
    }
}

impl fmt::Display for ModelLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelLocator::Path(path) => write!(f, "{}", path.display()),
            ModelLocator::Url(url) => f.write_str(url),
        }
    }
}

impl From<&str> for ModelLocator {
    fn from(locator: &str) -> Self {
        Self::parse(locator)
    }
}

/// Loads models and runs them on named tensors.
///
/// `run` must only be called with a handle returned by a successful `load`.
pub trait ModelProvider {
    type Handle;

    fn load(&self, locator: &ModelLocator) -> Result<Self::Handle, LoadError>;

    fn run(&self, handle: &Self::Handle, inputs: TensorMap) -> Result<TensorMap, RunError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locators_split_on_scheme() {
        assert_eq!(
            ModelLocator::parse("https://example.com/model.mpk"),
            ModelLocator::Url("https://example.com/model.mpk".into())
        );
        assert_eq!(
            ModelLocator::parse("./model/model.mpk"),
            ModelLocator::Path(PathBuf::from("./model/model.mpk"))
        );
        assert_eq!(ModelLocator::from("model.mpk").to_string(), "model.mpk");
    }

    #[test]
    fn normalized_tensor_keeps_logical_shape() {
        let value = TensorValue::from(NormalizedTensor::new(vec![0.0; 784], 28, 28));
        assert_eq!(value.shape, vec![1, 1, 28, 28]);
        assert_eq!(value.num_elements(), value.data.len());
    }
}
