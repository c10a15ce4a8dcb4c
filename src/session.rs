use std::fmt;

use crate::bitmap::Bitmap;
use crate::classify::{classify, ClassificationResult, ModelIo};
use crate::config::{ChannelMode, PipelineConfig};
use crate::error::Result;
use crate::normalize::Normalizer;
use crate::provider::{ModelLocator, ModelProvider};
use crate::resample::resample;

/// A successful prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: usize,
    pub result: ClassificationResult,
}

/// What the presentation layer shows for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Digit(usize),
    Failed,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Digit(label) => write!(f, "Prediction: {label}"),
            Outcome::Failed => f.write_str("Error during prediction. Check the log for details."),
        }
    }
}

/// Owns a model provider and, once loaded, its model handle.
///
/// Predictions take `&mut self`, so a session serves one request at a time.
/// A failed load is not remembered: the next prediction tries again.
pub struct Session<P: ModelProvider> {
    provider: P,
    locator: ModelLocator,
    config: PipelineConfig,
    handle: Option<P::Handle>,
}

impl<P: ModelProvider> Session<P> {
    pub fn new(provider: P, locator: ModelLocator, config: PipelineConfig) -> Self {
        Self {
            provider,
            locator,
            config,
            handle: None,
        }
    }

    /// Like [`Session::new`], but loads the model immediately.
    pub fn open(provider: P, locator: ModelLocator, config: PipelineConfig) -> Result<Self> {
        let mut session = Self::new(provider, locator, config);
        session.ensure_loaded()?;
        Ok(session)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn is_loaded(&self) -> bool {
        self.handle.is_some()
    }

    fn ensure_loaded(&mut self) -> Result<&P::Handle> {
        load_once(&self.provider, &self.locator, &mut self.handle)
    }

    pub fn predict(&mut self, snapshot: &Bitmap) -> Result<Prediction> {
        let config = &self.config;
        let inverted;
        let source = if config.auto_invert && snapshot.is_light_background() {
            log::debug!("light background detected, inverting");
            inverted = snapshot.inverted();
            &inverted
        } else {
            snapshot
        };

        let resized = resample(source, config.width, config.height, config.filter)?;
        if config.channel == ChannelMode::Red && !resized.is_grayscale() {
            log::warn!("bitmap is not grayscale; only the red channel is used");
        }
        let tensor = Normalizer::from(config).normalize(&resized);

        let io = ModelIo {
            input_name: &config.input_name,
            output_name: config.output_name.as_deref(),
            num_classes: config.num_classes,
        };

        let handle = load_once(&self.provider, &self.locator, &mut self.handle)?;
        let result = classify(&self.provider, handle, &tensor, &io)?;
        log::info!("Predicted digit {}", result.label);
        log::debug!("probabilities {:?}", result.probabilities());

        Ok(Prediction {
            label: result.label,
            result,
        })
    }

    /// Runs a prediction, logging any failure and collapsing it into
    /// [`Outcome::Failed`].
    pub fn predict_outcome(&mut self, snapshot: &Bitmap) -> Outcome {
        match self.predict(snapshot) {
            Ok(prediction) => Outcome::Digit(prediction.label),
            Err(err) => {
                log::error!("Error during inference: {err}");
                Outcome::Failed
            }
        }
    }
}

fn load_once<'a, P: ModelProvider>(
    provider: &P,
    locator: &ModelLocator,
    slot: &'a mut Option<P::Handle>,
) -> Result<&'a P::Handle> {
    let handle = match slot.take() {
        Some(handle) => handle,
        None => {
            let handle = provider.load(locator)?;
            log::info!("Model ready: {locator}");
            handle
        }
    };
    Ok(slot.insert(handle))
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;
    use crate::error::{LoadError, PipelineError, RunError};
    use crate::provider::{TensorMap, TensorValue};
    use crate::sketchpad::Sketchpad;

    /// Fails the first `failures` loads, then returns fixed scores and records
    /// the inputs it sees.
    struct Stub {
        failures: Cell<usize>,
        loads: Cell<usize>,
        scores: Vec<f32>,
        seen: RefCell<Vec<TensorValue>>,
    }

    impl Stub {
        fn new(failures: usize, scores: Vec<f32>) -> Self {
            Self {
                failures: Cell::new(failures),
                loads: Cell::new(0),
                scores,
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl ModelProvider for Stub {
        type Handle = ();

        fn load(&self, locator: &ModelLocator) -> Result<(), LoadError> {
            self.loads.set(self.loads.get() + 1);
            if self.failures.get() > 0 {
                self.failures.set(self.failures.get() - 1);
                return Err(LoadError::NotFound(locator.to_string()));
            }
            Ok(())
        }

        fn run(&self, _handle: &(), mut inputs: TensorMap) -> Result<TensorMap, RunError> {
            let input = inputs
                .remove("input")
                .ok_or_else(|| RunError::MissingInput("input".into()))?;
            self.seen.borrow_mut().push(input);
            let mut outputs = TensorMap::new();
            outputs.insert(
                "output".into(),
                TensorValue::new(vec![1, self.scores.len()], self.scores.clone()),
            );
            Ok(outputs)
        }
    }

    fn one_hot(index: usize) -> Vec<f32> {
        let mut scores = vec![0.0; 10];
        scores[index] = 1.0;
        scores
    }

    fn session(stub: Stub) -> Session<Stub> {
        Session::new(stub, ModelLocator::parse("model/model.mpk"), PipelineConfig::new())
    }

    #[test]
    fn black_canvas_reaches_classifier_normalized() {
        let mut session = session(Stub::new(0, one_hot(2)));
        let snapshot = Bitmap::filled(28, 28, [0, 0, 0, 255]);

        let prediction = session.predict(&snapshot).unwrap();
        assert_eq!(prediction.label, 2);

        let seen = session.provider.seen.borrow();
        assert_eq!(seen[0].shape, vec![1, 1, 28, 28]);
        assert!(seen[0].data.iter().all(|v| (v + 0.4337).abs() < 1e-4));
    }

    #[test]
    fn large_drawings_are_resampled() {
        let mut pad = Sketchpad::new(400, 400).unwrap();
        pad.stroke(&[(200.0, 40.0), (200.0, 360.0)]);
        let mut session = session(Stub::new(0, one_hot(1)));

        assert_eq!(session.predict_outcome(&pad.snapshot()), Outcome::Digit(1));
        let seen = session.provider.seen.borrow();
        assert_eq!(seen[0].data.len(), 784);
        // Column 14 carries the stroke, column 0 is background.
        let row = 14 * 28;
        assert!(seen[0].data[row + 14] > seen[0].data[row]);
    }

    #[test]
    fn load_failure_is_a_failed_outcome_and_retried() {
        let mut session = session(Stub::new(1, one_hot(3)));
        let snapshot = Bitmap::filled(28, 28, [0, 0, 0, 255]);

        let err = session.predict(&snapshot).unwrap_err();
        assert!(matches!(err, PipelineError::ModelUnavailable(_)));
        assert!(!session.is_loaded());

        assert_eq!(session.predict_outcome(&snapshot), Outcome::Digit(3));
        assert_eq!(session.provider.loads.get(), 2);

        // Loaded once, reused afterwards.
        session.predict(&snapshot).unwrap();
        assert_eq!(session.provider.loads.get(), 2);
    }

    #[test]
    fn failure_never_yields_a_label() {
        let mut session = session(Stub::new(usize::MAX, one_hot(0)));
        let outcome = session.predict_outcome(&Bitmap::filled(50, 50, [0, 0, 0, 255]));
        assert_eq!(outcome, Outcome::Failed);
        assert_eq!(
            outcome.to_string(),
            "Error during prediction. Check the log for details."
        );
    }

    #[test]
    fn invalid_dimensions_abort_before_loading() {
        let stub = Stub::new(0, one_hot(0));
        let config = PipelineConfig::new().with_width(0);
        let mut session = Session::new(stub, ModelLocator::parse("m.mpk"), config);

        let err = session.predict(&Bitmap::filled(10, 10, [0, 0, 0, 255])).unwrap_err();
        assert!(matches!(err, PipelineError::Resampling(_)));
        assert_eq!(session.provider.loads.get(), 0);
    }

    #[test]
    fn auto_invert_flips_light_drawings() {
        let stub = Stub::new(0, one_hot(0));
        let config = PipelineConfig::new().with_auto_invert(true);
        let mut session = Session::new(stub, ModelLocator::parse("m.mpk"), config);

        session.predict(&Bitmap::filled(28, 28, [255, 255, 255, 255])).unwrap();
        let seen = session.provider.seen.borrow();
        assert!(seen[0].data.iter().all(|v| (v + 0.4337).abs() < 1e-4));
    }

    #[test]
    fn open_loads_eagerly() {
        let session = Session::open(
            Stub::new(0, one_hot(0)),
            ModelLocator::parse("m.mpk"),
            PipelineConfig::new(),
        )
        .unwrap();
        assert!(session.is_loaded());

        let failed = Session::open(
            Stub::new(1, one_hot(0)),
            ModelLocator::parse("m.mpk"),
            PipelineConfig::new(),
        );
        assert!(failed.is_err());
    }

    #[test]
    fn outcome_display() {
        assert_eq!(Outcome::Digit(7).to_string(), "Prediction: 7");
    }
}
