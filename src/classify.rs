use crate::error::{PipelineError, Result};
use crate::normalize::NormalizedTensor;
use crate::provider::{ModelProvider, TensorMap, TensorValue};

/// Raw per-class scores plus the winning class.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    pub scores: Vec<f32>,
    pub label: usize,
}

impl ClassificationResult {
    pub fn from_scores(scores: Vec<f32>) -> Result<Self> {
        if let Some(bad) = scores.iter().find(|v| !v.is_finite()) {
            return Err(PipelineError::Inference(format!(
                "model produced a non-finite score ({bad})"
            )));
        }
        let label = argmax(&scores)
            .ok_or_else(|| PipelineError::Inference("model produced no scores".into()))?;
        Ok(Self { scores, label })
    }

    /// Softmax over the scores; empty when there are none.
    pub fn probabilities(&self) -> Vec<f32> {
        let max = self.scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let exp: Vec<f32> = self.scores.iter().map(|s| (s - max).exp()).collect();
        let sum: f32 = exp.iter().sum();
        exp.into_iter().map(|e| e / sum).collect()
    }
}

/// Index of the largest value; the first one wins a tie.
pub fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Names and counts the classifier exchanges with the model.
#[derive(Debug, Clone)]
pub struct ModelIo<'a> {
    pub input_name: &'a str,
    pub output_name: Option<&'a str>,
    pub num_classes: usize,
}

/// Submits `tensor` to the model as a `[1, 1, height, width]` input and
/// reduces the single output to a class.
pub fn classify<P: ModelProvider>(
    provider: &P,
    handle: &P::Handle,
    tensor: &NormalizedTensor,
    io: &ModelIo<'_>,
) -> Result<ClassificationResult> {
    let [_, _, height, width] = tensor.shape();
    if tensor.len() != height * width {
        return Err(PipelineError::Inference(format!(
            "tensor holds {} values, expected {height}x{width}",
            tensor.len()
        )));
    }

    let mut inputs = TensorMap::new();
    inputs.insert(
        io.input_name.to_string(),
        TensorValue::from(tensor.clone()),
    );

    let mut outputs = provider.run(handle, inputs)?;
    let output = take_output(&mut outputs, io.output_name)?;

    if output.data.len() != io.num_classes {
        return Err(PipelineError::Inference(format!(
            "expected {} class scores, model returned {}",
            io.num_classes,
            output.data.len()
        )));
    }

    let result = ClassificationResult::from_scores(output.data)?;
    log::debug!("scores {:?} -> label {}", result.scores, result.label);
    Ok(result)
}

fn take_output(outputs: &mut TensorMap, name: Option<&str>) -> Result<TensorValue> {
    if let Some(name) = name {
        return outputs.remove(name).ok_or_else(|| {
            PipelineError::Inference(format!("model has no output named `{name}`"))
        });
    }

    if outputs.len() > 1 {
        log::warn!(
            "model returned {} outputs, using the first: {:?}",
            outputs.len(),
            outputs.keys().collect::<Vec<_>>()
        );
    }
    outputs
        .pop_first()
        .map(|(_, value)| value)
        .ok_or_else(|| PipelineError::Inference("model returned no outputs".into()))
}
