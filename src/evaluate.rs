use std::fmt;

use indicatif::ProgressBar;

use crate::mnist::IdxImages;
use crate::provider::ModelProvider;
use crate::session::Session;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvaluationReport {
    pub correct: usize,
    pub failed: usize,
    pub total: usize,
}

impl EvaluationReport {
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        100.0 * self.correct as f64 / self.total as f64
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Accuracy: {:.2}% ({}/{} correct, {} failed)",
            self.accuracy(),
            self.correct,
            self.total,
            self.failed
        )
    }
}

/// Sends each labelled digit through the full prediction pipeline.
///
/// Failed predictions count against accuracy.
pub fn evaluate<P: ModelProvider>(
    session: &mut Session<P>,
    images: &IdxImages,
    labels: &[u8],
    limit: Option<usize>,
) -> EvaluationReport {
    let total = limit
        .unwrap_or(usize::MAX)
        .min(images.len())
        .min(labels.len());
    let pb = ProgressBar::new(total as u64);
    let mut report = EvaluationReport {
        total,
        ..Default::default()
    };

    for (index, &label) in labels.iter().enumerate().take(total) {
        let prediction = images
            .bitmap(index)
            .map(|bitmap| session.predict(&bitmap));
        match prediction {
            Some(Ok(prediction)) if prediction.label == label as usize => report.correct += 1,
            Some(Ok(_)) => {}
            Some(Err(err)) => {
                log::debug!("sample {index} failed: {err}");
                report.failed += 1;
            }
            None => report.failed += 1,
        }
        pb.inc(1);
    }
    pb.finish_with_message("done");

    report
}
