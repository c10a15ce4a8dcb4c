use image::imageops;

use crate::bitmap::Bitmap;
use crate::config::ResampleFilter;
use crate::error::{PipelineError, Result};

/// Scales the whole source bitmap into a `width` x `height` grid.
///
/// The source is left untouched. When downscaling, every filter except
/// `Nearest` widens its support by the scale ratio, so all source pixels
/// contribute to the result.
pub fn resample(source: &Bitmap, width: u32, height: u32, filter: ResampleFilter) -> Result<Bitmap> {
    if width == 0 || height == 0 {
        return Err(PipelineError::Resampling(format!(
            "target dimensions must be positive, got {width}x{height}"
        )));
    }
    if source.is_empty() {
        return Err(PipelineError::Resampling(format!(
            "source bitmap is empty ({}x{})",
            source.width(),
            source.height()
        )));
    }

    if source.width() == width && source.height() == height {
        return Ok(source.clone());
    }

    log::debug!(
        "resampling {}x{} -> {width}x{height} ({filter:?})",
        source.width(),
        source.height()
    );
    let resized = imageops::resize(source.as_image(), width, height, filter.into());
    Ok(Bitmap::from(resized))
}
