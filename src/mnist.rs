//! MNIST test set in IDX format, used to measure the pipeline's accuracy.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use thiserror::Error;

use crate::bitmap::Bitmap;

/// Paths & MNIST sources
pub const MNIST_BASE: &str = "https://storage.googleapis.com/cvdf-datasets/mnist/";
pub const TEST_IMAGES: &str = "t10k-images-idx3-ubyte.gz";
pub const TEST_LABELS: &str = "t10k-labels-idx1-ubyte.gz";

const IMAGES_MAGIC: u32 = 0x0000_0803;
const LABELS_MAGIC: u32 = 0x0000_0801;

#[derive(Debug, Error)]
pub enum MnistError {
    #[error("download of {url} failed: {reason}")]
    Download { url: String, reason: String },
    #[error("bad idx file: {0}")]
    Format(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Grayscale digits, row-major, one byte per pixel.
#[derive(Debug, Clone)]
pub struct IdxImages {
    pub rows: usize,
    pub cols: usize,
    pub images: Vec<Vec<u8>>,
}

impl IdxImages {
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn bitmap(&self, index: usize) -> Option<Bitmap> {
        let pixels = self.images.get(index)?;
        Bitmap::from_gray(self.cols as u32, self.rows as u32, pixels).ok()
    }
}

/// Downloads `fname` from the MNIST mirror into `dir` unless it is already there.
pub fn download_if_needed(dir: &Path, fname: &str) -> Result<PathBuf, MnistError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(fname);

    if path.exists() {
        log::debug!("File exists: {}", path.display());
        return Ok(path);
    }

    let url = format!("{MNIST_BASE}{fname}");
    log::info!("Downloading {url} ...");
    let download_err = |reason: String| MnistError::Download {
        url: url.clone(),
        reason,
    };
    let mut resp = reqwest::blocking::get(&url)
        .and_then(|resp| resp.error_for_status())
        .map_err(|e| download_err(e.to_string()))?;
    let mut out = File::create(&path)?;
    if let Err(e) = resp.copy_to(&mut out) {
        drop(out);
        let _ = fs::remove_file(&path);
        return Err(download_err(e.to_string()));
    }
    log::info!("Saved to {}", path.display());
    Ok(path)
}

fn read_gz(path: &Path) -> Result<Vec<u8>, MnistError> {
    let mut gz = GzDecoder::new(File::open(path)?);
    let mut buf = vec![];
    gz.read_to_end(&mut buf)?;
    Ok(buf)
}

fn be_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

/// idx header: magic (4 bytes), n_items (4), rows (4), cols (4)
pub fn parse_idx_images(buf: &[u8]) -> Result<IdxImages, MnistError> {
    if buf.len() < 16 {
        return Err(MnistError::Format("image header truncated".into()));
    }
    if be_u32(buf, 0) != IMAGES_MAGIC {
        return Err(MnistError::Format(format!(
            "unexpected image magic {:#010x}",
            be_u32(buf, 0)
        )));
    }
    let n = be_u32(buf, 4) as usize;
    let rows = be_u32(buf, 8) as usize;
    let cols = be_u32(buf, 12) as usize;
    if rows == 0 || cols == 0 {
        return Err(MnistError::Format(format!("empty image size {rows}x{cols}")));
    }
    let size = rows.checked_mul(cols);
    let end = size
        .and_then(|size| size.checked_mul(n))
        .and_then(|bytes| bytes.checked_add(16))
        .zip(size);
    let Some((end, size)) = end else {
        return Err(MnistError::Format("idx dimensions overflow".into()));
    };
    if buf.len() < end {
        return Err(MnistError::Format("idx image truncated".into()));
    }

    let images = buf[16..end]
        .chunks_exact(size)
        .map(<[u8]>::to_vec)
        .collect();
    Ok(IdxImages { rows, cols, images })
}

/// idx header: magic (4 bytes), n_items (4)
pub fn parse_idx_labels(buf: &[u8]) -> Result<Vec<u8>, MnistError> {
    if buf.len() < 8 {
        return Err(MnistError::Format("label header truncated".into()));
    }
    if be_u32(buf, 0) != LABELS_MAGIC {
        return Err(MnistError::Format(format!(
            "unexpected label magic {:#010x}",
            be_u32(buf, 0)
        )));
    }
    let n = be_u32(buf, 4) as usize;
    if buf.len() < 8 + n {
        return Err(MnistError::Format("idx labels truncated".into()));
    }
    Ok(buf[8..8 + n].to_vec())
}

/// Fetches (if needed) and parses the 10k test images and labels.
pub fn load_test_set(dir: &Path) -> Result<(IdxImages, Vec<u8>), MnistError> {
    let images_path = download_if_needed(dir, TEST_IMAGES)?;
    let labels_path = download_if_needed(dir, TEST_LABELS)?;

    log::info!("Parsing test images...");
    let images = parse_idx_images(&read_gz(&images_path)?)?;
    log::info!("Parsing test labels...");
    let labels = parse_idx_labels(&read_gz(&labels_path)?)?;

    if images.len() != labels.len() {
        return Err(MnistError::Format(format!(
            "{} images but {} labels",
            images.len(),
            labels.len()
        )));
    }
    Ok((images, labels))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::write::GzEncoder;
    use flate2::Compression;

    use super::*;

    fn images_file(n: u32, rows: u32, cols: u32, pixels: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        for v in [IMAGES_MAGIC, n, rows, cols] {
            buf.extend(v.to_be_bytes());
        }
        buf.extend(pixels);
        buf
    }

    fn labels_file(labels: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend(LABELS_MAGIC.to_be_bytes());
        buf.extend((labels.len() as u32).to_be_bytes());
        buf.extend(labels);
        buf
    }

    fn write_gz(path: &Path, bytes: &[u8]) {
        let mut enc = GzEncoder::new(File::create(path).unwrap(), Compression::default());
        enc.write_all(bytes).unwrap();
        enc.finish().unwrap();
    }

    #[test]
    fn parses_images() {
        let buf = images_file(2, 2, 2, &[0, 1, 2, 3, 4, 5, 6, 7]);
        let images = parse_idx_images(&buf).unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images.images[1], vec![4, 5, 6, 7]);

        let bitmap = images.bitmap(1).unwrap();
        assert_eq!(bitmap.pixel(1, 1), [7, 7, 7, 255]);
        assert!(images.bitmap(2).is_none());
    }

    #[test]
    fn rejects_truncated_or_foreign_files() {
        assert!(parse_idx_images(&images_file(2, 2, 2, &[0; 7])).is_err());
        assert!(parse_idx_images(&[0; 10]).is_err());
        assert!(parse_idx_images(&labels_file(&[1, 2])).is_err());
        assert!(parse_idx_labels(&[0, 0, 8, 1, 0, 0, 0, 5, 1]).is_err());
    }

    #[test]
    fn oversized_header_is_rejected() {
        let buf = images_file(u32::MAX, u32::MAX, u32::MAX, &[]);
        assert!(matches!(
            parse_idx_images(&buf),
            Err(MnistError::Format(msg)) if msg.contains("overflow")
        ));
        assert!(parse_idx_images(&images_file(1, 0, 28, &[])).is_err());
    }

    #[test]
    fn parses_labels() {
        assert_eq!(parse_idx_labels(&labels_file(&[7, 2, 1])).unwrap(), vec![7, 2, 1]);
    }

    #[test]
    fn loads_cached_gzip_files() {
        let dir = tempfile::tempdir().unwrap();
        write_gz(&dir.path().join(TEST_IMAGES), &images_file(1, 1, 2, &[9, 8]));
        write_gz(&dir.path().join(TEST_LABELS), &labels_file(&[3]));

        let (images, labels) = load_test_set(dir.path()).unwrap();
        assert_eq!(images.images, vec![vec![9, 8]]);
        assert_eq!(labels, vec![3]);
    }
}
