use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::models::error::CaptureError;
use crate::models::media::VideoFrame;
use crate::models::recording_result::{RecordingArtifact, Screenshot};
use crate::storage::metadata::write_metadata;

/// Write `artifact` into `dir` under its file name, plus the metadata sidecar.
/// Returns the path of the recording.
pub fn export_artifact(artifact: &RecordingArtifact, dir: &Path) -> Result<PathBuf, CaptureError> {
    let path = prepare_target(dir, &artifact.file_name)?;
    fs::write(&path, &artifact.data)
        .map_err(|e| CaptureError::StorageError(format!("failed to write recording: {}", e)))?;
    write_metadata(&artifact.metadata, &path)?;
    log::info!("Exported recording to {} ({} bytes)", path.display(), artifact.len());
    Ok(path)
}

/// Write a screenshot PNG into `dir`.
pub fn export_screenshot(screenshot: &Screenshot, dir: &Path) -> Result<PathBuf, CaptureError> {
    let path = prepare_target(dir, &screenshot.file_name)?;
    fs::write(&path, &screenshot.png)
        .map_err(|e| CaptureError::StorageError(format!("failed to write screenshot: {}", e)))?;
    log::info!("Exported screenshot to {}", path.display());
    Ok(path)
}

/// Encode an RGBA8 frame as PNG.
pub fn encode_png(frame: &VideoFrame) -> Result<Vec<u8>, CaptureError> {
    if !frame.is_well_formed() {
        return Err(CaptureError::StorageError(format!(
            "frame {}x{} has {} bytes of pixel data",
            frame.width,
            frame.height,
            frame.data.len()
        )));
    }

    let mut png_data = Vec::new();
    let mut encoder = png::Encoder::new(&mut png_data, frame.width, frame.height);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder
        .write_header()
        .map_err(|e| CaptureError::StorageError(format!("PNG header error: {}", e)))?;
    writer
        .write_image_data(&frame.data)
        .map_err(|e| CaptureError::StorageError(format!("PNG encode error: {}", e)))?;
    writer
        .finish()
        .map_err(|e| CaptureError::StorageError(format!("PNG finish error: {}", e)))?;
    Ok(png_data)
}

/// SHA-256 hex digest of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    hex_encode(&digest)
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn prepare_target(dir: &Path, file_name: &str) -> Result<PathBuf, CaptureError> {
    if file_name.is_empty() || file_name.contains(['/', '\\']) {
        return Err(CaptureError::StorageError(format!("invalid file name '{}'", file_name)));
    }
    fs::create_dir_all(dir)
        .map_err(|e| CaptureError::StorageError(format!("failed to create {}: {}", dir.display(), e)))?;
    Ok(dir.join(file_name))
}
