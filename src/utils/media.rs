use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::info;

use crate::config::SUPPORTED_FORMATS;

static UNSAFE_FILENAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f]"#).expect("valid filename regex"));

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("unsupported file format {0}; send JPEG, PNG or WebP images")]
    UnsupportedFormat(String),
    #[error("file too large: {} exceeds the {} limit", human_size(.size), human_size(.limit))]
    TooLarge { size: u64, limit: u64 },
}

fn human_size(size: &u64) -> String {
    format_file_size(*size)
}

pub fn detect_mime_type(data: &[u8]) -> Option<String> {
    infer::get(data).map(|kind| kind.mime_type().to_string())
}

pub fn validate_image_format(mime_type: &str) -> bool {
    SUPPORTED_FORMATS.contains(&mime_type.trim().to_lowercase().as_str())
}

/// Checks an upload against the supported formats and the size ceiling
/// before it is recorded in the user's session.
pub fn validate_upload(mime_type: Option<&str>, size: u64, limit: u64) -> Result<(), UploadError> {
    let mime_type = mime_type.unwrap_or("unknown");
    if !validate_image_format(mime_type) {
        return Err(UploadError::UnsupportedFormat(mime_type.to_string()));
    }
    if size > limit {
        return Err(UploadError::TooLarge { size, limit });
    }
    Ok(())
}

pub fn format_file_size(size_bytes: u64) -> String {
    if size_bytes == 0 {
        return "0 B".to_string();
    }

    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = size_bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{size:.1} {}", UNITS[unit])
}

/// Rough wall-clock estimate shown before long operations.
pub fn estimate_processing_seconds(file_size: u64, operation: &str) -> u32 {
    let base: f64 = match operation {
        "enhance_quality" => 3.0,
        "wallpaper" => 2.0,
        _ => 5.0,
    };

    let size_mb = file_size as f64 / (1024.0 * 1024.0);
    let scaled = if size_mb > 10.0 {
        base * 2.0
    } else if size_mb > 5.0 {
        base * 1.5
    } else {
        base
    };
    scaled.min(30.0) as u32
}

/// Replaces characters that are unsafe in file names and trims leading or
/// trailing spaces and dots. Never returns an empty name.
pub fn sanitize_filename(name: &str) -> String {
    let replaced = UNSAFE_FILENAME_RE.replace_all(name, "_");
    let trimmed = replaced.trim_matches(|c| c == ' ' || c == '.');
    if trimmed.is_empty() {
        "image".to_string()
    } else {
        trimmed.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    pub size: String,
    pub size_bytes: u64,
    pub mime_type: Option<String>,
    pub format: Option<String>,
}

pub fn get_file_info(size_bytes: u64, mime_type: Option<&str>) -> FileInfo {
    FileInfo {
        size: format_file_size(size_bytes),
        size_bytes,
        mime_type: mime_type.map(str::to_string),
        format: mime_type.and_then(|mime| mime.rsplit('/').next().map(str::to_uppercase)),
    }
}

pub fn format_processing_stats(elapsed: Duration, file_size: u64, operation: &str) -> String {
    format!(
        "Processing completed in {:.1}s\nFile size: {}\nOperation: {}",
        elapsed.as_secs_f64(),
        format_file_size(file_size),
        operation
    )
}

pub fn log_user_action(user_id: i64, action: &str, details: &str) {
    info!("User {user_id} action: {action} {details}");
}
