//! Utility functions for clusterboot

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Percent-encoding set for keys in URL paths
const KEY_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b'/')
    .add(b'%')
    .add(b' ')
    .add(b'?')
    .add(b'#')
    .add(b'&');

/// Encode a key for use as a URL path segment
pub fn encode_key(key: &str) -> String {
    utf8_percent_encode(key, KEY_ENCODE_SET).to_string()
}

/// Decode a percent-encoded key
pub fn decode_key(encoded: &str) -> crate::Result<String> {
    percent_decode_str(encoded)
        .decode_utf8()
        .map(|s| s.to_string())
        .map_err(|e| crate::Error::InvalidKey(format!("failed to decode key: {}", e)))
}

/// Validate key (must be non-empty, reasonable length)
pub fn validate_key(key: &str) -> crate::Result<()> {
    if key.is_empty() {
        return Err(crate::Error::InvalidKey("key cannot be empty".into()));
    }

    if key.len() > 1024 {
        return Err(crate::Error::InvalidKey(
            "key too long (max 1024 bytes)".into(),
        ));
    }

    if key.chars().any(|c| c.is_control()) {
        return Err(crate::Error::InvalidKey(
            "key contains invalid characters".into(),
        ));
    }

    Ok(())
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_idx])
}

/// Parse duration string (e.g., "500ms", "30s", "5m", "1h")
pub fn parse_duration(s: &str) -> crate::Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(crate::Error::InvalidConfig("empty duration".into()));
    }

    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| crate::Error::InvalidConfig(format!("missing duration unit: {}", s)))?;
    let (num_str, unit) = s.split_at(split);

    let num: u64 = num_str
        .parse()
        .map_err(|_| crate::Error::InvalidConfig(format!("invalid duration: {}", s)))?;

    let duration = match unit {
        "ms" => Duration::from_millis(num),
        "s" => Duration::from_secs(num),
        "m" => Duration::from_secs(num * 60),
        "h" => Duration::from_secs(num * 3600),
        _ => {
            return Err(crate::Error::InvalidConfig(format!(
                "unknown duration unit: {}",
                unit
            )))
        }
    };

    Ok(duration)
}

/// Parse a validator ordinal from `3`, `server_3`, `validator-3` and the like.
///
/// Ordinals start at 1.
pub fn parse_validator_id(s: &str) -> crate::Result<u32> {
    let s = s.trim();
    let digits = s
        .rsplit(|c: char| c == '_' || c == '-')
        .next()
        .unwrap_or(s);
    let id: u32 = digits
        .parse()
        .map_err(|_| crate::Error::InvalidConfig(format!("invalid validator id: {:?}", s)))?;
    if id == 0 {
        return Err(crate::Error::InvalidConfig(
            "validator ids start at 1".into(),
        ));
    }
    Ok(id)
}

/// Absolute form of `path`, resolved against the current directory.
///
/// Child processes run with a different working directory, so every path
/// handed to them must be absolute.
pub fn absolute_path(path: &Path) -> crate::Result<PathBuf> {
    std::path::absolute(path).map_err(|e| {
        crate::Error::InvalidConfig(format!("invalid path {}: {}", path.display(), e))
    })
}

/// Program path for a child process.
///
/// Bare names (`server`) are left for `PATH` lookup; anything with a
/// directory component (`./server`, `bin/server`) is made absolute.
pub fn resolve_program(program: &Path) -> crate::Result<PathBuf> {
    if program.components().count() > 1 || program.is_absolute() {
        absolute_path(program)
    } else {
        Ok(program.to_path_buf())
    }
}

/// Replace `path` with `contents` atomically: readers see the old file or
/// the new one, never a truncated one.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> crate::Result<()> {
    let file_name = path
        .file_name()
        .ok_or_else(|| crate::Error::InvalidConfig(format!("not a file: {}", path.display())))?;
    let tmp = path.with_file_name(format!(
        ".{}.{}.tmp",
        file_name.to_string_lossy(),
        std::process::id()
    ));
    tokio::fs::write(&tmp, contents).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

/// Retry with exponential backoff, bounded by `max_retries` attempts
pub async fn retry_with_backoff<F, Fut, T>(
    mut f: F,
    max_retries: usize,
    initial_delay: Duration,
) -> crate::Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = crate::Result<T>>,
{
    let mut delay = initial_delay;

    for attempt in 0..max_retries {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_retryable() && attempt + 1 < max_retries => {
                tracing::warn!(
                    "Retry attempt {} failed: {}, retrying in {:?}",
                    attempt + 1,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(e) => return Err(e),
        }
    }

    Err(crate::Error::Internal("Max retries exceeded".into()))
}
