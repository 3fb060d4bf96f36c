use std::path::Path;

use serde::Serialize;

use crate::error::AppError;

// ---------------------------------------------------------------------------
// Jitter based on std, seeded from the clock; not for anything security related.
// ---------------------------------------------------------------------------

/// Uniform-ish value in `[0, max_ms)`.
pub fn rand_jitter_ms(max_ms: u64) -> u64 {
    if max_ms == 0 {
        return 0;
    }
    let mut x = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    // xorshift64
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    x % max_ms
}

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
///
/// Writes to a sibling temp file first, syncs it, then renames, so readers
/// (and a process restarted after a crash) see either the old or the new
/// contents, never a torn file.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), AppError> {
    use std::io::Write;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let json = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(&json)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path).map_err(|e| {
        AppError::StorageError(format!("Failed to replace {}: {e}", path.display()))
    })?;
    Ok(())
}
