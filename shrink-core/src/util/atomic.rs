use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::warn;

use crate::error::{Result, ShrinkError};

const ATTEMPTS: usize = 2;

/// Replace `path` with the JSON form of `value` without ever exposing a
/// half-written file. A failed first attempt is retried once; a second
/// failure is a durability error.
pub fn write_json<T: Serialize>(path: &Path, value: &T, operation: &'static str) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let mut last = None;
    for attempt in 1..=ATTEMPTS {
        match write_once(path, &bytes) {
            Ok(()) => return Ok(()),
            Err(e) => {
                warn!(path = %path.display(), attempt, error = %e, "atomic write failed");
                last = Some(e);
            }
        }
    }
    Err(ShrinkError::Durability {
        operation,
        path: path.to_path_buf(),
        source: last.unwrap_or_else(|| std::io::Error::other("atomic write not attempted")),
    })
}

fn write_once(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let tmp = NamedTempFile::new_in(dir)?;
    {
        let mut w = BufWriter::new(tmp.as_file());
        w.write_all(bytes)?;
        w.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Remove `path`, treating "already gone" as success.
pub fn remove_if_exists(path: &Path) -> std::io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_existing_file_and_leaves_no_temp_behind() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("nested").join("state.json");
        write_json(&p, &vec![1, 2, 3], "write").unwrap();
        write_json(&p, &vec![4], "write").unwrap();
        let got: Vec<u32> = serde_json::from_slice(&fs::read(&p).unwrap()).unwrap();
        assert_eq!(got, vec![4]);
        let entries = fs::read_dir(p.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn unwritable_target_is_a_durability_error() {
        let dir = tempfile::tempdir().unwrap();
        // a regular file where a directory is expected
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"x").unwrap();
        let err = write_json(&blocker.join("state.json"), &1u8, "save checkpoint").unwrap_err();
        assert!(matches!(err, ShrinkError::Durability { operation: "save checkpoint", .. }));
    }

    #[test]
    fn remove_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!remove_if_exists(&dir.path().join("nope")).unwrap());
    }
}
