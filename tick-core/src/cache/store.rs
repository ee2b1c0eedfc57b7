//! On-disk cache store.
//!
//! Cache entries live in `.tickcache/` next to the source file, named
//! after the source basename with a `.tickc` extension. An entry is
//! valid only while the source's mtime and byte length both match the
//! stamp recorded in its header. All failures on this path degrade to
//! recompilation; only the caller decides whether that is fatal.

use super::format::{self, FormatError, SourceStamp};
use crate::runtime::codegen::CompiledProgram;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("{0}")]
    Format(#[from] FormatError),
    #[error("Cache entry is stale")]
    Stale,
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// `<source_dir>/.tickcache/<basename>.tickc`
pub fn cache_path(source_path: &Path) -> PathBuf {
    let dir = source_path.parent().unwrap_or_else(|| Path::new("."));
    let basename = source_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "out".to_string());
    dir.join(".tickcache").join(format!("{basename}.tickc"))
}

/// Stat the source file into the stamp recorded in cache headers.
pub fn source_stamp(source_path: &Path) -> Result<SourceStamp, CacheError> {
    let meta = fs::metadata(source_path).map_err(|source| CacheError::Io {
        path: source_path.to_path_buf(),
        source,
    })?;
    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0);
    Ok(SourceStamp {
        mtime,
        size: meta.len(),
    })
}

/// Load a valid cache entry for `source_path`, or an error describing
/// why the front end must run.
pub fn load(source_path: &Path) -> Result<CompiledProgram, CacheError> {
    let path = cache_path(source_path);
    let data = fs::read(&path).map_err(|source| CacheError::Io {
        path: path.clone(),
        source,
    })?;

    let current = source_stamp(source_path)?;
    let (program, recorded) = format::decode(&data)?;
    if recorded != current {
        return Err(CacheError::Stale);
    }

    debug!(target: "tick::cache", path = %path.display(), "cache hit");
    Ok(program)
}

/// Write a cache entry for `source_path`. Failures are logged and
/// reported but never fatal to the caller's run.
pub fn store(source_path: &Path, program: &CompiledProgram) -> Result<(), CacheError> {
    let stamp = source_stamp(source_path)?;
    let data = format::encode(program, stamp)?;

    let path = cache_path(source_path);
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|source| CacheError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    fs::write(&path, data).map_err(|source| CacheError::Io {
        path: path.clone(),
        source,
    })?;

    debug!(target: "tick::cache", path = %path.display(), "cache written");
    Ok(())
}

/// Load-or-recompute wrapper used by the CLI: any cache miss reason is
/// logged at debug level, write failures at warn.
pub fn load_or_else<F, E>(source_path: &Path, compile: F) -> Result<CompiledProgram, E>
where
    F: FnOnce() -> Result<CompiledProgram, E>,
{
    match load(source_path) {
        Ok(program) => return Ok(program),
        Err(err) => {
            debug!(target: "tick::cache", %err, "cache miss, running front end");
        }
    }

    let program = compile()?;
    if let Err(err) = store(source_path, &program) {
        warn!(target: "tick::cache", %err, "failed to write cache entry");
    }
    Ok(program)
}
