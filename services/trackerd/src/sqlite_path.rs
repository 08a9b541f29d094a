use std::fs;
use std::path::Path;

use anyhow::bail;

const MEMORY_PREFIX: &str = "sqlite::memory:";
const URL_PREFIX: &str = "sqlite://";

/// Filesystem part of a `sqlite://` URL, without query parameters.
fn file_part(path: &str) -> Option<&str> {
    let rest = path.strip_prefix(URL_PREFIX)?;
    Some(rest.split_once('?').map(|(file, _)| file).unwrap_or(rest))
}

pub fn validate_sqlite_path(path: &str) -> anyhow::Result<()> {
    if path.starts_with(MEMORY_PREFIX) {
        return Ok(());
    }
    match file_part(path) {
        None => bail!("sqlite path must start with `sqlite://` or use `sqlite::memory:`"),
        Some("") => bail!("sqlite path is missing a filesystem component after `sqlite://`"),
        Some(_) => Ok(()),
    }
}

pub fn ensure_sqlite_parent_dir(path: &str) -> anyhow::Result<()> {
    let Some(file) = file_part(path) else {
        return Ok(());
    };
    if let Some(parent) = Path::new(file).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
