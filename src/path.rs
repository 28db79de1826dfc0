//! Mapping between parameter sets and file-system locations.
//!
//! A task with the significant parameters `exp=1003, run=5` writing
//! `hist.root` under the result root `/out` owns the file
//!
//! ```text
//! /out/exp=1003/run=5/hist.root
//! ```
//!
//! The encoding is lossless, so [`parse_path`] recovers the parameters from
//! such a path again.

use std::fs;
use std::path::is_separator;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};

use crate::error::{PathError, TaskError};
use crate::param::{SerializedParams, serialize_parameters};
use crate::task::Task;

/// Derives the absolute location of `base_filename` for a run with the given
/// significant parameters.
///
/// Each parameter becomes one `name=value` directory below `root`, in
/// declaration order. A relative `root` is resolved against the working
/// directory. With `create_dirs` set, the parent directory is created if it
/// does not exist yet.
///
/// A value containing a path separator is not split into nested directories,
/// since the parameters could then no longer be read back from the path.
/// Such values fail with [`PathError::Segment`], and so does any registry
/// build that reaches the task. The same holds for names that are empty or
/// contain `=`.
pub fn derive_path(
    params: &SerializedParams,
    base_filename: impl AsRef<Utf8Path>,
    root: impl AsRef<Utf8Path>,
    create_dirs: bool,
) -> Result<Utf8PathBuf, PathError> {
    let mut path = absolute(root.as_ref())?;

    for (name, value) in params.iter() {
        path.push(segment(name, value)?);
    }

    path.push(base_filename.as_ref());
    let path = normalize_path(&path);

    if create_dirs && let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }

    Ok(path)
}

/// Derives the output location of `base_filename` for a concrete task.
pub fn output_path<T>(
    task: &T,
    base_filename: impl AsRef<Utf8Path>,
    root: impl AsRef<Utf8Path>,
    create_dirs: bool,
) -> Result<Utf8PathBuf, TaskError>
where
    T: Task + ?Sized,
{
    let params = serialize_parameters(task)?;
    Ok(derive_path(&params, base_filename, root, create_dirs)?)
}

/// Stdout and stderr log file locations of a task, below `log_root`.
///
/// The directories are always created.
pub fn log_files<T>(
    task: &T,
    log_root: impl AsRef<Utf8Path>,
) -> Result<(Utf8PathBuf, Utf8PathBuf), TaskError>
where
    T: Task + ?Sized,
{
    let params = serialize_parameters(task)?;
    let family = task.family();
    let log_root = log_root.as_ref();

    let stdout = derive_path(&params, format!("{family}_stdout"), log_root, true)?;
    let stderr = derive_path(&params, format!("{family}_stderr"), log_root, true)?;

    Ok((stdout, stderr))
}

/// Recovers the parameters and the base filename from a derived path.
///
/// `root` must be spelled the same way as the prefix of `path`. Returns
/// `None` when `path` is not below `root` or has no file component. Leading
/// components containing `=` are read as parameters, the rest is the base
/// filename.
pub fn parse_path(
    path: impl AsRef<Utf8Path>,
    root: impl AsRef<Utf8Path>,
) -> Option<(SerializedParams, Utf8PathBuf)> {
    let relative = path.as_ref().strip_prefix(root.as_ref()).ok()?;
    let parts: Vec<&str> = relative.iter().collect();
    let (_, dirs) = parts.split_last()?;

    let mut params = SerializedParams::new();
    let mut consumed = 0;

    for part in dirs {
        let Some((name, value)) = part.split_once('=') else {
            break;
        };
        params.insert(name, value);
        consumed += 1;
    }

    let base: Utf8PathBuf = parts[consumed..].iter().collect();
    Some((params, base))
}

/// Creates a directory and all its parents. An existing directory, including
/// one created concurrently by someone else, counts as success.
pub fn ensure_dir(path: impl AsRef<Utf8Path>) -> Result<(), PathError> {
    let path = path.as_ref();

    fs::create_dir_all(path).map_err(|source| PathError::CreateDir {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::trace!("ensured directory {path}");
    Ok(())
}

fn segment(name: &str, value: &str) -> Result<String, PathError> {
    let bad_name = name.is_empty() || name.contains('=') || name.chars().any(is_separator);

    if bad_name || value.chars().any(is_separator) {
        return Err(PathError::Segment {
            name: name.to_string(),
            value: value.to_string(),
        });
    }

    Ok(format!("{name}={value}"))
}

fn absolute(path: &Utf8Path) -> Result<Utf8PathBuf, PathError> {
    if path.is_absolute() {
        return Ok(normalize_path(path));
    }

    let cwd = std::env::current_dir().map_err(PathError::WorkingDir)?;
    let cwd = Utf8PathBuf::try_from(cwd)?;

    Ok(normalize_path(&cwd.join(path)))
}

/// Lexically removes `.` and `..` components without touching the file
/// system, so symlinks are not resolved.
pub(crate) fn normalize_path(path: &Utf8Path) -> Utf8PathBuf {
    let mut components = path.components().peekable();

    let mut normal = match components.peek().copied() {
        Some(prefix @ Utf8Component::Prefix(..)) => {
            components.next();
            Utf8PathBuf::from(prefix.as_str())
        }
        _ => Utf8PathBuf::new(),
    };

    for component in components {
        match component {
            Utf8Component::Prefix(..) => unreachable!(),
            Utf8Component::RootDir => normal.push(Utf8Component::RootDir),
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => {
                if normal.ends_with(Utf8Component::ParentDir) || !normal.pop() && !normal.has_root() {
                    normal.push(Utf8Component::ParentDir);
                }
            }
            Utf8Component::Normal(part) => normal.push(part),
        }
    }

    normal
}
