//! Process-wide key/value settings.
//!
//! A value is looked up in this order, first hit wins:
//!
//! 1. overrides set in-process with [`Settings::set`],
//! 2. `TASKPATH_<KEY>` environment variables captured by [`Settings::load`],
//! 3. the `settings.json` file found in the working directory or its parents,
//! 4. the default passed by the caller.
//!
//! Nothing here is read implicitly by the path derivation; callers resolve
//! `result_path` and `log_folder` and pass them on explicitly.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::SettingsError;

/// Name of the settings file looked up by [`Settings::load`].
pub const SETTINGS_FILE: &str = "settings.json";

const ENV_PREFIX: &str = "TASKPATH_";

#[derive(Debug, Clone, Default)]
pub struct Settings {
    overrides: Map<String, Value>,
    env: Map<String, Value>,
    file: Map<String, Value>,
    source: Option<Utf8PathBuf>,
}

impl Settings {
    /// Empty settings: no file, no environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Captures the environment and discovers a settings file starting at
    /// the working directory.
    pub fn load() -> Result<Self, SettingsError> {
        let cwd = std::env::current_dir().map_err(SettingsError::WorkingDir)?;
        let cwd = Utf8PathBuf::try_from(cwd)?;

        let mut settings = match find_file(&cwd) {
            Some(path) => Self::from_file(path)?,
            None => Self::new(),
        };

        settings = settings.with_env(std::env::vars());
        Ok(settings)
    }

    /// Reads settings from a JSON object file.
    pub fn from_file(path: impl AsRef<Utf8Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();

        let text = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let file = serde_json::from_str(&text).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        tracing::debug!("loaded settings from {path}");

        Ok(Self {
            file,
            source: Some(path.to_path_buf()),
            ..Self::default()
        })
    }

    /// Takes `TASKPATH_<KEY>` variables from the given environment snapshot.
    /// `TASKPATH_RESULT_PATH` becomes the `result_path` setting.
    pub fn with_env<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        for (name, value) in vars {
            if let Some(key) = name.as_ref().strip_prefix(ENV_PREFIX) {
                self.env
                    .insert(key.to_ascii_lowercase(), Value::String(value.into()));
            }
        }
        self
    }

    /// The settings file in use, if any.
    pub fn source(&self) -> Option<&Utf8Path> {
        self.source.as_deref()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.overrides.insert(key.into(), value.into());
    }

    /// Raw value of `key`, respecting precedence.
    pub fn raw(&self, key: &str) -> Option<&Value> {
        self.overrides
            .get(key)
            .or_else(|| self.env.get(key))
            .or_else(|| self.file.get(key))
    }

    /// Typed value of `key`, or `default` when it is not set anywhere.
    ///
    /// Environment variables are plain strings; when a string does not fit
    /// the requested type it is parsed as JSON, so `TASKPATH_BATCH_SIZE=4`
    /// reads fine as a number.
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T, SettingsError> {
        match self.raw(key) {
            Some(value) => decode(key, value),
            None => Ok(default),
        }
    }

    /// Base directory of derived output paths, `.` unless configured.
    pub fn result_path(&self) -> Result<Utf8PathBuf, SettingsError> {
        self.get("result_path", Utf8PathBuf::from("."))
    }

    /// Base directory of log files, `logs` next to the running executable
    /// unless configured.
    pub fn log_folder(&self) -> Result<Utf8PathBuf, SettingsError> {
        if let Some(value) = self.raw("log_folder") {
            return decode("log_folder", value);
        }

        let exe = std::env::current_exe().map_err(SettingsError::Executable)?;
        let exe = Utf8PathBuf::try_from(exe)?;
        let dir = exe.parent().unwrap_or(Utf8Path::new("."));

        Ok(dir.join("logs"))
    }
}

fn decode<T: DeserializeOwned>(key: &str, value: &Value) -> Result<T, SettingsError> {
    match serde_json::from_value(value.clone()) {
        Ok(value) => Ok(value),
        Err(source) => match value {
            Value::String(text) => serde_json::from_str(text).map_err(|_| SettingsError::Shape {
                key: key.to_string(),
                source,
            }),
            _ => Err(SettingsError::Shape {
                key: key.to_string(),
                source,
            }),
        },
    }
}

fn find_file(start: &Utf8Path) -> Option<Utf8PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(SETTINGS_FILE))
        .find(|path| path.is_file())
}
