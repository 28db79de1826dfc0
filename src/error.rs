use camino::Utf8PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskpathError {
    #[error(transparent)]
    Param(#[from] ParamError),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Settings(#[from] SettingsError),
}

#[derive(Debug, Error)]
pub enum ParamError {
    #[error("Parameter '{name}' could not be serialized.\n{source}")]
    Serialize {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum PathError {
    #[error("Parameter '{name}' has value '{value}' which can't be used as a path segment")]
    Segment { name: String, value: String },

    #[error("Couldn't resolve the working directory.\n{0}")]
    WorkingDir(std::io::Error),

    #[error("Couldn't convert path to UTF-8.\n{0}")]
    PathFormat(#[from] camino::FromPathBufError),

    #[error("Couldn't create directory '{path}'.\n{source}")]
    CreateDir {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Output key '{0}' was never declared by any task")]
    UnknownKey(String),

    #[error("Task '{family}': {source}")]
    Task {
        family: String,
        #[source]
        source: TaskError,
    },
}

/// Failure while collecting a single task's data.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Param(#[from] ParamError),

    #[error(transparent)]
    Path(#[from] PathError),
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Dependency cycle detected at task {0}")]
    Cycle(String),

    #[error("Task '{family}': {source}")]
    Param {
        family: String,
        #[source]
        source: ParamError,
    },
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Couldn't read settings file '{path}'.\n{source}")]
    Read {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Settings file '{path}' is not a JSON object.\n{source}")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Setting '{key}' has an unexpected shape.\n{source}")]
    Shape {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Couldn't resolve the working directory.\n{0}")]
    WorkingDir(std::io::Error),

    #[error("Couldn't locate the running executable.\n{0}")]
    Executable(std::io::Error),

    #[error("Couldn't convert path to UTF-8.\n{0}")]
    PathFormat(#[from] camino::FromPathBufError),
}
