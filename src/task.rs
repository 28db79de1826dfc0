//! The capability set every task variant exposes to the registry.
use std::any::type_name;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ParamError;
use crate::param::{Parameter, SerializedParams, serialize_parameters};

/// A node in a batch task graph.
///
/// The scheduler that actually runs tasks lives elsewhere; this trait only
/// exposes what is needed to find and query their output files. Dependencies
/// are produced on demand and are assumed to form an acyclic graph.
///
/// # Example
///
/// ```rust
/// use taskpath::{Outputs, ParamError, Parameter, Task};
///
/// struct Reconstruct {
///     run: u32,
/// }
///
/// impl Task for Reconstruct {
///     fn parameters(&self) -> Result<Vec<Parameter>, ParamError> {
///         Ok(vec![Parameter::new("run", self.run)?])
///     }
///
///     fn outputs(&self) -> Outputs {
///         Outputs::new().add("hist.root")
///     }
/// }
///
/// assert_eq!(Reconstruct { run: 5 }.family(), "Reconstruct");
/// ```
pub trait Task: Send + Sync {
    /// Stable identifier of the task kind, used in log file names.
    ///
    /// Defaults to the bare type name without module path or generics.
    fn family(&self) -> Cow<'_, str> {
        let name = type_name::<Self>();
        let name = name.split('<').next().unwrap_or(name);
        Cow::Borrowed(name.rsplit("::").next().unwrap_or(name))
    }

    /// All parameters in declaration order, significant or not.
    fn parameters(&self) -> Result<Vec<Parameter>, ParamError> {
        Ok(Vec::new())
    }

    /// Tasks this one requires, in declaration order.
    fn dependencies(&self) -> Vec<Arc<dyn Task>> {
        Vec::new()
    }

    /// Declared output files, logical key to file name or path fragment.
    fn outputs(&self) -> Outputs {
        Outputs::new()
    }
}

/// Declared output files of a single task.
///
/// Fragments are relative to the parameter directory of the task, see
/// [`derive_path`](crate::derive_path).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Outputs(IndexMap<String, Utf8PathBuf>);

impl Outputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file whose name doubles as its logical key.
    pub fn add(self, file_name: impl Into<String>) -> Self {
        let file_name = file_name.into();
        let fragment = Utf8PathBuf::from(&file_name);
        self.with(file_name, fragment)
    }

    /// Adds a file under an explicit logical key.
    pub fn with(mut self, key: impl Into<String>, fragment: impl Into<Utf8PathBuf>) -> Self {
        self.insert(key, fragment);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, fragment: impl Into<Utf8PathBuf>) {
        self.0.insert(key.into(), fragment.into());
    }

    pub fn get(&self, key: &str) -> Option<&Utf8Path> {
        self.0.get(key).map(Utf8PathBuf::as_path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Utf8Path)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_path()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Outputs
where
    K: Into<String>,
    V: Into<Utf8PathBuf>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut outputs = Self::new();
        for (key, fragment) in iter {
            outputs.insert(key, fragment);
        }
        outputs
    }
}

/// Identity of a task run: two tasks with equal ids are the same run and
/// share every derived path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskId {
    family: String,
    params: SerializedParams,
}

impl TaskId {
    pub fn new(family: impl Into<String>, params: SerializedParams) -> Self {
        Self {
            family: family.into(),
            params,
        }
    }

    pub fn of<T>(task: &T) -> Result<Self, ParamError>
    where
        T: Task + ?Sized,
    {
        Ok(Self::new(task.family(), serialize_parameters(task)?))
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn params(&self) -> &SerializedParams {
        &self.params
    }

    /// Short BLAKE3 digest of the identity, stable across processes.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.family.as_bytes());

        for (name, value) in self.params.iter() {
            hasher.update(&[0]);
            hasher.update(name.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
        }

        hasher.finalize().to_hex().as_str()[..12].to_owned()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.family, self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Plain;

    impl Task for Plain {}

    struct Generic<T>(T);

    impl<T: Send + Sync> Task for Generic<T> {}

    struct Run(u32);

    impl Task for Run {
        fn parameters(&self) -> Result<Vec<Parameter>, ParamError> {
            Ok(vec![Parameter::new("run", self.0)?])
        }
    }

    #[test]
    fn test_default_family() {
        assert_eq!(Plain.family(), "Plain");
        assert_eq!(Generic(1u8).family(), "Generic");
    }

    #[test]
    fn test_default_family_through_trait_object() {
        let task: Arc<dyn Task> = Arc::new(Plain);
        assert_eq!(task.family(), "Plain");
    }

    #[test]
    fn test_outputs_builder() {
        let outputs = Outputs::new()
            .add("hist.root")
            .with("log", "logs/out.txt");

        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs.get("hist.root"), Some(Utf8Path::new("hist.root")));
        assert_eq!(outputs.get("log"), Some(Utf8Path::new("logs/out.txt")));
        assert_eq!(outputs.get("missing"), None);
    }

    #[test]
    fn test_task_id_identity() {
        let a = TaskId::of(&Run(5)).unwrap();
        let b = TaskId::of(&Run(5)).unwrap();
        let c = TaskId::of(&Run(6)).unwrap();

        assert_eq!(a, b);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a, c);
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_eq!(a.fingerprint().len(), 12);
        assert_eq!(a.to_string(), "Run(run=5)");
    }
}
