//! Collecting the declared output files of a whole task tree.
//!
//! The registry is a snapshot: it is built from a root task once and never
//! updated. Rebuild it after the task tree changes.

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::combinator::Constraints;
use crate::error::{RegistryError, SettingsError, TaskError};
use crate::filter::filter;
use crate::param::{SerializedParams, serialize_parameters};
use crate::path::derive_path;
use crate::settings::Settings;
use crate::task::Task;
use crate::walk::walk;

/// One output file of one task run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRecord {
    /// Significant parameters of the run that declared the file.
    pub parameters: SerializedParams,
    /// Absolute location of the file.
    pub file_name: Utf8PathBuf,
}

/// Output records of a task tree, grouped by logical output key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputRegistry {
    entries: IndexMap<String, Vec<OutputRecord>>,
}

impl OutputRegistry {
    /// Builds the registry for the tree below `root`, see [`RegistryBuilder`].
    pub fn build(
        root: Arc<dyn Task>,
        result_root: impl Into<Utf8PathBuf>,
    ) -> Result<Self, RegistryError> {
        RegistryBuilder::new(result_root).build(root)
    }

    /// Records declared under `key`, in traversal order.
    ///
    /// A key no task ever declared is an error rather than an empty slice.
    pub fn get(&self, key: &str) -> Result<&[OutputRecord], RegistryError> {
        self.entries
            .get(key)
            .map(Vec::as_slice)
            .ok_or_else(|| RegistryError::UnknownKey(key.to_string()))
    }

    /// Records declared under `key` that satisfy `constraints`.
    pub fn query(
        &self,
        key: &str,
        constraints: &Constraints,
    ) -> Result<Vec<OutputRecord>, RegistryError> {
        Ok(filter(self.get(key)?, constraints))
    }

    /// Like [`query`](Self::query), but only the file locations.
    pub fn file_names(
        &self,
        key: &str,
        constraints: &Constraints,
    ) -> Result<Vec<Utf8PathBuf>, RegistryError> {
        Ok(self
            .query(key, constraints)?
            .into_iter()
            .map(|record| record.file_name)
            .collect())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[OutputRecord])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Number of distinct output keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn push(&mut self, key: &str, record: OutputRecord) {
        match self.entries.get_mut(key) {
            Some(records) => records.push(record),
            None => {
                self.entries.insert(key.to_string(), vec![record]);
            }
        }
    }
}

/// Options for building an [`OutputRegistry`].
#[derive(Debug, Clone)]
pub struct RegistryBuilder {
    result_root: Utf8PathBuf,
    create_dirs: bool,
}

impl RegistryBuilder {
    pub fn new(result_root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            result_root: result_root.into(),
            create_dirs: false,
        }
    }

    /// Uses the `result_path` setting as the result root.
    pub fn from_settings(settings: &Settings) -> Result<Self, SettingsError> {
        Ok(Self::new(settings.result_path()?))
    }

    /// Also create the parent directory of every registered file.
    pub fn create_dirs(mut self, create_dirs: bool) -> Self {
        self.create_dirs = create_dirs;
        self
    }

    pub fn result_root(&self) -> &Utf8Path {
        &self.result_root
    }

    pub fn build(&self, root: Arc<dyn Task>) -> Result<OutputRegistry, RegistryError> {
        let span = tracing::debug_span!("build_registry", root = %root.family());
        let _enter = span.enter();

        let mut registry = OutputRegistry::default();
        let mut visited = 0usize;

        for task in walk(root) {
            visited += 1;

            let outputs = task.outputs();
            if outputs.is_empty() {
                continue;
            }

            let parameters = serialize_parameters(&*task).map_err(|e| task_error(&*task, e))?;

            for (key, fragment) in outputs.iter() {
                let file_name =
                    derive_path(&parameters, fragment, &self.result_root, self.create_dirs)
                        .map_err(|e| task_error(&*task, e))?;

                tracing::trace!(key, %file_name, "registered output");

                registry.push(
                    key,
                    OutputRecord {
                        parameters: parameters.clone(),
                        file_name,
                    },
                );
            }
        }

        tracing::debug!(tasks = visited, keys = registry.len(), "built output registry");

        Ok(registry)
    }
}

/// Builds the registry for the tree below `root` without creating any
/// directories.
pub fn build(
    root: Arc<dyn Task>,
    result_root: impl Into<Utf8PathBuf>,
) -> Result<OutputRegistry, RegistryError> {
    OutputRegistry::build(root, result_root)
}

fn task_error<T>(task: &T, source: impl Into<TaskError>) -> RegistryError
where
    T: Task + ?Sized,
{
    RegistryError::Task {
        family: task.family().into_owned(),
        source: source.into(),
    }
}

// ******************************
// *      Single-task views     *
// ******************************

/// Output files of one task, logical key to location.
pub fn output_files<T>(
    task: &T,
    result_root: impl AsRef<Utf8Path>,
) -> Result<IndexMap<String, Utf8PathBuf>, RegistryError>
where
    T: Task + ?Sized,
{
    resolve_outputs(task, result_root.as_ref(), false)
}

/// Location of the output file declared under `key` by one task.
pub fn output_file<T>(
    task: &T,
    key: &str,
    result_root: impl AsRef<Utf8Path>,
) -> Result<Utf8PathBuf, RegistryError>
where
    T: Task + ?Sized,
{
    let outputs = task.outputs();
    let fragment = outputs
        .get(key)
        .ok_or_else(|| RegistryError::UnknownKey(key.to_string()))?;

    let parameters = serialize_parameters(task).map_err(|e| task_error(task, e))?;
    derive_path(&parameters, fragment, result_root, false).map_err(|e| task_error(task, e))
}

/// Output files of the direct dependencies of a task, grouped by key.
///
/// This is what a task reads as its input: one location per dependency that
/// declared the key, in dependency order.
pub fn input_files<T>(
    task: &T,
    result_root: impl AsRef<Utf8Path>,
) -> Result<IndexMap<String, Vec<Utf8PathBuf>>, RegistryError>
where
    T: Task + ?Sized,
{
    let mut inputs: IndexMap<String, Vec<Utf8PathBuf>> = IndexMap::new();

    for dependency in task.dependencies() {
        for (key, file_name) in resolve_outputs(&*dependency, result_root.as_ref(), false)? {
            inputs.entry(key).or_default().push(file_name);
        }
    }

    Ok(inputs)
}

/// Creates the parent directories of every output file of one task.
pub fn create_output_dirs<T>(task: &T, result_root: impl AsRef<Utf8Path>) -> Result<(), RegistryError>
where
    T: Task + ?Sized,
{
    resolve_outputs(task, result_root.as_ref(), true).map(|_| ())
}

fn resolve_outputs<T>(
    task: &T,
    result_root: &Utf8Path,
    create_dirs: bool,
) -> Result<IndexMap<String, Utf8PathBuf>, RegistryError>
where
    T: Task + ?Sized,
{
    let outputs = task.outputs();
    if outputs.is_empty() {
        return Ok(IndexMap::new());
    }

    let parameters = serialize_parameters(task).map_err(|e| task_error(task, e))?;

    outputs
        .iter()
        .map(|(key, fragment)| {
            derive_path(&parameters, fragment, result_root, create_dirs)
                .map(|file_name| (key.to_string(), file_name))
                .map_err(|e| task_error(task, e))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;
    use std::collections::HashMap;

    use super::*;
    use crate::error::ParamError;
    use crate::param::Parameter;
    use crate::task::Outputs;

    struct Job {
        family: &'static str,
        params: Vec<(&'static str, &'static str)>,
        outputs: Outputs,
        deps: Vec<Arc<dyn Task>>,
    }

    impl Task for Job {
        fn family(&self) -> Cow<'_, str> {
            self.family.into()
        }

        fn parameters(&self) -> Result<Vec<Parameter>, ParamError> {
            self.params
                .iter()
                .map(|&(name, value)| Parameter::new(name, value))
                .collect()
        }

        fn dependencies(&self) -> Vec<Arc<dyn Task>> {
            self.deps.clone()
        }

        fn outputs(&self) -> Outputs {
            self.outputs.clone()
        }
    }

    fn job(
        params: Vec<(&'static str, &'static str)>,
        outputs: Outputs,
        deps: Vec<Arc<dyn Task>>,
    ) -> Arc<dyn Task> {
        Arc::new(Job {
            family: "Job",
            params,
            outputs,
            deps,
        })
    }

    #[test]
    fn test_single_task() {
        let root = job(
            vec![("exp", "1003"), ("run", "5")],
            Outputs::new().with("hist", "hist.root"),
            vec![],
        );

        let registry = OutputRegistry::build(root, "/out").unwrap();
        let records = registry.get("hist").unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].file_name, "/out/exp=1003/run=5/hist.root");
        assert_eq!(records[0].parameters.get("exp"), Some("1003"));
        assert_eq!(records[0].parameters.get("run"), Some("5"));
    }

    #[test]
    fn test_filter_dependencies() {
        let root = job(
            vec![],
            Outputs::new(),
            vec![
                job(vec![("run", "1")], Outputs::new().with("log", "log.txt"), vec![]),
                job(vec![("run", "2")], Outputs::new().with("log", "log.txt"), vec![]),
            ],
        );

        let registry = build(root, "/out").unwrap();
        assert_eq!(registry.get("log").unwrap().len(), 2);

        let hits = registry
            .query("log", &Constraints::new().with("run", "1"))
            .unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].file_name, "/out/run=1/log.txt");
    }

    #[test]
    fn test_unknown_key() {
        let root = job(vec![], Outputs::new(), vec![]);
        let registry = build(root, "/out").unwrap();

        assert!(registry.is_empty());
        assert!(matches!(
            registry.get("hist"),
            Err(RegistryError::UnknownKey(key)) if key == "hist"
        ));
        assert!(registry.query("hist", &Constraints::new()).is_err());
    }

    #[test]
    fn test_traversal_order_and_repeats() {
        let shared = job(vec![("run", "9")], Outputs::new().add("a.txt"), vec![]);
        let root = job(
            vec![("run", "0")],
            Outputs::new().add("a.txt").add("b.txt"),
            vec![shared.clone(), shared],
        );

        let registry = build(root, "/r").unwrap();
        let files: Vec<_> = registry
            .get("a.txt")
            .unwrap()
            .iter()
            .map(|r| r.file_name.as_str())
            .collect();

        assert_eq!(files, vec!["/r/run=0/a.txt", "/r/run=9/a.txt", "/r/run=9/a.txt"]);
        assert_eq!(registry.keys().collect::<Vec<_>>(), vec!["a.txt", "b.txt"]);
    }

    struct Broken;

    impl Task for Broken {
        fn parameters(&self) -> Result<Vec<Parameter>, ParamError> {
            let mut grid = HashMap::new();
            grid.insert((1, 2), 3);
            Ok(vec![Parameter::new("grid", grid)?])
        }

        fn outputs(&self) -> Outputs {
            Outputs::new().add("out.txt")
        }
    }

    #[test]
    fn test_parameter_error_propagates() {
        let root = job(vec![], Outputs::new(), vec![Arc::new(Broken) as Arc<dyn Task>]);

        let err = build(root, "/out").unwrap_err();
        assert!(matches!(err, RegistryError::Task { ref family, .. } if family == "Broken"));
    }

    #[test]
    fn test_path_valued_parameter_fails_build() {
        let bad = job(vec![("input", "data/a.root")], Outputs::new().add("out.txt"), vec![]);
        let root = job(vec![], Outputs::new().add("merged.txt"), vec![bad]);

        let err = build(root, "/out").unwrap_err();
        assert!(matches!(
            err,
            RegistryError::Task {
                source: TaskError::Path(crate::error::PathError::Segment { .. }),
                ..
            }
        ));
    }

    #[test]
    fn test_single_task_views() {
        let a = job(vec![("run", "1")], Outputs::new().with("hist", "h.root"), vec![]);
        let b = job(vec![("run", "2")], Outputs::new().with("hist", "h.root"), vec![]);
        let root = job(
            vec![("stage", "merge")],
            Outputs::new().with("merged", "m.root"),
            vec![a, b],
        );

        let outputs = output_files(&*root, "/r").unwrap();
        assert_eq!(outputs["merged"], "/r/stage=merge/m.root");

        assert_eq!(
            output_file(&*root, "merged", "/r").unwrap(),
            "/r/stage=merge/m.root"
        );
        assert!(matches!(
            output_file(&*root, "hist", "/r"),
            Err(RegistryError::UnknownKey(_))
        ));

        let inputs = input_files(&*root, "/r").unwrap();
        assert_eq!(
            inputs["hist"],
            vec![
                Utf8PathBuf::from("/r/run=1/h.root"),
                Utf8PathBuf::from("/r/run=2/h.root")
            ]
        );
    }

    #[test]
    fn test_create_output_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        let task = job(vec![("run", "3")], Outputs::new().with("hist", "sub/h.root"), vec![]);

        create_output_dirs(&*task, root).unwrap();
        assert!(root.join("run=3/sub").is_dir());

        let registry = RegistryBuilder::new(root.join("other"))
            .create_dirs(true)
            .build(task)
            .unwrap();
        assert!(registry.get("hist").unwrap()[0].file_name.parent().unwrap().is_dir());
    }

    #[test]
    fn test_json_shape() {
        let root = job(vec![("run", "5")], Outputs::new().with("hist", "h.root"), vec![]);
        let registry = build(root, "/out").unwrap();

        assert_eq!(
            serde_json::to_string(&registry).unwrap(),
            r#"{"hist":[{"parameters":{"run":"5"},"file_name":"/out/run=5/h.root"}]}"#
        );
    }
}
