//! Task trees described as data.
//!
//! A manifest is a JSON document mirroring the [`Task`] interface, so a tree
//! can be queried without compiling task definitions into the program:
//!
//! ```json
//! {
//!   "family": "Merge",
//!   "parameters": [{ "name": "exp", "value": 1003 }],
//!   "outputs": { "merged": "merged.root" },
//!   "requires": [
//!     {
//!       "family": "Reconstruct",
//!       "parameters": [
//!         { "name": "exp", "value": 1003 },
//!         { "name": "run", "value": 5 },
//!         { "name": "verbose", "value": true, "significant": false }
//!       ],
//!       "outputs": { "hist": "hist.root" }
//!     }
//!   ]
//! }
//! ```

use std::borrow::Cow;
use std::fs;
use std::sync::Arc;

use anyhow::Context;
use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ParamError;
use crate::param::Parameter;
use crate::task::{Outputs, Task};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskManifest {
    pub family: String,
    #[serde(default)]
    pub parameters: Vec<ManifestParameter>,
    #[serde(default)]
    pub outputs: Outputs,
    #[serde(default)]
    pub requires: Vec<Arc<TaskManifest>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestParameter {
    pub name: String,
    pub value: Value,
    #[serde(default = "significant_by_default")]
    pub significant: bool,
}

fn significant_by_default() -> bool {
    true
}

impl TaskManifest {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn from_file(path: impl AsRef<Utf8Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();

        let text = fs::read_to_string(path)
            .with_context(|| format!("Couldn't read task manifest {path}"))?;

        Self::from_json(&text).with_context(|| format!("Invalid task manifest {path}"))
    }

    pub fn into_task(self) -> Arc<dyn Task> {
        Arc::new(self)
    }
}

impl Task for TaskManifest {
    fn family(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.family)
    }

    fn parameters(&self) -> Result<Vec<Parameter>, ParamError> {
        Ok(self
            .parameters
            .iter()
            .map(|param| {
                let parameter = Parameter::from_value(param.name.clone(), param.value.clone());
                match param.significant {
                    true => parameter,
                    false => parameter.insignificant(),
                }
            })
            .collect())
    }

    fn dependencies(&self) -> Vec<Arc<dyn Task>> {
        self.requires
            .iter()
            .map(|task| task.clone() as Arc<dyn Task>)
            .collect()
    }

    fn outputs(&self) -> Outputs {
        self.outputs.clone()
    }
}
