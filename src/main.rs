use std::fmt::Display;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand};
use console::{Style, style};
use indexmap::IndexMap;

use taskpath::manifest::TaskManifest;
use taskpath::{
    Constraint, Constraints, RegistryBuilder, Settings, Task, TaskGraph, TaskId, log_files,
    output_path, walk,
};

const ANSI_BLUE: Style = Style::new().blue();

/// Query parameter-derived output files of a task tree
#[derive(Parser)]
#[command(name = "taskpath")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Settings file to use instead of the discovered settings.json
    #[arg(long, global = true)]
    settings: Option<Utf8PathBuf>,

    /// Override the result_path setting
    #[arg(long, global = true)]
    result_path: Option<Utf8PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the output files of every task as JSON
    Outputs {
        /// Task manifest (JSON)
        manifest: Utf8PathBuf,

        /// Only print files declared under this key
        #[arg(long)]
        key: Option<String>,

        /// Parameter constraint as name=value, repeat a name for alternatives
        #[arg(long = "param", value_parser = parse_constraint)]
        params: Vec<(String, String)>,

        /// Create the parent directory of every file
        #[arg(long)]
        create: bool,
    },

    /// Print the derived location of a file of the root task
    Path {
        manifest: Utf8PathBuf,

        base_filename: Utf8PathBuf,

        /// Create the parent directory
        #[arg(long)]
        create: bool,
    },

    /// Print the stdout and stderr log files of the root task
    Logs { manifest: Utf8PathBuf },

    /// Print the task graph as a Mermaid flowchart
    Graph { manifest: Utf8PathBuf },

    /// List every task reached by the tree walk
    Tasks {
        manifest: Utf8PathBuf,

        /// Visit every distinct run only once
        #[arg(long)]
        unique: bool,
    },
}

fn parse_constraint(text: &str) -> Result<(String, String), String> {
    match text.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected name=value, got '{text}'")),
    }
}

fn as_overhead(start: Instant) -> impl Display {
    let f = format!("(+{}ms)", start.elapsed().as_millis());
    ANSI_BLUE.apply_to(f)
}

fn main() -> Result<()> {
    taskpath::init_logging()?;

    let cli = Cli::parse();

    let mut settings = match &cli.settings {
        Some(path) => Settings::from_file(path)?.with_env(std::env::vars()),
        None => Settings::load()?,
    };

    if let Some(result_path) = &cli.result_path {
        settings.set("result_path", result_path.as_str());
    }

    match cli.command {
        Command::Outputs {
            manifest,
            key,
            params,
            create,
        } => outputs(&settings, &manifest, key.as_deref(), params, create),
        Command::Path {
            manifest,
            base_filename,
            create,
        } => {
            let root = load(&manifest)?;
            let path = output_path(&*root, &base_filename, settings.result_path()?, create)?;
            println!("{path}");
            Ok(())
        }
        Command::Logs { manifest } => {
            let root = load(&manifest)?;
            let (stdout, stderr) = log_files(&*root, settings.log_folder()?)?;
            println!("{stdout}");
            println!("{stderr}");
            Ok(())
        }
        Command::Graph { manifest } => {
            let graph = TaskGraph::from_root(load(&manifest)?)?;
            if !graph.is_acyclic() {
                eprintln!("{}", style("warning: the task graph has cycles").yellow());
            }
            print!("{graph}");
            Ok(())
        }
        Command::Tasks { manifest, unique } => tasks(&manifest, unique),
    }
}

fn load(path: &Utf8Path) -> Result<Arc<dyn Task>> {
    Ok(TaskManifest::from_file(path)?.into_task())
}

fn outputs(
    settings: &Settings,
    manifest: &Utf8Path,
    key: Option<&str>,
    params: Vec<(String, String)>,
    create: bool,
) -> Result<()> {
    let s = Instant::now();
    let root = load(manifest)?;

    let registry = RegistryBuilder::from_settings(settings)?
        .create_dirs(create)
        .build(root)?;

    eprintln!(
        "Collected {} output keys {}",
        registry.len(),
        as_overhead(s)
    );

    let mut grouped: IndexMap<String, Vec<String>> = IndexMap::new();
    for (name, value) in params {
        grouped.entry(name).or_default().push(value);
    }

    let constraints: Constraints = grouped
        .into_iter()
        .map(|(name, values)| match values.len() {
            1 => (name, Constraint::from(values.into_iter().next())),
            _ => (name, Constraint::from(values)),
        })
        .collect();

    let json = match key {
        Some(key) => serde_json::to_string_pretty(&registry.query(key, &constraints)?)?,
        None => {
            let filtered: IndexMap<&str, _> = registry
                .iter()
                .map(|(key, records)| (key, taskpath::filter(records, &constraints)))
                .collect();
            serde_json::to_string_pretty(&filtered)?
        }
    };

    println!("{json}");
    Ok(())
}

fn tasks(manifest: &Utf8Path, unique: bool) -> Result<()> {
    let root = load(manifest)?;

    let tasks: Vec<Arc<dyn Task>> = if unique {
        walk(root).unique().collect::<Result<_, _>>()?
    } else {
        walk(root).collect()
    };

    if tasks.is_empty() {
        bail!("the manifest describes no tasks");
    }

    for task in tasks {
        let id = TaskId::of(&*task).with_context(|| format!("task {}", task.family()))?;
        println!("{} {}", style(id.fingerprint()).dim(), id);
    }

    Ok(())
}
