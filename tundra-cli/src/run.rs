//! `tundra run`: evaluate a notebook headlessly.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde_json::json;
use tundra_core::document::{self, CellDraft};
use tundra_core::reactive::{NoLoader, StaticLoader};
use tundra_core::{BindingState, Cell, EngineConfig, Notebook, Runtime, ScriptLoader, Value};

pub async fn execute(
    path: &Path,
    config: Option<&Path>,
    scripts: &[String],
    as_json: bool,
) -> Result<()> {
    let config = load_config(config)?;
    let runtime = Runtime::with_loader(config, script_loader(scripts)?);
    let mut notebook = Notebook::with_runtime(runtime);

    notebook.load(read_document(path)?);
    notebook.run_all()?;
    notebook.settle().await;

    let bound: Vec<(&Cell, &BindingState)> = notebook
        .cells()
        .iter()
        .filter_map(|cell| notebook.state(cell.id()).map(|state| (cell, state)))
        .collect();

    if as_json {
        let report: Vec<serde_json::Value> =
            bound.iter().map(|(cell, state)| cell_json(cell, state)).collect();
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for (cell, state) in &bound {
            println!("{}", cell_line(cell, state));
        }
    }

    let rejected = bound
        .iter()
        .filter(|(_, state)| matches!(state, BindingState::Rejected(_)))
        .count();
    if rejected > 0 {
        bail!("{rejected} of {} cells were rejected", bound.len());
    }
    Ok(())
}

pub fn read_document(path: &Path) -> Result<Vec<CellDraft>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    document::parse(&text).with_context(|| format!("failed to parse {}", path.display()))
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    Ok(EngineConfig::from_json(&text)?)
}

fn script_loader(specs: &[String]) -> Result<Arc<dyn ScriptLoader>> {
    if specs.is_empty() {
        return Ok(Arc::new(NoLoader));
    }

    let mut loader = StaticLoader::new();
    for spec in specs {
        let (url, file) = split_script_spec(spec)?;
        let text = fs::read_to_string(file)
            .with_context(|| format!("failed to read script value {file}"))?;
        let json: serde_json::Value = serde_json::from_str(&text)
            .with_context(|| format!("{file} is not valid JSON"))?;
        tracing::debug!(url, file, "serving script");
        loader.insert(url, Value::from(json));
    }
    Ok(Arc::new(loader))
}

/// `URL=FILE`. URLs may contain `=`, so the last one separates.
fn split_script_spec(spec: &str) -> Result<(&str, &str)> {
    match spec.rsplit_once('=') {
        Some((url, file)) if !url.is_empty() && !file.is_empty() => Ok((url, file)),
        _ => bail!("expected URL=FILE, got `{spec}`"),
    }
}

fn cell_line(cell: &Cell, state: &BindingState) -> String {
    let name = cell.name().unwrap_or_default();
    match state {
        BindingState::Fulfilled(value) => format!("{name} = {}", value.repr()),
        BindingState::Rejected(error) => format!("{name} ! {error}"),
        other => format!("{name} ({})", other.label()),
    }
}

fn cell_json(cell: &Cell, state: &BindingState) -> serde_json::Value {
    json!({
        "cell": cell.id(),
        "name": cell.name(),
        "kind": cell.kind(),
        "state": state.label(),
        "value": state.value().map(Value::to_json),
        "error": state.error().map(ToString::to_string),
    })
}
