//! `tundra deps`: show the dependency graph without evaluating.

use std::path::Path;

use anyhow::Result;
use tundra_core::extract::binding_name;
use tundra_core::Notebook;

use crate::run::read_document;

pub fn execute(path: &Path) -> Result<()> {
    let mut notebook = Notebook::default();
    notebook.load(read_document(path)?);
    notebook.run_all()?;

    let registry = notebook.runtime().registry();
    for cell in notebook.cells() {
        let Some(binding) = registry.get(cell.id()) else {
            continue;
        };
        let dependents: Vec<String> = registry
            .dependents(cell.id())
            .into_iter()
            .map(binding_name)
            .collect();

        println!(
            "{} <- [{}] -> [{}]",
            binding.name(),
            binding.inputs().join(", "),
            dependents.join(", ")
        );
    }
    Ok(())
}
