//! Artifact writing.
//!
//! Emission of an output artifact is a scoped operation: the module
//! listing is written to a temporary sibling and renamed into place on
//! success, so a failed emission never leaves a partial artifact. A
//! companion configuration file records the required host runtime
//! version.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sharpts_common::diagnostics::{Diagnostic, diagnostic_codes};
use sharpts_common::span::Span;

use crate::il::IlModule;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub artifact: PathBuf,
    pub config: PathBuf,
}

#[derive(Serialize)]
struct RuntimeConfig<'a> {
    #[serde(rename = "runtimeVersion")]
    runtime_version: &'a str,
    #[serde(rename = "entryPoint")]
    entry_point: &'a str,
}

/// Write the module and its companion runtime configuration next to
/// `output`.
pub fn write_artifact(module: &IlModule, output: &Path) -> Result<ArtifactPaths, Diagnostic> {
    let config_path = output.with_extension("runtimeconfig.json");
    let temp_path = output.with_extension("il.tmp");

    let write_all = || -> std::io::Result<()> {
        let mut file = fs::File::create(&temp_path)?;
        write!(file, "{module}")?;
        file.sync_all()?;
        fs::rename(&temp_path, output)?;

        let config = RuntimeConfig {
            runtime_version: &module.runtime_version,
            entry_point: &module.entry,
        };
        let text = serde_json::to_string_pretty(&config).expect("config serializes");
        fs::write(&config_path, text)?;
        Ok(())
    };

    match write_all() {
        Ok(()) => Ok(ArtifactPaths {
            artifact: output.to_path_buf(),
            config: config_path,
        }),
        Err(error) => {
            // Discard the partial handle on any failure path.
            let _ = fs::remove_file(&temp_path);
            Err(Diagnostic::compile_error(
                Span::dummy(),
                format!("failed to write artifact '{}': {error}", output.display()),
                diagnostic_codes::EMITTER_INVARIANT,
            ))
        }
    }
}
