//! Combine command

use super::{format_weights, print_json};
use lorascope_compose::{
    AdapterComposeInput, CombinedResult, ComposeError, ComposeSettings, CompatibilityReport,
    ComposerConfig, WeightedComposer, validate_compatibility,
};
use lorascope_core::{LayoutWarning, check_block_weights};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{info, warn};

/// Combine request file
#[derive(Debug, Clone, Deserialize)]
pub struct CombineRequest {
    pub adapters: Vec<AdapterComposeInput>,
    /// Per-adapter settings keyed by id
    #[serde(default)]
    pub settings: HashMap<String, ComposeSettings>,
}

/// Stored-vector warning for one adapter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorWarning {
    pub id: String,
    pub warning: LayoutWarning,
}

/// What the request preparation dropped or flagged
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RequestNotes {
    /// Repeated ids; only the first occurrence is combined
    pub duplicates: Vec<String>,
    /// Adapters dropped for having no block vector
    pub excluded: Vec<String>,
    /// Problems found in the stored vectors that were kept
    pub vector_warnings: Vec<VectorWarning>,
}

/// Outcome of a combine request
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CombineResponse {
    Combined {
        notes: RequestNotes,
        result: CombinedResult,
        model_csv: String,
        clip_csv: Option<String>,
        digest: String,
    },
    Incompatible {
        notes: RequestNotes,
        report: CompatibilityReport,
    },
}

/// Dedupe by id, drop empty vectors and check the rest against their layouts
fn prepare(adapters: Vec<AdapterComposeInput>) -> (Vec<AdapterComposeInput>, RequestNotes) {
    let mut notes = RequestNotes::default();
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(adapters.len());

    for adapter in adapters {
        if !seen.insert(adapter.id.clone()) {
            warn!("Ignoring repeated adapter '{}'", adapter.id);
            notes.duplicates.push(adapter.id);
            continue;
        }
        if adapter.block_weights.is_empty() {
            warn!("Excluding '{}': no block weights", adapter.id);
            notes.excluded.push(adapter.id);
            continue;
        }

        for warning in check_block_weights(Some(&adapter.layout), &adapter.block_weights) {
            warn!("Adapter '{}': {}", adapter.id, warning);
            notes.vector_warnings.push(VectorWarning {
                id: adapter.id.clone(),
                warning,
            });
        }
        kept.push(adapter);
    }

    (kept, notes)
}

pub fn execute(
    request: CombineRequest,
    config: &ComposerConfig,
) -> Result<CombineResponse, ComposeError> {
    let (adapters, notes) = prepare(request.adapters);

    let report = validate_compatibility(&adapters);
    if !report.compatible {
        return Ok(CombineResponse::Incompatible { notes, report });
    }

    let composer = WeightedComposer::new(*config);
    let result = composer.compose(&adapters, &request.settings, report.layout.as_ref())?;
    info!(
        "Combined {} adapter(s) on {}",
        adapters.len(),
        report.layout.as_ref().map(|l| l.identifier()).unwrap_or("-")
    );

    Ok(CombineResponse::Combined {
        notes,
        model_csv: result.model_csv(),
        clip_csv: result.clip_csv(),
        digest: result.digest().to_hex().to_string(),
        result,
    })
}

pub fn run(
    request_path: &Path,
    config: &ComposerConfig,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(request_path)?;
    let request: CombineRequest = serde_json::from_str(&content)?;
    let response = execute(request, config)?;

    if json {
        print_json(&response)?;
    } else {
        print_response(&response);
    }

    match response {
        CombineResponse::Incompatible { report, .. } => {
            Err(ComposeError::Incompatible(report).into())
        }
        CombineResponse::Combined { .. } => Ok(()),
    }
}

fn print_response(response: &CombineResponse) {
    match response {
        CombineResponse::Incompatible { notes, report } => {
            print_notes(notes);
            println!("✗ Adapter set is incompatible");
            for reason in &report.reasons {
                println!("  - [{}] {}", reason.code, reason.detail);
                if !reason.ids.is_empty() {
                    println!("    ids: {}", reason.ids.join(", "));
                }
            }
        }
        CombineResponse::Combined {
            notes,
            result,
            model_csv,
            clip_csv,
            digest,
        } => {
            print_notes(notes);
            let digits = result.precision as usize;
            println!("Model weights: {}", format_weights(&result.combined_model, digits));
            println!("Model CSV:     {model_csv}");
            match clip_csv {
                Some(csv) => println!("Clip CSV:      {csv}"),
                None => println!("Clip CSV:      (none)"),
            }
            if let (Some(a), Some(b)) = (result.combined_a, result.combined_b) {
                println!("A/B:           {a:.digits$} / {b:.digits$}");
            }
            println!("Digest:        {digest}");

            if !result.warnings.is_empty() {
                println!();
                println!("Warnings:");
                for warning in &result.warnings {
                    println!("  - {warning}");
                }
            }
        }
    }
}

fn print_notes(notes: &RequestNotes) {
    if !notes.duplicates.is_empty() {
        println!("Repeated ids (first kept): {}", notes.duplicates.join(", "));
    }
    if !notes.excluded.is_empty() {
        println!("Excluded (no block weights): {}", notes.excluded.join(", "));
    }
    for entry in &notes.vector_warnings {
        println!("Stored vector '{}': {}", entry.id, entry.warning);
    }
    if notes != &RequestNotes::default() {
        println!();
    }
}
