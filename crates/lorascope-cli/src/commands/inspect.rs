//! Inspect command

use super::{format_weights, print_json};
use crate::loader::AdapterLoader;
use lorascope_core::{
    AdapterScanner, ClipContribution, SafetensorsSource, ScanConfig, ScanResult, TensorSource,
    clip_contribution,
};
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// Scan outcome of one file
#[derive(Debug, Serialize)]
pub struct InspectReport {
    pub file: String,
    pub size_bytes: usize,
    pub blake3: String,
    pub clip: ClipContribution,
    #[serde(flatten)]
    pub scan: ScanResult,
}

pub fn inspect(
    loader: &AdapterLoader,
    path: &Path,
    config: &ScanConfig,
    expect_hash: Option<&str>,
) -> Result<InspectReport, Box<dyn std::error::Error>> {
    info!("Inspecting {}", path.display());

    let loaded = match expect_hash {
        Some(expected) => loader.load_verified(path, expected)?,
        None => loader.load(path)?,
    };
    let source = SafetensorsSource::from_bytes(&loaded.bytes)?;
    let clip = clip_contribution(source.tensor_names());
    let scan = AdapterScanner::new(config.clone()).scan(&source)?;

    info!(
        "Scanned {} tensors: {} ({})",
        source.len(),
        scan.layout,
        scan.kind
    );

    Ok(InspectReport {
        file: path.display().to_string(),
        size_bytes: loaded.size(),
        blake3: loaded.hash_hex(),
        clip,
        scan,
    })
}

pub fn run(
    loader: &AdapterLoader,
    path: &Path,
    config: &ScanConfig,
    expect_hash: Option<&str>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let report = inspect(loader, path, config, expect_hash)?;

    if json {
        print_json(&report)?;
        return Ok(());
    }

    let scan = &report.scan;
    println!("File:    {}", report.file);
    println!("==============================");
    println!("Size:    {} bytes", report.size_bytes);
    println!("BLAKE3:  {}", report.blake3);
    println!("Family:  {}", scan.family);
    println!("Kind:    {}", scan.kind);
    println!("Layout:  {}", scan.layout);
    println!("Blocks:  {:?}", scan.block_indices);
    println!(
        "Clip:    {} ({} tensor(s))",
        if report.clip.contributor { "yes" } else { "no" },
        report.clip.tensor_count
    );
    println!();
    println!("Block weights:");
    println!("  {}", format_weights(scan.vector.normalized_weights(), 4));
    println!("Raw block strengths:");
    println!("  {}", format_weights(scan.vector.raw_strengths(), 4));

    if !scan.notes.is_empty() {
        println!();
        println!("Notes:");
        for note in &scan.notes {
            println!("  - {note}");
        }
    }

    Ok(())
}
