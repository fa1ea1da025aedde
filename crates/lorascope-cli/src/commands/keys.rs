//! Keys command

use super::print_json;
use crate::loader::AdapterLoader;
use lorascope_core::{ClipContribution, SafetensorsSource, TensorSource, clip_contribution};
use serde::Serialize;
use std::path::Path;

/// Tensor keys of one file
#[derive(Debug, Serialize)]
pub struct KeyListing {
    pub file: String,
    pub keys: Vec<String>,
    pub clip: ClipContribution,
}

pub fn list(loader: &AdapterLoader, path: &Path) -> Result<KeyListing, Box<dyn std::error::Error>> {
    let loaded = loader.load(path)?;
    let source = SafetensorsSource::from_bytes(&loaded.bytes)?;

    let mut keys = source.tensor_names();
    keys.sort();
    let clip = clip_contribution(&keys);

    Ok(KeyListing {
        file: path.display().to_string(),
        keys,
        clip,
    })
}

pub fn run(
    loader: &AdapterLoader,
    path: &Path,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let listing = list(loader, path)?;

    if json {
        print_json(&listing)?;
        return Ok(());
    }

    println!("{} tensor key(s) in {}", listing.keys.len(), listing.file);
    for key in &listing.keys {
        println!("  {key}");
    }
    println!();
    println!(
        "Clip contributor: {} ({} text-encoder tensor(s))",
        if listing.clip.contributor { "yes" } else { "no" },
        listing.clip.tensor_count
    );

    Ok(())
}
