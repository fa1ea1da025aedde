//! Allocate command

use super::print_json;
use lorascope_compose::{
    AllocationReport, AllocatorConfig, ComposeError, EnergyInput, RoleAllocator,
};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// Allocation request file
#[derive(Debug, Clone, Deserialize)]
pub struct AllocateRequest {
    pub adapters: Vec<EnergyInput>,
}

pub fn execute(
    request: &AllocateRequest,
    config: &AllocatorConfig,
) -> Result<AllocationReport, ComposeError> {
    let report = RoleAllocator::new(*config).allocate(&request.adapters)?;
    info!("Allocated {} adapter(s)", report.len());
    Ok(report)
}

pub fn run(
    request_path: &Path,
    config: &AllocatorConfig,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(request_path)?;
    let request: AllocateRequest = serde_json::from_str(&content)?;
    let report = execute(&request, config)?;

    if json {
        print_json(&report)?;
        return Ok(());
    }

    println!(
        "{:<24} {:<12} {:>10} {:>10} {:>10} {:>10}",
        "ID", "ROLE", "BASE", "OVERLAP", "FACTOR", "FINAL"
    );
    for entry in report.iter() {
        println!(
            "{:<24} {:<12} {:>10.4} {:>10.4} {:>10.4} {:>10.4}",
            entry.id,
            entry.role.as_str(),
            entry.base_allocation,
            entry.max_overlap,
            entry.overlap_factor,
            entry.final_strength
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lorascope_compose::Role;

    #[test]
    fn test_allocates_from_request() {
        let request: AllocateRequest = serde_json::from_str(
            r#"{
                "adapters": [
                    {"id": "hero", "role": "Character", "raw_strength_factor": 1.0, "block_weights": [1.0, 1.0]},
                    {"id": "ink", "role": "style", "raw_strength_factor": 1.0, "block_weights": [1.0, 1.0]},
                    {"id": "walk", "role": "pose", "raw_strength_factor": -0.5, "block_weights": [0.2, 0.9]}
                ]
            }"#,
        )
        .unwrap();

        let report = execute(&request, &AllocatorConfig::default()).unwrap();
        assert_eq!(report.len(), 3);
        assert!((report.strength_of("hero").unwrap() - 0.35 * 2.5).abs() < 1e-12);
        assert_eq!(report.entries[2].role, Role::Utility);
        assert!(report.strength_of("walk").unwrap() < 0.0);
    }

    #[test]
    fn test_role_defaults_to_other() {
        let request: AllocateRequest = serde_json::from_str(
            r#"{"adapters": [{"id": "x", "raw_strength_factor": 2.0, "block_weights": [1.0]}]}"#,
        )
        .unwrap();

        let report = execute(&request, &AllocatorConfig::default()).unwrap();
        assert_eq!(report.entries[0].role, Role::Other);
        assert!((report.strength_of("x").unwrap() - 0.07 * 2.0).abs() < 1e-12);
    }
}
