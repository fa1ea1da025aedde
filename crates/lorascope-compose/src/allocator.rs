//! Role-budget / overlap allocation
//!
//! Turns each adapter's requested strength into a fair final strength:
//!
//! 1. energy per block = |weight| · |requested strength|, scaled to a unit
//!    L2 vector for similarity
//! 2. roles canonicalized into a fixed hierarchy
//! 3. every role group capped at its budget share of the total request and
//!    split by energy share
//! 4. one cosine-similarity matrix over all adapters
//! 5. allocations damped when an adapter overlaps a peer of its own role
//!    beyond the threshold
//! 6. the requested sign re-applied

use crate::config::AllocatorConfig;
use crate::error::{ComposeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{Level, debug, span};

/// Semantic role of an adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Character,
    Style,
    Clothing,
    Concept,
    Environment,
    Utility,
    Other,
}

/// Budget fraction of the total requested strength, per role
pub const ROLE_BUDGETS: [(Role, f64); 7] = [
    (Role::Character, 0.35),
    (Role::Style, 0.25),
    (Role::Clothing, 0.15),
    (Role::Concept, 0.10),
    (Role::Environment, 0.10),
    (Role::Utility, 0.08),
    (Role::Other, 0.07),
];

const ROLE_ALIASES: [(&str, Role); 2] = [("pose", Role::Utility), ("action", Role::Utility)];

impl Role {
    /// All roles in hierarchy order
    pub const ALL: [Role; 7] = [
        Role::Character,
        Role::Style,
        Role::Clothing,
        Role::Concept,
        Role::Environment,
        Role::Utility,
        Role::Other,
    ];

    /// Budget fraction for this role
    pub fn budget(&self) -> f64 {
        ROLE_BUDGETS
            .iter()
            .find(|(role, _)| role == self)
            .map(|(_, budget)| *budget)
            .unwrap_or(0.0)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Character => "character",
            Self::Style => "style",
            Self::Clothing => "clothing",
            Self::Concept => "concept",
            Self::Environment => "environment",
            Self::Utility => "utility",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a declared role onto the hierarchy
///
/// Trims and lowercases; aliases apply; anything else becomes
/// [`Role::Other`].
pub fn canonicalize_role(raw: &str) -> Role {
    let key = raw.trim().to_lowercase();
    if let Some((_, role)) = ROLE_ALIASES.iter().find(|(alias, _)| *alias == key) {
        return *role;
    }
    Role::ALL
        .into_iter()
        .find(|role| role.as_str() == key)
        .unwrap_or(Role::Other)
}

/// One adapter as requested for allocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyInput {
    /// Stable adapter id
    pub id: String,
    /// Declared role, free-form
    #[serde(default)]
    pub role: String,
    /// Requested (signed) strength
    pub raw_strength_factor: f64,
    /// Normalized block weights
    pub block_weights: Vec<f64>,
}

impl EnergyInput {
    pub fn new(
        id: impl Into<String>,
        role: impl Into<String>,
        raw_strength_factor: f64,
        block_weights: Vec<f64>,
    ) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
            raw_strength_factor,
            block_weights,
        }
    }
}

/// Energy signature of one adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyMetrics {
    pub id: String,
    /// Canonical role
    pub role: Role,
    pub raw_strength_factor: f64,
    /// |weight| · |strength| per block
    pub energy_vector: Vec<f64>,
    /// Sum of the energy vector
    pub total_energy: f64,
    /// Energy vector scaled to unit L2 norm (all zeros for zero energy)
    pub normalized_energy_vector: Vec<f64>,
}

impl EnergyMetrics {
    /// Compute the energy signature of an input
    pub fn compute(input: &EnergyInput) -> Self {
        let strength = input.raw_strength_factor.abs();
        let energy_vector: Vec<f64> = input
            .block_weights
            .iter()
            .map(|w| w.abs() * strength)
            .collect();
        let total_energy = energy_vector.iter().sum();

        let norm = energy_vector.iter().map(|e| e * e).sum::<f64>().sqrt();
        let normalized_energy_vector = if norm > 0.0 {
            energy_vector.iter().map(|e| e / norm).collect()
        } else {
            vec![0.0; energy_vector.len()]
        };

        Self {
            id: input.id.clone(),
            role: canonicalize_role(&input.role),
            raw_strength_factor: input.raw_strength_factor,
            energy_vector,
            total_energy,
            normalized_energy_vector,
        }
    }
}

/// Pairwise cosine similarity of normalized energy vectors
///
/// Built once per allocation; lookups never recompute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlapMatrix {
    ids: Vec<String>,
    values: Vec<f64>,
}

impl OverlapMatrix {
    /// Build the full matrix
    ///
    /// Only the upper triangle is computed; the diagonal is 1.0.
    pub fn build(metrics: &[EnergyMetrics]) -> Self {
        let n = metrics.len();
        let mut values = vec![0.0; n * n];

        for i in 0..n {
            values[i * n + i] = 1.0;
            for j in (i + 1)..n {
                let similarity = dot(
                    &metrics[i].normalized_energy_vector,
                    &metrics[j].normalized_energy_vector,
                );
                values[i * n + j] = similarity;
                values[j * n + i] = similarity;
            }
        }

        Self {
            ids: metrics.iter().map(|m| m.id.clone()).collect(),
            values,
        }
    }

    /// Number of adapters
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Similarity by position
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.ids.len() + j]
    }

    /// Similarity by id
    pub fn similarity(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.ids.iter().position(|id| id == a)?;
        let j = self.ids.iter().position(|id| id == b)?;
        Some(self.get(i, j))
    }

    /// Adapter ids in row order
    pub fn ids(&self) -> &[String] {
        &self.ids
    }
}

fn dot(left: &[f64], right: &[f64]) -> f64 {
    left.iter().zip(right).map(|(a, b)| a * b).sum()
}

/// Allocation outcome for one adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationEntry {
    pub id: String,
    /// Canonical role
    pub role: Role,
    /// Budget-capped share before overlap damping (non-negative)
    pub base_allocation: f64,
    /// Highest similarity to another member of the same role
    pub max_overlap: f64,
    /// Damping applied to the base allocation
    pub overlap_factor: f64,
    /// Signed final strength
    pub final_strength: f64,
}

/// Per-adapter allocations, in input order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllocationReport {
    pub entries: Vec<AllocationEntry>,
}

impl AllocationReport {
    /// Mapping adapter id → final signed strength
    ///
    /// Ids are expected to be unique; a repeated id keeps its last entry.
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        self.entries
            .iter()
            .map(|e| (e.id.clone(), e.final_strength))
            .collect()
    }

    /// Final strength of one adapter
    pub fn strength_of(&self, id: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.final_strength)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AllocationEntry> {
        self.entries.iter()
    }
}

/// Role-budget / overlap allocator
#[derive(Debug, Clone, Default)]
pub struct RoleAllocator {
    config: AllocatorConfig,
}

impl RoleAllocator {
    /// Create an allocator
    pub fn new(config: AllocatorConfig) -> Self {
        Self { config }
    }

    /// Get the configuration
    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// Allocate final strengths
    ///
    /// All block vectors must have the same length.
    pub fn allocate(&self, inputs: &[EnergyInput]) -> Result<AllocationReport> {
        let span = span!(Level::DEBUG, "allocate", adapters = inputs.len());
        let _enter = span.enter();

        if let Some(first) = inputs.first() {
            let expected = first.block_weights.len();
            if let Some(input) = inputs.iter().find(|i| i.block_weights.len() != expected) {
                return Err(ComposeError::LengthMismatch {
                    id: input.id.clone(),
                    expected,
                    actual: input.block_weights.len(),
                });
            }
        }

        let metrics: Vec<EnergyMetrics> = inputs.iter().map(EnergyMetrics::compute).collect();
        Ok(self.allocate_metrics(&metrics))
    }

    /// Allocate from precomputed energy metrics
    pub fn allocate_metrics(&self, metrics: &[EnergyMetrics]) -> AllocationReport {
        let total_requested: f64 = metrics.iter().map(|m| m.raw_strength_factor.abs()).sum();

        if total_requested == 0.0 {
            debug!("Total requested strength is zero");
            return AllocationReport {
                entries: metrics
                    .iter()
                    .map(|m| AllocationEntry {
                        id: m.id.clone(),
                        role: m.role,
                        base_allocation: 0.0,
                        max_overlap: 0.0,
                        overlap_factor: 1.0,
                        final_strength: 0.0,
                    })
                    .collect(),
            };
        }

        let mut groups: BTreeMap<Role, Vec<usize>> = BTreeMap::new();
        for (i, m) in metrics.iter().enumerate() {
            groups.entry(m.role).or_default().push(i);
        }

        let mut base = vec![0.0; metrics.len()];
        for (role, members) in &groups {
            let cap = role.budget() * total_requested;
            let demand: f64 = members
                .iter()
                .map(|&i| metrics[i].raw_strength_factor.abs())
                .sum();
            let group_energy: f64 = members.iter().map(|&i| metrics[i].total_energy).sum();
            if group_energy == 0.0 {
                continue;
            }

            let allocatable = cap.min(demand);
            for &i in members {
                base[i] = allocatable * (metrics[i].total_energy / group_energy);
            }
            debug!(role = %role, cap, demand, allocatable, "Role budget");
        }

        let overlap = OverlapMatrix::build(metrics);
        let threshold = self.config.overlap_threshold;

        let mut entries = Vec::with_capacity(metrics.len());
        for (i, m) in metrics.iter().enumerate() {
            let peers = &groups[&m.role];
            let max_overlap = peers
                .iter()
                .filter(|&&j| j != i)
                .map(|&j| overlap.get(i, j))
                .fold(0.0_f64, f64::max);

            let overlap_factor = if max_overlap > threshold && max_overlap > 0.0 {
                threshold / max_overlap
            } else {
                1.0
            };

            let magnitude = base[i] * overlap_factor;
            let final_strength = if m.raw_strength_factor < 0.0 {
                -magnitude
            } else {
                magnitude
            };

            entries.push(AllocationEntry {
                id: m.id.clone(),
                role: m.role,
                base_allocation: base[i],
                max_overlap,
                overlap_factor,
                final_strength,
            });
        }

        AllocationReport { entries }
    }
}
