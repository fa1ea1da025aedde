//! Lorascope Compose - Blending adapter block vectors
//!
//! Works on block vectors that have already been extracted and stored.
//!
//! # Overview
//!
//! - [`validate_compatibility`] checks that a set shares one base model and
//!   one layout, reporting each violated rule with the offending ids
//! - [`WeightedComposer`] blends a compatible set into combined model/clip
//!   vectors and A/B scalars
//! - [`RoleAllocator`] is an independent fairness pass: role budgets cap each
//!   group's share, then overlapping adapters within a role are damped
//!
//! Degenerate inputs (zero strengths, no clip contributors) produce warnings
//! on the result, never errors.

pub mod adapter;
pub mod allocator;
pub mod composer;
pub mod config;
pub mod error;
pub mod validator;

pub use adapter::{AdapterComposeInput, ComposeSettings};
pub use allocator::{
    AllocationEntry, AllocationReport, EnergyInput, EnergyMetrics, OverlapMatrix, ROLE_BUDGETS,
    Role, RoleAllocator, canonicalize_role,
};
pub use composer::{CombinedResult, ComposeWarning, WarningCode, WeightedComposer, canonical_csv};
pub use config::{AllocatorConfig, ComposerConfig};
pub use error::{ComposeError, Result};
pub use validator::{
    CompatibilityReport, IncompatibilityReason, ReasonCode, validate_compatibility,
};
