//! Subcommand implementations

pub mod allocate;
pub mod combine;
pub mod inspect;
pub mod keys;
pub mod layout;

use serde::Serialize;

/// Print a value as pretty JSON
pub fn print_json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Comma-joined weights with fixed decimals
pub fn format_weights(weights: &[f64], digits: usize) -> String {
    weights
        .iter()
        .map(|w| format!("{w:.digits$}"))
        .collect::<Vec<_>>()
        .join(", ")
}
