//! Layout command

use super::print_json;
use lorascope_core::{BlockLayout, LayoutFamily};
use serde::Serialize;

/// Resolved layout details
#[derive(Debug, Serialize)]
pub struct LayoutInfo {
    pub identifier: String,
    pub family: LayoutFamily,
    pub expected_block_count: usize,
    pub supports_ab: bool,
}

impl From<&BlockLayout> for LayoutInfo {
    fn from(layout: &BlockLayout) -> Self {
        Self {
            identifier: layout.identifier().to_string(),
            family: layout.family(),
            expected_block_count: layout.expected_block_count(),
            supports_ab: layout.supports_ab(),
        }
    }
}

pub fn run(raw: &str, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let layout = match raw.parse::<BlockLayout>() {
        Ok(layout) => layout,
        Err(e) => {
            if json {
                print_json(&serde_json::Value::Null)?;
            } else {
                println!("{e}");
                println!("No layout.");
            }
            return Ok(());
        }
    };

    let info = LayoutInfo::from(&layout);
    if json {
        print_json(&info)?;
        return Ok(());
    }

    println!("Layout: {}", info.identifier);
    println!("==============================");
    println!("Family:      {}", info.family.display_name());
    println!("Blocks:      {}", info.expected_block_count);
    println!("A/B scalars: {}", if info.supports_ab { "yes" } else { "no" });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_info() {
        let layout = BlockLayout::resolve("Flux_Double_57").unwrap();
        let info = LayoutInfo::from(&layout);
        assert_eq!(info.identifier, "flux_double_57");
        assert_eq!(info.expected_block_count, 57);
        assert!(info.supports_ab);

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["family"], "flux_double");
    }
}
