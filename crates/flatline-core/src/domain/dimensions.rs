//! Named numeric dimensions fed to the parametric template.
//!
//! The job reads this as a flat JSON object (`dims.json`) and looks values up
//! by parameter name; missing keys fall back to the template's own defaults.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::errors::{FlowError, FlowResult};

pub const LENGTH_SCREWS: &str = "Length_Screws";
pub const WIDTH_SCREWS: &str = "Width_Screws";
pub const LENGTH: &str = "Length";
pub const WIDTH: &str = "Width";
pub const HEIGHT: &str = "Height";

/// Smallest panel edge the template can produce (mm).
pub const MIN_EDGE_MM: f64 = 100.0;

const COUNTS: [&str; 2] = [LENGTH_SCREWS, WIDTH_SCREWS];
const EDGES: [&str; 3] = [LENGTH, WIDTH, HEIGHT];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dimensions(BTreeMap<String, f64>);

impl Default for Dimensions {
    fn default() -> Self {
        let mut values = BTreeMap::new();
        values.insert(LENGTH_SCREWS.to_string(), 4.0);
        values.insert(WIDTH_SCREWS.to_string(), 4.0);
        values.insert(LENGTH.to_string(), 200.0);
        values.insert(WIDTH.to_string(), 400.0);
        values.insert(HEIGHT.to_string(), 100.0);
        Self(values)
    }
}

impl Dimensions {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn set(&mut self, name: impl Into<String>, value: f64) {
        self.0.insert(name.into(), value);
    }

    /// Apply `NAME=VALUE` overrides on top of the current values.
    pub fn apply_overrides<S: AsRef<str>>(&mut self, overrides: &[S]) -> FlowResult<()> {
        for raw in overrides {
            let raw = raw.as_ref();
            let (name, value) = raw
                .split_once('=')
                .ok_or_else(|| FlowError::InvalidDimension(format!("expected NAME=VALUE, got {raw:?}")))?;
            let name = name.trim();
            if name.is_empty() {
                return Err(FlowError::InvalidDimension(format!("empty name in {raw:?}")));
            }
            let value: f64 = value.trim().parse().map_err(|_| {
                FlowError::InvalidDimension(format!("{name}: {value:?} is not a number"))
            })?;
            self.set(name, value);
        }
        Ok(())
    }

    /// Reject values the template cannot regenerate.
    pub fn validate(&self) -> FlowResult<()> {
        for (name, value) in &self.0 {
            if !value.is_finite() {
                return Err(FlowError::InvalidDimension(format!("{name} must be finite")));
            }
        }
        for name in COUNTS {
            if let Some(v) = self.get(name)
                && (v < 1.0 || v.fract() != 0.0)
            {
                return Err(FlowError::InvalidDimension(format!(
                    "{name} must be a positive whole number, got {v}"
                )));
            }
        }
        for name in EDGES {
            if let Some(v) = self.get(name)
                && v < MIN_EDGE_MM
            {
                return Err(FlowError::InvalidDimension(format!(
                    "{name} must be >= {MIN_EDGE_MM} mm, got {v}"
                )));
            }
        }
        Ok(())
    }

    pub async fn load(path: impl AsRef<Path>) -> FlowResult<Self> {
        let bytes = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn write_to(&self, path: impl AsRef<Path>) -> FlowResult<()> {
        let json = serde_json::to_vec_pretty(self)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn defaults_are_valid() {
        let dims = Dimensions::default();
        dims.validate().unwrap();
        assert_eq!(dims.get(WIDTH), Some(400.0));
    }

    #[test]
    fn overrides_replace_and_extend() {
        let mut dims = Dimensions::default();
        dims.apply_overrides(&["Length=250", " Lid_Thickness = 3.5 "]).unwrap();
        assert_eq!(dims.get(LENGTH), Some(250.0));
        assert_eq!(dims.get("Lid_Thickness"), Some(3.5));
    }

    #[rstest]
    #[case::missing_eq("Length")]
    #[case::empty_name("=3")]
    #[case::not_a_number("Length=long")]
    fn malformed_overrides_are_rejected(#[case] raw: &str) {
        let mut dims = Dimensions::default();
        assert!(matches!(
            dims.apply_overrides(&[raw]),
            Err(FlowError::InvalidDimension(_))
        ));
    }

    #[rstest]
    #[case::zero_screws(LENGTH_SCREWS, 0.0)]
    #[case::fractional_screws(WIDTH_SCREWS, 2.5)]
    #[case::short_edge(HEIGHT, 99.0)]
    #[case::nan(LENGTH, f64::NAN)]
    fn out_of_range_values_fail_validation(#[case] name: &str, #[case] value: f64) {
        let mut dims = Dimensions::default();
        dims.set(name, value);
        assert!(dims.validate().is_err());
    }

    #[tokio::test]
    async fn written_file_is_a_flat_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dims.json");

        let mut dims = Dimensions::default();
        dims.set(HEIGHT, 150.0);
        dims.write_to(&path).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["Height"], 150.0);

        let loaded = Dimensions::load(&path).await.unwrap();
        assert_eq!(loaded, dims);
    }
}
