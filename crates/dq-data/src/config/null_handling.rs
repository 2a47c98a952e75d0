//! Missing-value markers recognized while reading uploads

use serde::{Deserialize, Serialize};

/// Tokens read as a missing cell. Matching is exact unless configured
/// otherwise, so `"NA"` is null but `"Na"` is data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NullConfig {
    pub markers: Vec<String>,

    /// Trim surrounding whitespace before matching
    pub trim_whitespace: bool,

    pub case_sensitive: bool,
}

const DEFAULT_MARKERS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

impl Default for NullConfig {
    fn default() -> Self {
        Self {
            markers: DEFAULT_MARKERS.iter().map(|m| m.to_string()).collect(),
            trim_whitespace: false,
            case_sensitive: true,
        }
    }
}

impl NullConfig {
    pub fn is_null(&self, value: &str) -> bool {
        let value = if self.trim_whitespace { value.trim() } else { value };

        self.markers.iter().any(|marker| {
            if self.case_sensitive {
                value == marker
            } else {
                value.eq_ignore_ascii_case(marker)
            }
        })
    }

    pub fn add_marker(&mut self, marker: impl Into<String>) {
        let marker = marker.into();
        if !self.markers.contains(&marker) {
            self.markers.push(marker);
        }
    }
}
