//! AQI severity bands.
//!
//! Breakpoints, inclusive on the lower band:
//!   0..=50 good, 51..=100 moderate, 101..=150 unhealthy for sensitive
//!   groups, 151..=200 unhealthy, above 200 hazardous.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AqiCategory {
    Good,
    Moderate,
    UnhealthyForSensitiveGroups,
    Unhealthy,
    Hazardous,
}

impl AqiCategory {
    pub fn from_index(index: u32) -> Self {
        match index {
            0..=50 => AqiCategory::Good,
            51..=100 => AqiCategory::Moderate,
            101..=150 => AqiCategory::UnhealthyForSensitiveGroups,
            151..=200 => AqiCategory::Unhealthy,
            _ => AqiCategory::Hazardous,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AqiCategory::Good => "good",
            AqiCategory::Moderate => "moderate",
            AqiCategory::UnhealthyForSensitiveGroups => "unhealthy for sensitive groups",
            AqiCategory::Unhealthy => "unhealthy",
            AqiCategory::Hazardous => "hazardous",
        }
    }

    pub fn recommendation(self) -> &'static str {
        match self {
            AqiCategory::Good => {
                "Air is clean. Walks and outdoor exercise are fine."
            }
            AqiCategory::Moderate => {
                "Moderate pollution. People with respiratory conditions should take care."
            }
            AqiCategory::UnhealthyForSensitiveGroups => {
                "Children, older adults and people with asthma should limit time outdoors."
            }
            AqiCategory::Unhealthy => {
                "Everyone should limit time outdoors, wear a mask and keep windows closed."
            }
            AqiCategory::Hazardous => {
                "Dangerous level. Stay indoors and run an air purifier."
            }
        }
    }
}

impl fmt::Display for AqiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}
