//! Lesion class taxonomy and risk policy.
//!
//! The class list is closed and ordered: the index assigned at training time
//! is the index consumed at inference time. Reordering or extending the list
//! invalidates every previously trained checkpoint.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A single lesion category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LesionClass {
    /// Short class code (e.g. "MEL")
    pub code: String,
    /// Human-readable description (e.g. "Melanoma")
    pub description: String,
}

/// Ordered, closed list of lesion classes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassTaxonomy {
    classes: Vec<LesionClass>,
}

impl Default for ClassTaxonomy {
    fn default() -> Self {
        Self::ham10000()
    }
}

impl ClassTaxonomy {
    /// The HAM10000 taxonomy: 7 classes, alphabetical by code.
    pub fn ham10000() -> Self {
        let classes = [
            ("AKIEC", "Actinic Keratoses"),
            ("BCC", "Basal Cell Carcinoma"),
            ("BKL", "Benign Keratosis"),
            ("DF", "Dermatofibroma"),
            ("MEL", "Melanoma"),
            ("NV", "Nevus"),
            ("VASC", "Vascular Lesions"),
        ]
        .iter()
        .map(|(code, description)| LesionClass {
            code: code.to_string(),
            description: description.to_string(),
        })
        .collect();

        Self { classes }
    }

    /// Number of classes.
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Class at the given label index.
    pub fn get(&self, index: usize) -> Option<&LesionClass> {
        self.classes.get(index)
    }

    /// Label index for a class code. Case-insensitive: metadata files carry
    /// lowercase codes while the API reports uppercase.
    pub fn index_of(&self, code: &str) -> Option<usize> {
        self.classes
            .iter()
            .position(|c| c.code.eq_ignore_ascii_case(code))
    }

    /// Ordered class codes.
    pub fn codes(&self) -> Vec<String> {
        self.classes.iter().map(|c| c.code.clone()).collect()
    }

    /// Iterate over the classes in label order.
    pub fn iter(&self) -> impl Iterator<Item = &LesionClass> {
        self.classes.iter()
    }

    /// Class at an index, or a descriptive error.
    pub fn require(&self, index: usize) -> Result<&LesionClass> {
        self.get(index).ok_or_else(|| {
            Error::Model(format!(
                "Class index {} out of range (taxonomy has {} classes)",
                index,
                self.classes.len()
            ))
        })
    }
}

/// Derived presentation label for a prediction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskTier::Low => write!(f, "LOW"),
            RiskTier::Medium => write!(f, "MEDIUM"),
            RiskTier::High => write!(f, "HIGH"),
        }
    }
}

/// Risk-tier mapping policy.
///
/// This is a presentation heuristic, not a clinical judgment: the class sets
/// and the confidence cutoff have no stated clinical derivation and are kept
/// configurable for that reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskPolicy {
    /// Codes that map to HIGH above the cutoff, MEDIUM below
    pub high_risk: Vec<String>,
    /// Codes that always map to MEDIUM
    pub medium_risk: Vec<String>,
    /// Confidence cutoff in percent for the high-risk set
    pub high_confidence_cutoff: f32,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            high_risk: vec!["MEL".into(), "BCC".into(), "AKIEC".into()],
            medium_risk: vec!["BKL".into()],
            high_confidence_cutoff: 70.0,
        }
    }
}

impl RiskPolicy {
    /// Map a top-1 class code and its confidence (percent) to a risk tier.
    pub fn risk_tier(&self, code: &str, confidence_pct: f32) -> RiskTier {
        if self.high_risk.iter().any(|c| c.eq_ignore_ascii_case(code)) {
            if confidence_pct > self.high_confidence_cutoff {
                RiskTier::High
            } else {
                RiskTier::Medium
            }
        } else if self
            .medium_risk
            .iter()
            .any(|c| c.eq_ignore_ascii_case(code))
        {
            RiskTier::Medium
        } else {
            RiskTier::Low
        }
    }
}
