//! # Taxonomy
//!
//! The category enumeration, its base-score table, and the keyword table used
//! to classify labels, bundled as one versioned value.
//!
//! Deployments disagree on whether trains and subways are their own categories
//! or part of `public_transport`, so the choice is made here, explicitly, and
//! the chosen `version` travels into health output and logs.
//!
//! - Two presets ship with the crate: `merged` and `extended`.
//! - A TOML file can replace them entirely (see `config/taxonomy.example.toml`).
//! - Rule order is keyword priority: the first rule with a keyword contained in
//!   the normalized label wins.
//!
//! Lookup order when loading: `$ECOSCAN_TAXONOMY_PATH` → `config/taxonomy.toml`
//! → preset named by `$ECOSCAN_TAXONOMY` (default `extended`).

use anyhow::{anyhow, Context};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::errors::{EcoError, Result};

pub const ENV_TAXONOMY_PATH: &str = "ECOSCAN_TAXONOMY_PATH";
pub const ENV_TAXONOMY_PRESET: &str = "ECOSCAN_TAXONOMY";
pub const DEFAULT_TAXONOMY_PATH: &str = "config/taxonomy.toml";

pub const DEFAULT_BASE_SCORE: u32 = 10;
pub const DEFAULT_FALLBACK_CONFIDENCE: f64 = 0.5;

/// Canonical sustainability classification of one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Bike,
    PublicTransport,
    Rideshare,
    ReusableContainer,
    Unsustainable,
    Train,
    Subway,
    Ship,
    Helicopter,
    Airplane,
    Motorcycle,
}

impl Category {
    pub const ALL: [Category; 11] = [
        Category::Bike,
        Category::PublicTransport,
        Category::Rideshare,
        Category::ReusableContainer,
        Category::Unsustainable,
        Category::Train,
        Category::Subway,
        Category::Ship,
        Category::Helicopter,
        Category::Airplane,
        Category::Motorcycle,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Bike => "bike",
            Category::PublicTransport => "public_transport",
            Category::Rideshare => "rideshare",
            Category::ReusableContainer => "reusable_container",
            Category::Unsustainable => "unsustainable",
            Category::Train => "train",
            Category::Subway => "subway",
            Category::Ship => "ship",
            Category::Helicopter => "helicopter",
            Category::Airplane => "airplane",
            Category::Motorcycle => "motorcycle",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = EcoError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| EcoError::invalid("category", format!("unknown category {s:?}")))
    }
}

/// One row of the taxonomy: a category, its base score, and the keywords
/// that select it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub category: Category,
    pub base_score: u32,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Taxonomy {
    pub version: String,
    #[serde(default = "default_base_score")]
    pub default_base_score: u32,
    #[serde(default = "default_fallback_confidence")]
    pub fallback_confidence: f64,
    pub rules: Vec<CategoryRule>,
}

fn default_base_score() -> u32 {
    DEFAULT_BASE_SCORE
}

fn default_fallback_confidence() -> f64 {
    DEFAULT_FALLBACK_CONFIDENCE
}

fn rule(category: Category, base_score: u32, keywords: &[&str]) -> CategoryRule {
    CategoryRule {
        category,
        base_score,
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
    }
}

impl Taxonomy {
    /// Five core categories; rail and metro fold into `public_transport`.
    pub fn merged() -> Self {
        Self {
            version: "merged-v1".into(),
            default_base_score: DEFAULT_BASE_SCORE,
            fallback_confidence: DEFAULT_FALLBACK_CONFIDENCE,
            rules: vec![
                rule(
                    Category::PublicTransport,
                    80,
                    &[
                        "subway",
                        "metro",
                        "train",
                        "locomotive",
                        "passenger car",
                        "trolleybus",
                        "bus",
                        "streetcar",
                        "tramcar",
                    ],
                ),
                // Keeps motorised two-wheelers away from the `bike` keywords.
                rule(
                    Category::Unsustainable,
                    10,
                    &["motorbike", "minibike", "moped", "motor scooter"],
                ),
                rule(
                    Category::Bike,
                    90,
                    &["bicycle", "bike", "tricycle", "unicycle"],
                ),
                rule(
                    Category::Rideshare,
                    70,
                    &["carpool", "car", "cab", "taxi", "uber"],
                ),
                rule(
                    Category::ReusableContainer,
                    60,
                    &["cup", "mug", "tumbler", "thermos", "water bottle"],
                ),
            ],
        }
    }

    /// All eleven categories with their own base scores.
    pub fn extended() -> Self {
        Self {
            version: "extended-v2".into(),
            default_base_score: DEFAULT_BASE_SCORE,
            fallback_confidence: DEFAULT_FALLBACK_CONFIDENCE,
            rules: vec![
                rule(Category::Subway, 87, &["subway", "metro"]),
                rule(
                    Category::Train,
                    88,
                    &["train", "locomotive", "passenger car", "freight car"],
                ),
                rule(
                    Category::PublicTransport,
                    80,
                    &["trolleybus", "bus", "streetcar", "tramcar"],
                ),
                rule(
                    Category::Airplane,
                    15,
                    &["airliner", "airplane", "aeroplane", "warplane", "military plane"],
                ),
                rule(Category::Helicopter, 20, &["helicopter"]),
                rule(
                    Category::Ship,
                    30,
                    &["ship", "boat", "ferry", "ocean liner", "cruise", "yacht"],
                ),
                rule(
                    Category::Motorcycle,
                    50,
                    &["motorcycle", "motorbike", "minibike", "moped", "motor scooter"],
                ),
                rule(
                    Category::Bike,
                    90,
                    &["bicycle", "bike", "tricycle", "unicycle"],
                ),
                rule(
                    Category::Rideshare,
                    70,
                    &["carpool", "car", "cab", "taxi", "uber"],
                ),
                rule(
                    Category::ReusableContainer,
                    60,
                    &["cup", "mug", "tumbler", "thermos", "water bottle"],
                ),
                rule(Category::Unsustainable, 10, &[]),
            ],
        }
    }

    pub fn preset(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "merged" | "merged-v1" => Some(Self::merged()),
            "extended" | "extended-v2" => Some(Self::extended()),
            _ => None,
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut tax: Taxonomy = toml::from_str(s).map_err(|e| EcoError::Taxonomy {
            details: e.to_string(),
        })?;
        tax.normalize_keywords();
        tax.validate()?;
        Ok(tax)
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |details: String| -> Result<()> { Err(EcoError::Taxonomy { details }) };

        if self.version.trim().is_empty() {
            return fail("version must not be empty".into());
        }
        if !(0.0..=1.0).contains(&self.fallback_confidence) {
            return fail(format!(
                "fallback_confidence {} outside [0, 1]",
                self.fallback_confidence
            ));
        }
        let mut seen = HashSet::new();
        for r in &self.rules {
            if !seen.insert(r.category) {
                return fail(format!("category {} listed twice", r.category));
            }
            if r.keywords.iter().any(|k| normalize_label(k).is_empty()) {
                return fail(format!("category {} has a blank keyword", r.category));
            }
        }
        Ok(())
    }

    fn normalize_keywords(&mut self) {
        for r in &mut self.rules {
            for k in &mut r.keywords {
                *k = normalize_label(k);
            }
        }
    }

    /// Base score for `category`; categories without a rule get the default.
    pub fn base_score(&self, category: Category) -> u32 {
        self.rules
            .iter()
            .find(|r| r.category == category)
            .map(|r| r.base_score)
            .unwrap_or(self.default_base_score)
    }

    /// First rule (in priority order) with a keyword contained in `label`.
    /// `label` must already be normalized with [`normalize_label`].
    pub fn classify(&self, label: &str) -> Option<Category> {
        self.rules
            .iter()
            .find(|r| r.keywords.iter().any(|k| label.contains(k.as_str())))
            .map(|r| r.category)
    }
}

/// Lowercase, turn `_`/`-`/`,` into spaces, and collapse whitespace.
pub fn normalize_label(raw: &str) -> String {
    static RE_SEP: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s_\-,]+").expect("separator regex"));
    let lower = raw.to_lowercase();
    RE_SEP.replace_all(lower.trim(), " ").trim().to_string()
}

/// Load a taxonomy from a TOML file.
pub fn load_taxonomy_from(path: &Path) -> anyhow::Result<Taxonomy> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading taxonomy from {}", path.display()))?;
    Taxonomy::from_toml_str(&content).with_context(|| format!("parsing {}", path.display()))
}

/// Load the taxonomy using env vars + fallbacks:
/// 1) $ECOSCAN_TAXONOMY_PATH
/// 2) config/taxonomy.toml
/// 3) preset from $ECOSCAN_TAXONOMY (default `extended`)
pub fn load_taxonomy_default() -> anyhow::Result<Taxonomy> {
    if let Ok(p) = std::env::var(ENV_TAXONOMY_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_taxonomy_from(&pb);
        }
        return Err(anyhow!("{ENV_TAXONOMY_PATH} points to non-existent path"));
    }
    let default_p = PathBuf::from(DEFAULT_TAXONOMY_PATH);
    if default_p.exists() {
        return load_taxonomy_from(&default_p);
    }
    let name = std::env::var(ENV_TAXONOMY_PRESET).unwrap_or_else(|_| "extended".into());
    Taxonomy::preset(&name).ok_or_else(|| anyhow!("unknown taxonomy preset {name:?}"))
}
