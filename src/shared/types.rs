//! Common types used across the application

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Grams per troy ounce, used wherever ounce-denominated values appear.
pub const TROY_OUNCE_GRAMS: f64 = 31.103_476_8;

/// Metal kind of a tracked product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metal {
    Gold,
    Silver,
}

impl Metal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metal::Gold => "gold",
            Metal::Silver => "silver",
        }
    }

    /// Market-data symbol for the metal (XAU/XAG).
    pub fn spot_symbol(&self) -> &'static str {
        match self {
            Metal::Gold => "XAU",
            Metal::Silver => "XAG",
        }
    }
}

impl fmt::Display for Metal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gold" => Ok(Metal::Gold),
            "silver" => Ok(Metal::Silver),
            other => Err(format!("unknown metal: {other}")),
        }
    }
}

/// Product form factor. `Unknown` records are kept so unclassified
/// inventory stays visible in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Bar,
    Coin,
    Unknown,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Bar => "bar",
            Category::Coin => "coin",
            Category::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bar" => Ok(Category::Bar),
            "coin" => Ok(Category::Coin),
            "unknown" => Ok(Category::Unknown),
            other => Err(format!("unknown category: {other}")),
        }
    }
}
