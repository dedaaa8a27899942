//! Core data model - products, observations, and derived report types

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::shared::types::{Category, Metal};

/// One listing payload handed over by the fetch layer: fully materialized
/// text, no live I/O handles.
#[derive(Debug, Clone)]
pub struct RawListing {
    pub url: String,
    pub title: String,
    pub page_text: String,
    pub metal: Metal,
    pub category_hint: Option<Category>,
}

/// A normalized product record. All prices are per unit, not per gram;
/// `price_per_fine_gram` is the comparison metric derived from them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub key: String,
    pub name: String,
    pub url: String,
    pub metal: Metal,
    pub category: Category,
    pub weight_grams: Option<f64>,
    pub purity_per_mille: Option<u32>,
    pub fine_metal_grams: Option<f64>,
    pub price_bgn: Option<f64>,
    pub price_eur: Option<f64>,
    pub buy_price: Option<f64>,
    pub sell_price: Option<f64>,
    pub price_per_fine_gram: Option<f64>,
    pub spread_pct: Option<f64>,
    /// Set when the dealer quoted buy above sell; the record is kept.
    pub quote_flagged: bool,
}

/// A listing that yielded neither a price nor a weight. Kept on a side
/// list for diagnostics, never merged into the product set.
#[derive(Debug, Clone, Serialize)]
pub struct RejectedRecord {
    pub name: String,
    pub url: String,
    pub reason: String,
}

/// One product snapshot on one UTC calendar date. Identity is
/// (product key, date); a re-scrape of the same date replaces the row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub date: NaiveDate,
    pub product: Product,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// Price moved past the configured threshold.
    Moved,
    /// Newly present in the top-N (rank_previous is None).
    Entered,
    /// Left the top-N (rank_current is None).
    Dropped,
}

/// Day-over-day ranking change, computed on demand and handed straight to
/// the notification layer. Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub product_key: String,
    pub name: String,
    pub previous_price_per_gram: Option<f64>,
    pub current_price_per_gram: Option<f64>,
    pub pct_change: Option<f64>,
    pub rank_previous: Option<usize>,
    pub rank_current: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Increasing => "increasing",
            Trend::Decreasing => "decreasing",
            Trend::Stable => "stable",
        }
    }
}

/// Cheapest per-gram observation anywhere in a reporting period.
#[derive(Debug, Clone, Serialize)]
pub struct BestDeal {
    pub product_key: String,
    pub name: String,
    pub price_per_gram: f64,
    pub date: NaiveDate,
}

/// Weekly/monthly aggregate over the daily top-N snapshots.
#[derive(Debug, Clone, Serialize)]
pub struct StatisticsReport {
    pub metal: Metal,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub days_with_data: usize,
    pub mean_price_per_gram: f64,
    pub stdev_price_per_gram: f64,
    pub trend: Trend,
    pub best_deal: Option<BestDeal>,
    /// Present only when a spot price and EUR->BGN rate were supplied.
    pub premium_over_spot_pct: Option<f64>,
}

/// Spot price for one metal, already converted to EUR per gram.
#[derive(Debug, Clone, Copy)]
pub struct SpotPrice {
    pub metal: Metal,
    pub eur_per_gram: f64,
}

/// Stable product key: the site-assigned URL slug when present, a slug of
/// the product name otherwise. Lexicographic order of keys is the ranking
/// tie-break, so keys must be deterministic.
pub fn derive_key(name: &str, url: &str) -> String {
    let path = strip_origin(url).trim_matches('/');
    if !path.is_empty() {
        return slugify(path);
    }
    slugify(name)
}

fn strip_origin(url: &str) -> &str {
    match url.split_once("://") {
        Some((_, rest)) => match rest.find('/') {
            Some(idx) => &rest[idx..],
            None => "",
        },
        None => url,
    }
}

fn slugify(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_dash = true;
    for ch in s.to_lowercase().chars() {
        if ch.is_alphanumeric() {
            out.push(ch);
            prev_dash = false;
        } else if !prev_dash {
            out.push('-');
            prev_dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_prefers_url_slug() {
        let key = derive_key("Кюлче 10 гр.", "https://igold.bg/zlatno-kyulche-10g");
        assert_eq!(key, "zlatno-kyulche-10g");
    }

    #[test]
    fn key_falls_back_to_name() {
        assert_eq!(derive_key("Gold Bar 10 g", "https://igold.bg/"), "gold-bar-10-g");
        assert_eq!(derive_key("Gold Bar 10 g", ""), "gold-bar-10-g");
    }

    #[test]
    fn key_is_stable_for_relative_urls() {
        assert_eq!(
            derive_key("x", "/zlatna-moneta-krugerrand"),
            derive_key("y", "https://igold.bg/zlatna-moneta-krugerrand")
        );
    }

    #[test]
    fn slug_collapses_punctuation() {
        assert_eq!(slugify("Злато -- 999,9 (проба)"), "злато-999-9-проба");
    }
}
