//! Record normalizer - assembles parsed fields into canonical products
//! and computes the derived comparison metrics.

use tracing::debug;

use crate::domain::model::{derive_key, Product, RawListing, RejectedRecord};
use crate::domain::parser::ParsedFields;
use crate::shared::types::{Category, Metal};

/// Outcome of normalization: a usable product, or a diagnostic record for
/// listings with neither a price nor a weight. Rejection is data, not an
/// error - the batch always continues.
#[derive(Debug, Clone)]
pub enum NormalizedRecord {
    Product(Product),
    Rejected(RejectedRecord),
}

/// Known coin purities applied when the page states none. Values are the
/// standard fineness of the named series, per mille.
const GOLD_COIN_PURITIES: &[(&str, u32)] = &[
    ("дукат", 986),
    ("dukat", 986),
    ("sovereign", 917),
    ("соверен", 917),
    ("napoleon", 900),
    ("наполеон", 900),
    ("krugerrand", 917),
    ("крюгерранд", 917),
    ("eagle", 917),
    ("игъл", 917),
    ("maple", 999),
    ("кленов лист", 999),
    ("philharmonic", 999),
    ("филхармони", 999),
    ("britannia", 999),
    ("британия", 999),
    ("kangaroo", 999),
    ("кенгуру", 999),
    ("panda", 999),
    ("панда", 999),
];

// Keyword stems, matched against word prefixes so that "кюлчета" or
// "moneti" count while "srebarna" does not trip over the "bar" stem.
const BAR_KEYWORDS: &[&str] = &["кюлче", "kyulche", "kulche", "слитъ", "ingot", "bar"];
const COIN_KEYWORDS: &[&str] = &["монет", "moneta", "moneti", "coin", "дукат", "dukat"];

pub struct Normalizer {
    eur_bgn_rate: Option<f64>,
}

impl Normalizer {
    pub fn new(eur_bgn_rate: Option<f64>) -> Self {
        Self { eur_bgn_rate }
    }

    pub fn normalize(&self, listing: &RawListing, parsed: ParsedFields) -> NormalizedRecord {
        let name = collapse_ws(&listing.title);
        let title_lower = name.to_lowercase();
        let category = classify(listing, &title_lower);

        let weight_grams = parsed
            .weight_grams
            .or_else(|| default_coin_weight(category, &title_lower));
        let purity_per_mille = parsed
            .purity_per_mille
            .or_else(|| default_purity(listing.metal, category, &title_lower));

        let fine_metal_grams = fine_metal(weight_grams, purity_per_mille, parsed.fine_weight_grams);

        // The dealer's ask is the acquisition price, so it stands in for a
        // missing standalone BGN price.
        let price_bgn = parsed.price_bgn.or(parsed.sell_price);
        let price_eur = parsed.price_eur;

        let price_basis = price_bgn.or_else(|| {
            price_eur
                .zip(self.eur_bgn_rate)
                .map(|(eur, rate)| eur * rate)
        });
        let price_per_fine_gram = price_per_gram(price_basis, fine_metal_grams);

        let (spread_pct, quote_flagged) = spread(parsed.buy_price, parsed.sell_price);

        let has_price = price_bgn.is_some()
            || price_eur.is_some()
            || parsed.buy_price.is_some()
            || parsed.sell_price.is_some();
        let has_weight = weight_grams.is_some() || fine_metal_grams.is_some();

        if !has_price && !has_weight {
            let reason = if parsed.is_empty() {
                "no numeric field matched".to_string()
            } else {
                "no usable price or weight".to_string()
            };
            debug!(url = %listing.url, %reason, "listing rejected");
            return NormalizedRecord::Rejected(RejectedRecord {
                name,
                url: listing.url.clone(),
                reason,
            });
        }

        NormalizedRecord::Product(Product {
            key: derive_key(&name, &listing.url),
            name,
            url: listing.url.clone(),
            metal: listing.metal,
            category,
            weight_grams,
            purity_per_mille,
            fine_metal_grams,
            price_bgn,
            price_eur,
            buy_price: parsed.buy_price,
            sell_price: parsed.sell_price,
            price_per_fine_gram,
            spread_pct,
            quote_flagged,
        })
    }
}

/// Priority-ordered decision list: URL path, then title keywords, then
/// page-text keyword frequency, then the fetcher's category hint. The first
/// decisive verdict wins; everything ambiguous stays `Unknown` so the
/// record is still emitted.
fn classify(listing: &RawListing, title_lower: &str) -> Category {
    classify_by_url(&listing.url)
        .or_else(|| classify_by_keywords(title_lower))
        .or_else(|| classify_by_frequency(&listing.page_text))
        .or(listing.category_hint)
        .unwrap_or(Category::Unknown)
}

fn classify_by_url(url: &str) -> Option<Category> {
    classify_by_keywords(&url.to_lowercase())
}

fn classify_by_keywords(haystack: &str) -> Option<Category> {
    if keyword_count(haystack, BAR_KEYWORDS) > 0 {
        return Some(Category::Bar);
    }
    if keyword_count(haystack, COIN_KEYWORDS) > 0 {
        return Some(Category::Coin);
    }
    None
}

fn classify_by_frequency(page_text: &str) -> Option<Category> {
    let text = page_text.to_lowercase();
    let bars = keyword_count(&text, BAR_KEYWORDS);
    let coins = keyword_count(&text, COIN_KEYWORDS);
    if bars > coins {
        Some(Category::Bar)
    } else if coins > bars {
        Some(Category::Coin)
    } else {
        None
    }
}

/// Words starting with any of the keyword stems. Expects a lowercased
/// haystack.
fn keyword_count(haystack: &str, stems: &[&str]) -> usize {
    haystack
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| stems.iter().any(|stem| word.starts_with(stem)))
        .count()
}

/// Standard weights of well-known coin series, used when the page states
/// no weight at all.
fn default_coin_weight(category: Category, title_lower: &str) -> Option<f64> {
    if category != Category::Coin {
        return None;
    }
    if title_lower.contains("дукат") || title_lower.contains("dukat") {
        if title_lower.contains("4 дукат") || title_lower.contains("4 dukat") {
            return Some(13.96);
        }
        return Some(3.49);
    }
    if title_lower.contains("sovereign") || title_lower.contains("соверен") {
        if title_lower.contains("half") || title_lower.contains("половин") {
            return Some(3.99);
        }
        return Some(7.99);
    }
    if title_lower.contains("napoleon") || title_lower.contains("наполеон") {
        return Some(5.81);
    }
    None
}

fn default_purity(metal: Metal, category: Category, title_lower: &str) -> Option<u32> {
    match metal {
        // Investment silver is uniformly fine.
        Metal::Silver => Some(999),
        Metal::Gold => {
            if category == Category::Coin {
                for (kw, purity) in GOLD_COIN_PURITIES {
                    if title_lower.contains(kw) {
                        return Some(*purity);
                    }
                }
            }
            if title_lower.contains("инвестиционно") || title_lower.contains("investment") {
                return Some(999);
            }
            None
        }
    }
}

/// Explicit fine content wins unless it contradicts the total weight;
/// otherwise weight x purity / 1000, rounded to 4 decimal places.
fn fine_metal(weight: Option<f64>, purity: Option<u32>, explicit: Option<f64>) -> Option<f64> {
    if let Some(fine) = explicit {
        match weight {
            Some(w) if fine > w => {}
            _ => return Some(fine),
        }
    }
    let (w, p) = (weight?, purity?);
    Some(round4(w * p as f64 / 1000.0))
}

fn price_per_gram(price: Option<f64>, fine: Option<f64>) -> Option<f64> {
    match (price, fine) {
        (Some(price), Some(fine)) if fine > 0.0 && price > 0.0 => Some(round2(price / fine)),
        _ => None,
    }
}

fn spread(buy: Option<f64>, sell: Option<f64>) -> (Option<f64>, bool) {
    match (buy, sell) {
        (Some(buy), Some(sell)) if sell > 0.0 => {
            let pct = round2((sell - buy) / sell * 100.0);
            (Some(pct), sell < buy)
        }
        _ => (None, false),
    }
}

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(crate) fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

pub(crate) fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}
