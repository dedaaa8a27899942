//! Ordered pattern-rule tables, one per extracted field.
//!
//! Rule precedence is data, not control flow: each table is a plain list
//! scanned top to bottom, so the precedence of any two patterns can be read
//! (and tested) directly. Within one rule, candidate matches are scanned
//! left to right and an extractor may decline a candidate - that is how a
//! rule refuses tokens that belong to another field (e.g. a fineness-looking
//! number trailed by a currency marker) without regex look-around.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::shared::types::TROY_OUNCE_GRAMS;

/// Numeric token: Bulgarian decimal comma or dot, spaces as thousands
/// separators. Non-breaking spaces are normalized away before matching.
const NUM: &str = r"(?P<v>\d[\d ]*(?:[.,]\d+)?)";

pub struct Rule {
    pub name: &'static str,
    pattern: Regex,
    extract: fn(&Captures) -> Option<f64>,
}

impl Rule {
    fn new(name: &'static str, pattern: String, extract: fn(&Captures) -> Option<f64>) -> Self {
        let pattern = Regex::new(&pattern)
            .unwrap_or_else(|e| panic!("invalid pattern for rule {name}: {e}"));
        Self {
            name,
            pattern,
            extract,
        }
    }

    /// First candidate match this rule accepts, scanning left to right.
    fn apply(&self, text: &str) -> Option<f64> {
        self.pattern
            .captures_iter(text)
            .find_map(|caps| (self.extract)(&caps))
    }
}

pub struct RuleSet {
    pub field: &'static str,
    rules: Vec<Rule>,
}

impl RuleSet {
    /// First-match-wins over the ordered rule list.
    pub fn first_match(&self, text: &str) -> Option<f64> {
        for rule in &self.rules {
            if let Some(value) = rule.apply(text) {
                tracing::trace!(field = self.field, rule = rule.name, value, "field matched");
                return Some(value);
            }
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Extractors
// ---------------------------------------------------------------------------

/// Parse a Bulgarian-formatted number: spaces are thousands separators,
/// comma or dot the decimal separator.
pub fn parse_decimal(s: &str) -> Option<f64> {
    let cleaned: String = s
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

fn value(caps: &Captures) -> Option<f64> {
    if caps.name("skip").is_some() {
        return None;
    }
    parse_decimal(caps.name("v")?.as_str())
}

fn positive(caps: &Captures) -> Option<f64> {
    value(caps).filter(|v| *v > 0.0)
}

fn ounces(caps: &Captures) -> Option<f64> {
    positive(caps).map(|v| v * TROY_OUNCE_GRAMS)
}

fn kilograms(caps: &Captures) -> Option<f64> {
    positive(caps).map(|v| v * 1000.0)
}

/// Fixed karat table with nearest-standard per-mille values. Off-table
/// karats are declined rather than guessed.
fn karat(caps: &Captures) -> Option<f64> {
    let k = caps.name("v")?.as_str().parse::<u32>().ok()?;
    let per_mille = match k {
        24 => 999,
        22 => 916,
        21 => 875,
        18 => 750,
        14 => 585,
        9 => 375,
        _ => return None,
    };
    Some(per_mille as f64)
}

/// Labelled purity values arrive in whichever magnitude the page used:
/// per mille (>= 100) or decimal fineness (< 1).
fn labelled_purity(caps: &Captures) -> Option<f64> {
    let v = value(caps)?;
    if v >= 100.0 && v <= 1000.0 {
        Some(v)
    } else if v > 0.0 && v < 1.0 {
        Some(v * 1000.0)
    } else {
        None
    }
}

fn fineness(caps: &Captures) -> Option<f64> {
    value(caps).map(|v| v * 1000.0)
}

// ---------------------------------------------------------------------------
// Rule tables
// ---------------------------------------------------------------------------

const GRAM_UNIT: &str = r"(?:грама|гр\.?|grams?|g\b)";
const OUNCE_UNIT: &str = r"(?:troy\s+ounces?|troy\s+oz|ozt\b|oz\b|унци(?:я|и)\b|унц\.?)";
const KILO_UNIT: &str = r"(?:кг|kg)\b";
const BGN_UNIT: &str = r"(?:лева|лв\.?|bgn\b)";
const EUR_UNIT: &str = r"(?:€|евро|eur\b)";
/// Amounts preceded by a quote label belong to the buy/sell fields.
const QUOTE_LABEL: &str = r"(?:\b(?P<skip>купуваме|изкупуваме|продаваме|buy|sell)\b[^0-9\n]{0,30})?";

static WEIGHT: Lazy<RuleSet> = Lazy::new(|| RuleSet {
    field: "weight",
    rules: vec![
        Rule::new(
            "labelled_ounces",
            format!(r"(?i)\b(?:тегло|грамаж|weight)[^0-9\n]{{0,20}}{NUM}\s*{OUNCE_UNIT}"),
            ounces,
        ),
        Rule::new(
            "labelled_kilograms",
            format!(r"(?i)\b(?:тегло|грамаж|weight)[^0-9\n]{{0,20}}{NUM}\s*{KILO_UNIT}"),
            kilograms,
        ),
        Rule::new(
            "labelled_grams",
            format!(
                r"(?i)\b(?:общо\s+)?(?:тегло|грамаж|weight)[^0-9\n]{{0,20}}{NUM}(?:\s*{GRAM_UNIT})?"
            ),
            positive,
        ),
        Rule::new("bare_ounces", format!(r"(?i){NUM}\s*{OUNCE_UNIT}"), ounces),
        Rule::new(
            "bare_kilograms",
            format!(r"(?i){NUM}\s*{KILO_UNIT}"),
            kilograms,
        ),
        Rule::new("bare_grams", format!(r"(?i){NUM}\s*{GRAM_UNIT}"), positive),
    ],
});

static FINE_WEIGHT: Lazy<RuleSet> = Lazy::new(|| RuleSet {
    field: "fine_weight",
    rules: vec![Rule::new(
        "labelled_fine_content",
        format!(
            r"(?i)\b(?:чисто\s+(?:злато|сребро)|fine\s+(?:gold|silver|metal)(?:\s+content)?)[^0-9\n]{{0,20}}{NUM}(?:\s*{GRAM_UNIT})?"
        ),
        positive,
    )],
});

static PURITY: Lazy<RuleSet> = Lazy::new(|| RuleSet {
    field: "purity",
    rules: vec![
        Rule::new(
            "per_mille_fraction",
            r"(?P<v>\d{3}(?:[.,]\d+)?)\s*/\s*1000".to_string(),
            value,
        ),
        Rule::new(
            "karat",
            r"(?i)\b(?P<v>\d{1,2})\s*(?:k\b|к\b|карата?\b|carats?\b|ct\b)".to_string(),
            karat,
        ),
        Rule::new(
            "labelled_purity",
            format!(r"(?i)\b(?:проба|чистота|финес|fineness|purity)[^0-9\n]{{0,10}}{NUM}"),
            labelled_purity,
        ),
        Rule::new(
            "decimal_fineness",
            r"\b(?P<v>0[.,]\d{2,4})\b".to_string(),
            fineness,
        ),
        // Common fineness constants as they appear mid-sentence. A candidate
        // trailed by a currency marker or a decimal continuation is a price
        // fragment and is declined.
        Rule::new(
            "bare_standard_fineness",
            format!(
                r"(?i)\b(?P<v>999[.,]9|916[.,][67]|999|995|986|958|925|900|875|750|585|375)\b(?:\s*(?P<skip>{BGN_UNIT}|{EUR_UNIT}|[.,]\d))?"
            ),
            value,
        ),
    ],
});

static PRICE_BGN: Lazy<RuleSet> = Lazy::new(|| RuleSet {
    field: "price_bgn",
    rules: vec![Rule::new(
        "amount_with_bgn_marker",
        format!(r"(?i){QUOTE_LABEL}{NUM}\s*{BGN_UNIT}"),
        value,
    )],
});

static PRICE_EUR: Lazy<RuleSet> = Lazy::new(|| RuleSet {
    field: "price_eur",
    rules: vec![Rule::new(
        "amount_with_eur_marker",
        format!(r"(?i){QUOTE_LABEL}{NUM}\s*{EUR_UNIT}"),
        value,
    )],
});

static BUY_PRICE: Lazy<RuleSet> = Lazy::new(|| RuleSet {
    field: "buy_price",
    rules: vec![Rule::new(
        "labelled_buy_quote",
        format!(
            r"(?i)\b(?:купуваме|изкупуваме|buy)\b[^0-9\n]{{0,30}}{NUM}(?:\s*(?:{BGN_UNIT}|{EUR_UNIT}))?"
        ),
        value,
    )],
});

static SELL_PRICE: Lazy<RuleSet> = Lazy::new(|| RuleSet {
    field: "sell_price",
    rules: vec![Rule::new(
        "labelled_sell_quote",
        format!(
            r"(?i)\b(?:продаваме|sell)\b[^0-9\n]{{0,30}}{NUM}(?:\s*(?:{BGN_UNIT}|{EUR_UNIT}))?"
        ),
        value,
    )],
});

pub fn weight_rules() -> &'static RuleSet {
    &WEIGHT
}

pub fn fine_weight_rules() -> &'static RuleSet {
    &FINE_WEIGHT
}

pub fn purity_rules() -> &'static RuleSet {
    &PURITY
}

pub fn price_bgn_rules() -> &'static RuleSet {
    &PRICE_BGN
}

pub fn price_eur_rules() -> &'static RuleSet {
    &PRICE_EUR
}

pub fn buy_price_rules() -> &'static RuleSet {
    &BUY_PRICE
}

pub fn sell_price_rules() -> &'static RuleSet {
    &SELL_PRICE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_handles_bulgarian_formats() {
        assert_eq!(parse_decimal("6,45"), Some(6.45));
        assert_eq!(parse_decimal("5 838,00"), Some(5838.0));
        assert_eq!(parse_decimal("31.1"), Some(31.1));
        assert_eq!(parse_decimal(""), None);
        assert_eq!(parse_decimal("1.234.56"), None);
    }

    #[test]
    fn rule_order_is_most_specific_first() {
        // A labelled ounce weight must not be read as grams by the
        // label rule that follows it in the table.
        let w = weight_rules().first_match("Тегло: 2 унции");
        assert!((w.unwrap() - 2.0 * TROY_OUNCE_GRAMS).abs() < 0.001);
    }

    #[test]
    fn karat_declines_off_table_values() {
        assert_eq!(purity_rules().first_match("11K"), None);
    }

    #[test]
    fn kilogram_weights_converted() {
        assert_eq!(weight_rules().first_match("Кюлче 1 кг"), Some(1000.0));
    }

    #[test]
    fn zero_weight_declined() {
        assert_eq!(weight_rules().first_match("Тегло: 0 гр."), None);
    }

    #[test]
    fn labelled_purity_magnitudes() {
        assert_eq!(purity_rules().first_match("Проба: 986"), Some(986.0));
        assert_eq!(purity_rules().first_match("Fineness: 0.925"), Some(925.0));
    }
}
