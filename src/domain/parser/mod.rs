//! Field parser - extracts weight, purity, fine-metal content and prices
//! from free-form listing text.
//!
//! Each field has an ordered table of (pattern, extractor) rules; the first
//! rule that matches and whose extractor accepts the capture wins. Rules are
//! ordered most-specific to least-specific so that, for example, a bare
//! fineness number never consumes a price token. Parsing is pure and never
//! fails: an unmatched field is simply `None`.

pub mod rules;

use serde::Serialize;

/// All-optional extraction result. `fine_weight_grams` is the explicitly
/// stated fine content; the normalizer computes it from weight and purity
/// when absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParsedFields {
    pub weight_grams: Option<f64>,
    pub purity_per_mille: Option<u32>,
    pub fine_weight_grams: Option<f64>,
    pub price_bgn: Option<f64>,
    pub price_eur: Option<f64>,
    pub buy_price: Option<f64>,
    pub sell_price: Option<f64>,
}

impl ParsedFields {
    /// True when no numeric field matched at all - the caller's signal for
    /// a totally unparsable listing.
    pub fn is_empty(&self) -> bool {
        self.weight_grams.is_none()
            && self.purity_per_mille.is_none()
            && self.fine_weight_grams.is_none()
            && self.price_bgn.is_none()
            && self.price_eur.is_none()
            && self.buy_price.is_none()
            && self.sell_price.is_none()
    }
}

pub struct FieldParser;

impl FieldParser {
    pub fn parse(raw_text: &str) -> ParsedFields {
        // Non-breaking spaces show up as thousands separators on the site.
        let text = raw_text.replace('\u{a0}', " ");

        ParsedFields {
            weight_grams: rules::weight_rules().first_match(&text),
            purity_per_mille: rules::purity_rules()
                .first_match(&text)
                .map(|v| (v.round() as u32).min(1000)),
            fine_weight_grams: rules::fine_weight_rules().first_match(&text),
            price_bgn: rules::price_bgn_rules().first_match(&text),
            price_eur: rules::price_eur_rules().first_match(&text),
            buy_price: rules::buy_price_rules().first_match(&text),
            sell_price: rules::sell_price_rules().first_match(&text),
        }
    }
}
