//! Spot price client - XAU/EUR and XAG/EUR quotes from the market data API,
//! converted to EUR per gram for premium-over-spot reporting.

use reqwest::Client;
use serde_json::Value;
use tracing::info;

use crate::domain::model::SpotPrice;
use crate::shared::errors::MarketError;
use crate::shared::types::{Metal, TROY_OUNCE_GRAMS};

pub struct SpotPriceClient {
    client: Client,
    api_base: String,
}

impl SpotPriceClient {
    pub fn new(api_base: String) -> Result<Self, MarketError> {
        let client = Client::builder().build()?;
        Ok(Self { client, api_base })
    }

    pub async fn fetch(&self, metal: Metal) -> Result<SpotPrice, MarketError> {
        let url = format!(
            "{}/{}/EUR",
            self.api_base.trim_end_matches('/'),
            metal.spot_symbol()
        );
        let payload: Value = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let eur_per_oz = mid_price_per_ounce(&payload)?;
        let eur_per_gram = eur_per_oz / TROY_OUNCE_GRAMS;
        info!(%metal, eur_per_gram, "fetched spot price");
        Ok(SpotPrice {
            metal,
            eur_per_gram,
        })
    }
}

/// The feed returns a list of platforms, each carrying spread profiles with
/// bid/ask pairs in EUR per troy ounce. The `elite` profile has the
/// tightest spread; fall back to the first profile when it is missing.
fn mid_price_per_ounce(payload: &Value) -> Result<f64, MarketError> {
    let platform = payload
        .as_array()
        .and_then(|platforms| platforms.first())
        .ok_or_else(|| MarketError::MalformedPayload("expected non-empty platform list".into()))?;

    let profiles = platform
        .get("spreadProfilePrices")
        .and_then(Value::as_array)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| MarketError::MalformedPayload("no spread profile prices".into()))?;

    let profile = profiles
        .iter()
        .find(|p| p.get("spreadProfile").and_then(Value::as_str) == Some("elite"))
        .unwrap_or(&profiles[0]);

    let bid = profile.get("bid").and_then(Value::as_f64);
    let ask = profile.get("ask").and_then(Value::as_f64);
    match (bid, ask) {
        (Some(bid), Some(ask)) if bid > 0.0 && ask > 0.0 => Ok((bid + ask) / 2.0),
        _ => Err(MarketError::MalformedPayload(
            "profile missing bid/ask".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prefers_elite_profile() {
        let payload = json!([{
            "spreadProfilePrices": [
                { "spreadProfile": "standard", "bid": 1850.0, "ask": 1860.0 },
                { "spreadProfile": "elite", "bid": 1860.0, "ask": 1864.0 }
            ]
        }]);
        assert_eq!(mid_price_per_ounce(&payload).unwrap(), 1862.0);
    }

    #[test]
    fn falls_back_to_first_profile() {
        let payload = json!([{
            "spreadProfilePrices": [
                { "spreadProfile": "standard", "bid": 1850.0, "ask": 1854.0 }
            ]
        }]);
        assert_eq!(mid_price_per_ounce(&payload).unwrap(), 1852.0);
    }

    #[test]
    fn rejects_malformed_payloads() {
        assert!(mid_price_per_ounce(&json!([])).is_err());
        assert!(mid_price_per_ounce(&json!([{ "spreadProfilePrices": [] }])).is_err());
        assert!(mid_price_per_ounce(&json!([{
            "spreadProfilePrices": [{ "spreadProfile": "elite" }]
        }]))
        .is_err());
    }

    #[test]
    fn ounce_to_gram_conversion() {
        // 1862 EUR/oz is ~59.86 EUR/g.
        let eur_per_gram = 1862.0 / TROY_OUNCE_GRAMS;
        assert!((eur_per_gram - 59.86).abs() < 0.01);
    }
}
