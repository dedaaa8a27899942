//! Discord delivery - change events and statistics reports as webhook
//! embeds. A missing webhook is a skip, never a failure.

use reqwest::Client;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::domain::model::{ChangeEvent, ChangeKind, StatisticsReport};
use crate::shared::errors::NotifyError;
use crate::shared::types::Metal;
use chrono::NaiveDate;

const EMBED_COLOR_GOLD: u32 = 0xD4AF37;
const EMBED_COLOR_SILVER: u32 = 0xC0C0C0;

pub struct DiscordNotifier {
    client: Client,
    webhook_url: Option<String>,
}

impl DiscordNotifier {
    pub fn new(webhook_url: Option<String>) -> Self {
        Self {
            client: Client::new(),
            webhook_url,
        }
    }

    pub async fn send_changes(
        &self,
        metal: Metal,
        date: NaiveDate,
        events: &[ChangeEvent],
    ) -> Result<(), NotifyError> {
        if events.is_empty() {
            return Ok(());
        }
        self.post(changes_embed(metal, date, events)).await
    }

    pub async fn send_report(
        &self,
        report: &StatisticsReport,
    ) -> Result<(), NotifyError> {
        self.post(report_embed(report)).await
    }

    async fn post(&self, embed: Value) -> Result<(), NotifyError> {
        let Some(url) = &self.webhook_url else {
            warn!("no Discord webhook configured, skipping notification");
            return Ok(());
        };
        let response = self
            .client
            .post(url)
            .json(&json!({ "embeds": [embed] }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(NotifyError::BadStatus(
                response.status().as_u16(),
            ));
        }
        info!("sent Discord notification");
        Ok(())
    }
}

fn embed_color(metal: Metal) -> u32 {
    match metal {
        Metal::Gold => EMBED_COLOR_GOLD,
        Metal::Silver => EMBED_COLOR_SILVER,
    }
}

fn changes_embed(metal: Metal, date: NaiveDate, events: &[ChangeEvent]) -> Value {
    let mut fields = Vec::new();

    let moved = format_section(events, ChangeKind::Moved);
    if !moved.is_empty() {
        fields.push(json!({ "name": "📊 Price moves", "value": moved }));
    }
    let entered = format_section(events, ChangeKind::Entered);
    if !entered.is_empty() {
        fields.push(json!({ "name": "🆕 Entered top 10", "value": entered }));
    }
    let dropped = format_section(events, ChangeKind::Dropped);
    if !dropped.is_empty() {
        fields.push(json!({ "name": "👋 Dropped from top 10", "value": dropped }));
    }

    json!({
        "title": format!("{} price changes — {}", capitalize(metal.as_str()), date),
        "color": embed_color(metal),
        "fields": fields,
    })
}

fn format_section(events: &[ChangeEvent], kind: ChangeKind) -> String {
    events
        .iter()
        .filter(|e| e.kind == kind)
        .map(format_event)
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_event(event: &ChangeEvent) -> String {
    match event.kind {
        ChangeKind::Moved => {
            let pct = event.pct_change.unwrap_or(0.0);
            let arrow = if pct >= 0.0 { "📈" } else { "📉" };
            format!(
                "{arrow} {}: {:.2} → {:.2} лв./г ({:+.2}%)",
                event.name,
                event.previous_price_per_gram.unwrap_or(0.0),
                event.current_price_per_gram.unwrap_or(0.0),
                pct
            )
        }
        ChangeKind::Entered => format!(
            "{} at #{} ({:.2} лв./г)",
            event.name,
            event.rank_current.unwrap_or(0),
            event.current_price_per_gram.unwrap_or(0.0)
        ),
        ChangeKind::Dropped => format!(
            "{} (was #{})",
            event.name,
            event.rank_previous.unwrap_or(0)
        ),
    }
}

fn report_embed(report: &StatisticsReport) -> Value {
    let mut description = format!(
        "Period: {} — {} ({} days with data)\n\
         Mean price: {:.2} лв./г\n\
         Volatility: {:.2} лв./г\n\
         Trend: {}",
        report.period_start,
        report.period_end,
        report.days_with_data,
        report.mean_price_per_gram,
        report.stdev_price_per_gram,
        report.trend.as_str(),
    );
    if let Some(premium) = report.premium_over_spot_pct {
        description.push_str(&format!("\nPremium over spot: {premium:+.2}%"));
    }
    if let Some(deal) = &report.best_deal {
        description.push_str(&format!(
            "\n🏆 Best deal: {} at {:.2} лв./г on {}",
            deal.name, deal.price_per_gram, deal.date
        ));
    }

    json!({
        "title": format!("{} market report", capitalize(report.metal.as_str())),
        "color": embed_color(report.metal),
        "description": description,
    })
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
