//! CSV export of a day's normalized products.
//!
//! Semicolon-delimited to match the spreadsheets the historical exports
//! used. Rows arrive pre-sorted from the store (cheapest per fine gram
//! first, unranked products last).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::info;

use crate::domain::model::Observation;
use crate::shared::types::Metal;

const DELIMITER: char = ';';

const HEADER: &[&str] = &[
    "product_name",
    "url",
    "metal",
    "category",
    "weight_grams",
    "purity_per_mille",
    "fine_metal_grams",
    "price_bgn",
    "price_eur",
    "buy_price",
    "sell_price",
    "price_per_fine_gram",
    "spread_pct",
    "quote_flagged",
];

/// Write one day's observations to `<dir>/<metal>_<date>.csv` and return
/// the path written.
pub fn write_daily_csv(
    dir: &Path,
    metal: Metal,
    date: NaiveDate,
    observations: &[Observation],
) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}_{}.csv", metal.as_str(), date));
    fs::write(&path, render_csv(observations))?;
    info!(path = %path.display(), rows = observations.len(), "wrote CSV export");
    Ok(path)
}

pub fn render_csv(observations: &[Observation]) -> String {
    let mut out = String::new();
    write_row(&mut out, HEADER.iter().map(|s| s.to_string()));
    for obs in observations {
        let p = &obs.product;
        write_row(
            &mut out,
            [
                p.name.clone(),
                p.url.clone(),
                p.metal.to_string(),
                p.category.to_string(),
                fmt_opt(p.weight_grams),
                p.purity_per_mille.map(|v| v.to_string()).unwrap_or_default(),
                fmt_opt(p.fine_metal_grams),
                fmt_opt(p.price_bgn),
                fmt_opt(p.price_eur),
                fmt_opt(p.buy_price),
                fmt_opt(p.sell_price),
                fmt_opt(p.price_per_fine_gram),
                fmt_opt(p.spread_pct),
                if p.quote_flagged { "1" } else { "0" }.to_string(),
            ]
            .into_iter(),
        );
    }
    out
}

fn write_row(out: &mut String, fields: impl Iterator<Item = String>) {
    let mut first = true;
    for field in fields {
        if !first {
            out.push(DELIMITER);
        }
        out.push_str(&escape(&field));
        first = false;
    }
    out.push('\n');
}

/// Quote a field when it contains the delimiter, a quote, or a newline.
fn escape(field: &str) -> String {
    if field.contains(DELIMITER) || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
