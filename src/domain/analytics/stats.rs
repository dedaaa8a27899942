//! Period statistics over daily top-N snapshots.
//!
//! Each day contributes a single mean regardless of how many products were
//! observed, so thin days do not skew the period aggregate. Days without a
//! scrape simply do not appear in the input.

use chrono::NaiveDate;

use crate::domain::model::{BestDeal, Observation, SpotPrice, StatisticsReport, Trend};
use crate::domain::normalizer::round2;
use crate::shared::types::Metal;

/// Relative band within which the first-third/last-third comparison is
/// considered flat.
const TREND_BAND_PCT: f64 = 1.0;

pub struct StatisticsAggregator;

impl StatisticsAggregator {
    /// Aggregate a period from its daily ranked snapshots (one entry per
    /// day that actually has data). `best_deal` is the globally cheapest
    /// per-gram observation in the period, queried by the caller across all
    /// observations, not just the top-N.
    pub fn aggregate(
        metal: Metal,
        period_start: NaiveDate,
        period_end: NaiveDate,
        daily_snapshots: &[(NaiveDate, Vec<Observation>)],
        best_deal: Option<BestDeal>,
        spot: Option<SpotPrice>,
        eur_bgn_rate: Option<f64>,
    ) -> StatisticsReport {
        let daily_means: Vec<f64> = daily_snapshots
            .iter()
            .filter_map(|(_, snapshot)| daily_mean(snapshot))
            .collect();

        let mean_price_per_gram = if daily_means.is_empty() {
            0.0
        } else {
            round2(mean(&daily_means))
        };
        let stdev_price_per_gram = if daily_means.len() < 2 {
            0.0
        } else {
            round2(population_stdev(&daily_means))
        };

        let premium_over_spot_pct = spot.zip(eur_bgn_rate).and_then(|(spot, rate)| {
            let spot_bgn_per_gram = spot.eur_per_gram * rate;
            if spot_bgn_per_gram > 0.0 && mean_price_per_gram > 0.0 {
                Some(round2(
                    (mean_price_per_gram / spot_bgn_per_gram - 1.0) * 100.0,
                ))
            } else {
                None
            }
        });

        StatisticsReport {
            metal,
            period_start,
            period_end,
            days_with_data: daily_means.len(),
            mean_price_per_gram,
            stdev_price_per_gram,
            trend: trend(&daily_means),
            best_deal,
            premium_over_spot_pct,
        }
    }
}

/// Mean per-gram price across one day's ranked snapshot; `None` when the
/// day has no ranked products.
fn daily_mean(snapshot: &[Observation]) -> Option<f64> {
    let prices: Vec<f64> = snapshot
        .iter()
        .filter_map(|obs| obs.product.price_per_fine_gram)
        .collect();
    if prices.is_empty() {
        None
    } else {
        Some(mean(&prices))
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn population_stdev(values: &[f64]) -> f64 {
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// First third of the period vs last third, on the daily means. Fewer than
/// two data points is always `Stable`.
fn trend(daily_means: &[f64]) -> Trend {
    let n = daily_means.len();
    if n < 2 {
        return Trend::Stable;
    }
    let third = (n / 3).max(1);
    let first = mean(&daily_means[..third]);
    let last = mean(&daily_means[n - third..]);
    if first <= 0.0 {
        return Trend::Stable;
    }
    let change_pct = (last - first) / first * 100.0;
    if change_pct > TREND_BAND_PCT {
        Trend::Increasing
    } else if change_pct < -TREND_BAND_PCT {
        Trend::Decreasing
    } else {
        Trend::Stable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::Product;
    use crate::shared::types::Category;

    fn day(date: (i32, u32, u32), prices: &[Option<f64>]) -> (NaiveDate, Vec<Observation>) {
        let date = NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap();
        let snapshot = prices
            .iter()
            .enumerate()
            .map(|(i, ppg)| Observation {
                date,
                product: Product {
                    key: format!("p{i}"),
                    name: format!("p{i}"),
                    url: format!("/p{i}"),
                    metal: Metal::Gold,
                    category: Category::Bar,
                    weight_grams: Some(10.0),
                    purity_per_mille: Some(999),
                    fine_metal_grams: Some(9.99),
                    price_bgn: None,
                    price_eur: None,
                    buy_price: None,
                    sell_price: None,
                    price_per_fine_gram: *ppg,
                    spread_pct: None,
                    quote_flagged: false,
                },
            })
            .collect();
        (date, snapshot)
    }

    fn aggregate(days: &[(NaiveDate, Vec<Observation>)]) -> StatisticsReport {
        StatisticsAggregator::aggregate(
            Metal::Gold,
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 6, 30).unwrap(),
            days,
            None,
            None,
            None,
        )
    }

    #[test]
    fn days_weigh_equally_regardless_of_product_count() {
        let days = vec![
            day((2025, 6, 1), &[Some(100.0), Some(110.0)]),
            day((2025, 6, 2), &[Some(120.0)]),
        ];
        let report = aggregate(&days);
        // Mean of daily means (105, 120), not of all observations.
        assert_eq!(report.mean_price_per_gram, 112.5);
        assert_eq!(report.stdev_price_per_gram, 7.5);
        assert_eq!(report.days_with_data, 2);
    }

    #[test]
    fn unranked_products_do_not_enter_the_mean() {
        let days = vec![day((2025, 6, 1), &[Some(100.0), None, Some(102.0)])];
        let report = aggregate(&days);
        assert_eq!(report.mean_price_per_gram, 101.0);
    }

    #[test]
    fn short_period_degrades_gracefully() {
        let days = vec![day((2025, 6, 1), &[Some(100.0)])];
        let report = aggregate(&days);
        assert_eq!(report.stdev_price_per_gram, 0.0);
        assert_eq!(report.trend, Trend::Stable);

        let report = aggregate(&[]);
        assert_eq!(report.days_with_data, 0);
        assert_eq!(report.mean_price_per_gram, 0.0);
        assert_eq!(report.trend, Trend::Stable);
    }

    #[test]
    fn trend_compares_first_and_last_third() {
        let days: Vec<_> = [100.0, 100.0, 101.0, 102.0, 103.0, 103.0]
            .iter()
            .enumerate()
            .map(|(i, p)| day((2025, 6, 1 + i as u32), &[Some(*p)]))
            .collect();
        let report = aggregate(&days);
        // First third mean 100, last third mean 103: +3% > 1%.
        assert_eq!(report.trend, Trend::Increasing);

        let days: Vec<_> = [103.0, 103.0, 102.0, 101.0, 100.0, 100.0]
            .iter()
            .enumerate()
            .map(|(i, p)| day((2025, 6, 1 + i as u32), &[Some(*p)]))
            .collect();
        assert_eq!(aggregate(&days).trend, Trend::Decreasing);

        let days: Vec<_> = [100.0, 100.2, 100.1, 100.3, 100.2, 100.4]
            .iter()
            .enumerate()
            .map(|(i, p)| day((2025, 6, 1 + i as u32), &[Some(*p)]))
            .collect();
        assert_eq!(aggregate(&days).trend, Trend::Stable);
    }

    #[test]
    fn premium_over_spot_needs_both_inputs() {
        let days = vec![day((2025, 6, 1), &[Some(120.0)])];
        let spot = SpotPrice {
            metal: Metal::Gold,
            eur_per_gram: 50.0,
        };

        let report = StatisticsAggregator::aggregate(
            Metal::Gold,
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 6, 7).unwrap(),
            &days,
            None,
            Some(spot),
            Some(2.0),
        );
        // 120 BGN/g over a 100 BGN/g spot basis.
        assert_eq!(report.premium_over_spot_pct, Some(20.0));

        let report = StatisticsAggregator::aggregate(
            Metal::Gold,
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 6, 7).unwrap(),
            &days,
            None,
            Some(spot),
            None,
        );
        assert_eq!(report.premium_over_spot_pct, None);
    }
}
