//! Tracker use cases: the daily scrape batch, change detection, period
//! reports, CSV export, and retention pruning.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::domain::analytics::{changes::ChangeDetector, stats::StatisticsAggregator};
use crate::domain::model::{
    ChangeEvent, Observation, RawListing, RejectedRecord, SpotPrice, StatisticsReport,
};
use crate::domain::normalizer::{NormalizedRecord, Normalizer};
use crate::domain::parser::FieldParser;
use crate::infrastructure::export;
use crate::infrastructure::fetch::ListingSource;
use crate::infrastructure::notify::DiscordNotifier;
use crate::infrastructure::store::HistoryStore;
use crate::shared::config::TrackerConfig;
use crate::shared::errors::AppError;
use crate::shared::types::Metal;

/// Outcome of one daily run, for logging and exit status.
#[derive(Debug)]
pub struct DailySummary {
    pub metal: Metal,
    pub date: NaiveDate,
    pub listings: usize,
    pub products: usize,
    pub rejected: Vec<RejectedRecord>,
    pub events: Vec<ChangeEvent>,
    pub csv_path: Option<PathBuf>,
}

pub struct TrackerService {
    config: TrackerConfig,
    store: HistoryStore,
    normalizer: Normalizer,
    notifier: DiscordNotifier,
}

impl TrackerService {
    pub async fn new(config: TrackerConfig) -> Result<Self, AppError> {
        let store = HistoryStore::open(&config.store.db_path).await?;
        Ok(Self::with_store(config, store))
    }

    pub fn with_store(config: TrackerConfig, store: HistoryStore) -> Self {
        let normalizer = Normalizer::new(config.market.eur_bgn_rate);
        let notifier = DiscordNotifier::new(config.discord.webhook_url.clone());
        Self {
            config,
            store,
            normalizer,
            notifier,
        }
    }

    pub fn store(&self) -> &HistoryStore {
        &self.store
    }

    /// One full daily batch: fetch, normalize, commit the day atomically,
    /// detect changes against the previous trading day, export and notify.
    pub async fn run_daily(
        &self,
        source: &dyn ListingSource,
        metal: Metal,
        date: NaiveDate,
    ) -> Result<DailySummary, AppError> {
        let listings = source.fetch_listings(metal).await?;
        info!(%metal, %date, count = listings.len(), "fetched listings");

        let (observations, rejected) = self.normalize_batch(&listings, date);
        info!(
            %metal,
            products = observations.len(),
            rejected = rejected.len(),
            "normalized batch"
        );

        // All-or-nothing per date; a failure here is fatal for the run.
        self.store.put_day(date, &observations).await?;

        let events = self.detect_changes(metal, date).await?;

        let csv_path = match export::write_daily_csv(
            self.config.export.output_dir.as_ref(),
            metal,
            date,
            &self.store.all_for_date(metal, date).await?,
        ) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(error = %e, "CSV export failed");
                None
            }
        };

        if self.config.discord.enabled {
            if let Err(e) = self.notifier.send_changes(metal, date, &events).await {
                warn!(error = %e, "change notification failed");
            }
        }

        Ok(DailySummary {
            metal,
            date,
            listings: listings.len(),
            products: observations.len(),
            rejected,
            events,
            csv_path,
        })
    }

    /// Parse and normalize one batch. Rejections are collected, never
    /// fatal; duplicate keys keep the last occurrence.
    fn normalize_batch(
        &self,
        listings: &[RawListing],
        date: NaiveDate,
    ) -> (Vec<Observation>, Vec<RejectedRecord>) {
        let mut products = BTreeMap::new();
        let mut rejected = Vec::new();

        for listing in listings {
            let text = format!("{}\n{}", listing.title, listing.page_text);
            let parsed = FieldParser::parse(&text);
            match self.normalizer.normalize(listing, parsed) {
                NormalizedRecord::Product(product) => {
                    products.insert(product.key.clone(), product);
                }
                NormalizedRecord::Rejected(record) => rejected.push(record),
            }
        }

        let observations = products
            .into_values()
            .map(|product| Observation { date, product })
            .collect();
        (observations, rejected)
    }

    /// Today's top-N against the previous trading day's, both read fresh
    /// from the store.
    pub async fn detect_changes(
        &self,
        metal: Metal,
        date: NaiveDate,
    ) -> Result<Vec<ChangeEvent>, AppError> {
        let top_n = self.config.tracker.top_n;
        let current = self.store.top_n(metal, date, top_n).await?;
        let previous = match self.store.latest_date_before(metal, date).await? {
            Some(previous_date) => self.store.top_n(metal, previous_date, top_n).await?,
            None => Vec::new(),
        };
        let detector = ChangeDetector::new(self.config.tracker.change_threshold_pct);
        Ok(detector.detect(&current, &previous))
    }

    /// Weekly/monthly statistics over the stored history.
    pub async fn report(
        &self,
        metal: Metal,
        period_start: NaiveDate,
        period_end: NaiveDate,
        spot: Option<SpotPrice>,
    ) -> Result<StatisticsReport, AppError> {
        let top_n = self.config.tracker.top_n;
        let mut daily_snapshots = Vec::new();
        for date in self
            .store
            .dates_with_data(metal, period_start, period_end)
            .await?
        {
            daily_snapshots.push((date, self.store.top_n(metal, date, top_n).await?));
        }
        let best_deal = self.store.best_deal(metal, period_start, period_end).await?;
        Ok(StatisticsAggregator::aggregate(
            metal,
            period_start,
            period_end,
            &daily_snapshots,
            best_deal,
            spot,
            self.config.market.eur_bgn_rate,
        ))
    }

    pub async fn notify_report(&self, report: &StatisticsReport) -> Result<(), AppError> {
        if self.config.discord.enabled {
            self.notifier.send_report(report).await?;
        }
        Ok(())
    }

    pub async fn export_csv(&self, metal: Metal, date: NaiveDate) -> Result<PathBuf, AppError> {
        let observations = self.store.all_for_date(metal, date).await?;
        Ok(export::write_daily_csv(
            self.config.export.output_dir.as_ref(),
            metal,
            date,
            &observations,
        )?)
    }

    /// Drop observations past the configured retention window.
    pub async fn prune(&self, today: NaiveDate) -> Result<u64, AppError> {
        let cutoff = today - chrono::Duration::days(self.config.store.retention_days as i64);
        let removed = self.store.prune_before(cutoff).await?;
        info!(%cutoff, removed, "pruned old observations");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::errors::FetchError;
    use crate::shared::types::Category;
    use async_trait::async_trait;

    struct CannedSource {
        listings: Vec<RawListing>,
    }

    #[async_trait]
    impl ListingSource for CannedSource {
        async fn fetch_listings(&self, _metal: Metal) -> Result<Vec<RawListing>, FetchError> {
            Ok(self.listings.clone())
        }
    }

    fn listing(url: &str, title: &str, page_text: &str) -> RawListing {
        RawListing {
            url: url.to_string(),
            title: title.to_string(),
            page_text: page_text.to_string(),
            metal: Metal::Gold,
            category_hint: None,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn service() -> TrackerService {
        let mut config = TrackerConfig::default();
        config.export.output_dir = tempfile::tempdir()
            .unwrap()
            .keep()
            .to_string_lossy()
            .into_owned();
        let store = HistoryStore::open_in_memory().await.unwrap();
        TrackerService::with_store(config, store)
    }

    #[tokio::test]
    async fn daily_run_stores_normalized_products() {
        let svc = service().await;
        let source = CannedSource {
            listings: vec![
                listing(
                    "/zlatna-moneta-krugerrand",
                    "Златна монета Krugerrand 1oz",
                    "Krugerrand 1oz 916.6/1000 — Buy: 3750 BGN / Sell: 3900 BGN",
                ),
                listing(
                    "/zlatno-kyulche-10g",
                    "Златно кюлче 10 гр.",
                    "Тегло: 10 гр. Проба: 999.9/1000 Цена: 1 950,00 лв.",
                ),
                listing("/opakovka", "Подаръчна опаковка", "Елегантна кутия за монети"),
            ],
        };

        let summary = svc
            .run_daily(&source, Metal::Gold, date(2025, 6, 2))
            .await
            .unwrap();

        assert_eq!(summary.listings, 3);
        assert_eq!(summary.products, 2);
        assert_eq!(summary.rejected.len(), 1);
        assert!(summary.csv_path.is_some());

        let stored = svc
            .store()
            .get("zlatna-moneta-krugerrand", date(2025, 6, 2))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.product.category, Category::Coin);
        assert_eq!(stored.product.purity_per_mille, Some(917));

        // First ever run: every ranked product enters the top-N.
        assert_eq!(summary.events.len(), 2);
    }

    #[tokio::test]
    async fn day_over_day_changes_use_previous_trading_date() {
        let svc = service().await;
        let texts = |price: &str| {
            vec![listing(
                "/zlatno-kyulche-10g",
                "Златно кюлче 10 гр.",
                &format!("Тегло: 10 гр. Проба: 999/1000 Цена: {price} лв."),
            )]
        };

        svc.run_daily(
            &CannedSource { listings: texts("1 900,00") },
            Metal::Gold,
            date(2025, 6, 6),
        )
        .await
        .unwrap();

        // Weekend gap, then a >5% move on Monday.
        let summary = svc
            .run_daily(
                &CannedSource { listings: texts("2 020,00") },
                Metal::Gold,
                date(2025, 6, 9),
            )
            .await
            .unwrap();

        assert_eq!(summary.events.len(), 1);
        let event = &summary.events[0];
        assert!(event.pct_change.unwrap() > 5.0);
        assert_eq!(event.rank_previous, Some(1));
    }

    #[tokio::test]
    async fn small_moves_stay_quiet() {
        let svc = service().await;
        let texts = |price: &str| {
            vec![listing(
                "/zlatno-kyulche-10g",
                "Златно кюлче 10 гр.",
                &format!("Тегло: 10 гр. Проба: 999/1000 Цена: {price} лв."),
            )]
        };

        svc.run_daily(
            &CannedSource { listings: texts("1 900,00") },
            Metal::Gold,
            date(2025, 6, 6),
        )
        .await
        .unwrap();
        let summary = svc
            .run_daily(
                &CannedSource { listings: texts("1 930,00") },
                Metal::Gold,
                date(2025, 6, 7),
            )
            .await
            .unwrap();
        assert!(summary.events.is_empty());
    }

    #[tokio::test]
    async fn report_rolls_up_the_period() {
        let svc = service().await;
        let texts = |price: &str| {
            vec![listing(
                "/zlatno-kyulche-10g",
                "Златно кюлче 10 гр.",
                &format!("Тегло: 10 гр. Проба: 999/1000 Цена: {price} лв."),
            )]
        };

        for (day, price) in [(2, "1 900,00"), (3, "1 910,00"), (4, "1 980,00")] {
            svc.run_daily(
                &CannedSource { listings: texts(price) },
                Metal::Gold,
                date(2025, 6, day),
            )
            .await
            .unwrap();
        }

        let report = svc
            .report(Metal::Gold, date(2025, 6, 1), date(2025, 6, 30), None)
            .await
            .unwrap();
        assert_eq!(report.days_with_data, 3);
        assert!(report.best_deal.is_some());
        assert_eq!(report.best_deal.unwrap().date, date(2025, 6, 2));
    }

    #[tokio::test]
    async fn prune_honors_retention_window() {
        let svc = service().await;
        let source = CannedSource {
            listings: vec![listing(
                "/zlatno-kyulche-10g",
                "Златно кюлче 10 гр.",
                "Тегло: 10 гр. Проба: 999/1000 Цена: 1 900,00 лв.",
            )],
        };
        svc.run_daily(&source, Metal::Gold, date(2024, 11, 1))
            .await
            .unwrap();
        svc.run_daily(&source, Metal::Gold, date(2025, 6, 1))
            .await
            .unwrap();

        let removed = svc.prune(date(2025, 6, 2)).await.unwrap();
        assert_eq!(removed, 1);
    }
}
