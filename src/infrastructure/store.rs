//! History store - one row per (product, observation date) in SQLite.
//!
//! The store is the only owner of persisted observations. Writes for a
//! date go through one transaction, so a concurrent reader sees either the
//! whole day or none of it.

use std::path::Path;

use chrono::NaiveDate;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::info;

use crate::domain::model::{BestDeal, Observation, Product};
use crate::shared::errors::StoreError;
use crate::shared::types::{Category, Metal};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS observations (
    product_key         TEXT NOT NULL,
    date                TEXT NOT NULL,
    name                TEXT NOT NULL,
    url                 TEXT NOT NULL,
    metal               TEXT NOT NULL CHECK (metal IN ('gold', 'silver')),
    category            TEXT NOT NULL CHECK (category IN ('bar', 'coin', 'unknown')),
    weight_grams        REAL,
    purity_per_mille    INTEGER,
    fine_metal_grams    REAL,
    price_bgn           REAL,
    price_eur           REAL,
    buy_price           REAL,
    sell_price          REAL,
    price_per_fine_gram REAL,
    spread_pct          REAL,
    quote_flagged       INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (product_key, date)
);

CREATE INDEX IF NOT EXISTS idx_observations_metal_date
    ON observations (metal, date);

CREATE INDEX IF NOT EXISTS idx_observations_key_date
    ON observations (product_key, date DESC);
"#;

const UPSERT: &str = r#"
INSERT INTO observations (
    product_key, date, name, url, metal, category,
    weight_grams, purity_per_mille, fine_metal_grams,
    price_bgn, price_eur, buy_price, sell_price,
    price_per_fine_gram, spread_pct, quote_flagged
) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
ON CONFLICT (product_key, date) DO UPDATE SET
    name = excluded.name,
    url = excluded.url,
    metal = excluded.metal,
    category = excluded.category,
    weight_grams = excluded.weight_grams,
    purity_per_mille = excluded.purity_per_mille,
    fine_metal_grams = excluded.fine_metal_grams,
    price_bgn = excluded.price_bgn,
    price_eur = excluded.price_eur,
    buy_price = excluded.buy_price,
    sell_price = excluded.sell_price,
    price_per_fine_gram = excluded.price_per_fine_gram,
    spread_pct = excluded.spread_pct,
    quote_flagged = excluded.quote_flagged
"#;

const COLUMNS: &str = "product_key, date, name, url, metal, category, \
     weight_grams, purity_per_mille, fine_metal_grams, \
     price_bgn, price_eur, buy_price, sell_price, \
     price_per_fine_gram, spread_pct, quote_flagged";

pub struct HistoryStore {
    pool: SqlitePool,
}

impl HistoryStore {
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Migration(format!("cannot create {parent:?}: {e}")))?;
            }
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        Self::connect(options).await
    }

    /// Private in-memory database, used by tests.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        Self::connect(SqliteConnectOptions::new().filename(":memory:")).await
    }

    async fn connect(options: SqliteConnectOptions) -> Result<Self, StoreError> {
        // One writer at a time; the single long-lived connection also keeps
        // :memory: databases alive for the whole store lifetime.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Upsert a single observation: a second write for the same
    /// (product, date) replaces the stored values, never duplicates.
    pub async fn put(&self, observation: &Observation) -> Result<(), StoreError> {
        bind_observation(sqlx::query(UPSERT), observation)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Commit a whole day's batch in one transaction. On any failure the
    /// transaction rolls back and no row of the day is visible.
    pub async fn put_day(
        &self,
        date: NaiveDate,
        observations: &[Observation],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for observation in observations {
            debug_assert_eq!(observation.date, date);
            bind_observation(sqlx::query(UPSERT), observation)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        info!(%date, count = observations.len(), "committed daily batch");
        Ok(())
    }

    pub async fn get(
        &self,
        product_key: &str,
        date: NaiveDate,
    ) -> Result<Option<Observation>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM observations WHERE product_key = ? AND date = ?");
        let row = sqlx::query(&sql)
            .bind(product_key)
            .bind(date)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_observation(&r)).transpose()
    }

    /// Most recent observation strictly before `before_date`.
    pub async fn previous(
        &self,
        product_key: &str,
        before_date: NaiveDate,
    ) -> Result<Option<Observation>, StoreError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM observations \
             WHERE product_key = ? AND date < ? ORDER BY date DESC LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(product_key)
            .bind(before_date)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_observation(&r)).transpose()
    }

    /// All observations of one product in [start, end], ordered by date.
    pub async fn range(
        &self,
        product_key: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Observation>, StoreError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM observations \
             WHERE product_key = ? AND date BETWEEN ? AND ? ORDER BY date ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(product_key)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_observation).collect()
    }

    /// The n cheapest ranked products of a metal on a date. Unranked rows
    /// (no per-gram price) are excluded; ties break by product key so the
    /// ordering is reproducible run to run.
    pub async fn top_n(
        &self,
        metal: Metal,
        date: NaiveDate,
        n: usize,
    ) -> Result<Vec<Observation>, StoreError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM observations \
             WHERE metal = ? AND date = ? AND price_per_fine_gram IS NOT NULL \
             ORDER BY price_per_fine_gram ASC, product_key ASC LIMIT ?"
        );
        let rows = sqlx::query(&sql)
            .bind(metal.as_str())
            .bind(date)
            .bind(n as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_observation).collect()
    }

    /// Every observation of a metal on a date, cheapest per gram first,
    /// unranked rows last. This is the CSV export order.
    pub async fn all_for_date(
        &self,
        metal: Metal,
        date: NaiveDate,
    ) -> Result<Vec<Observation>, StoreError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM observations \
             WHERE metal = ? AND date = ? \
             ORDER BY price_per_fine_gram IS NULL, price_per_fine_gram ASC, product_key ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(metal.as_str())
            .bind(date)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_observation).collect()
    }

    /// Previous trading date: the latest stored date strictly before the
    /// given one. Weekends and missed scrapes skip naturally.
    pub async fn latest_date_before(
        &self,
        metal: Metal,
        before_date: NaiveDate,
    ) -> Result<Option<NaiveDate>, StoreError> {
        let row = sqlx::query(
            "SELECT DISTINCT date FROM observations \
             WHERE metal = ? AND date < ? ORDER BY date DESC LIMIT 1",
        )
        .bind(metal.as_str())
        .bind(before_date)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.get::<NaiveDate, _>(0)))
    }

    pub async fn dates_with_data(
        &self,
        metal: Metal,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, StoreError> {
        let rows = sqlx::query(
            "SELECT DISTINCT date FROM observations \
             WHERE metal = ? AND date BETWEEN ? AND ? ORDER BY date ASC",
        )
        .bind(metal.as_str())
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|r| r.get::<NaiveDate, _>(0)).collect())
    }

    /// Globally cheapest per-gram observation of the period, across all
    /// observations rather than the daily top-N.
    pub async fn best_deal(
        &self,
        metal: Metal,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Option<BestDeal>, StoreError> {
        let row = sqlx::query(
            "SELECT product_key, name, price_per_fine_gram, date FROM observations \
             WHERE metal = ? AND date BETWEEN ? AND ? AND price_per_fine_gram IS NOT NULL \
             ORDER BY price_per_fine_gram ASC, product_key ASC LIMIT 1",
        )
        .bind(metal.as_str())
        .bind(start)
        .bind(end)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| BestDeal {
            product_key: r.get("product_key"),
            name: r.get("name"),
            price_per_gram: r.get("price_per_fine_gram"),
            date: r.get("date"),
        }))
    }

    /// Delete observations older than the cutoff; returns rows removed.
    pub async fn prune_before(&self, cutoff: NaiveDate) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM observations WHERE date < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn bind_observation<'q>(
    query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    observation: &'q Observation,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    let p = &observation.product;
    query
        .bind(p.key.as_str())
        .bind(observation.date)
        .bind(p.name.as_str())
        .bind(p.url.as_str())
        .bind(p.metal.as_str())
        .bind(p.category.as_str())
        .bind(p.weight_grams)
        .bind(p.purity_per_mille.map(|v| v as i64))
        .bind(p.fine_metal_grams)
        .bind(p.price_bgn)
        .bind(p.price_eur)
        .bind(p.buy_price)
        .bind(p.sell_price)
        .bind(p.price_per_fine_gram)
        .bind(p.spread_pct)
        .bind(p.quote_flagged)
}

fn row_to_observation(row: &SqliteRow) -> Result<Observation, StoreError> {
    let parse_enum = |column: &str, value: String| StoreError::InvalidValue {
        column: column.to_string(),
        value,
    };

    let metal_raw: String = row.try_get("metal")?;
    let metal: Metal = metal_raw
        .parse()
        .map_err(|_| parse_enum("metal", metal_raw.clone()))?;
    let category_raw: String = row.try_get("category")?;
    let category: Category = category_raw
        .parse()
        .map_err(|_| parse_enum("category", category_raw.clone()))?;

    Ok(Observation {
        date: row.try_get("date")?,
        product: Product {
            key: row.try_get("product_key")?,
            name: row.try_get("name")?,
            url: row.try_get("url")?,
            metal,
            category,
            weight_grams: row.try_get("weight_grams")?,
            purity_per_mille: row
                .try_get::<Option<i64>, _>("purity_per_mille")?
                .map(|v| v as u32),
            fine_metal_grams: row.try_get("fine_metal_grams")?,
            price_bgn: row.try_get("price_bgn")?,
            price_eur: row.try_get("price_eur")?,
            buy_price: row.try_get("buy_price")?,
            sell_price: row.try_get("sell_price")?,
            price_per_fine_gram: row.try_get("price_per_fine_gram")?,
            spread_pct: row.try_get("spread_pct")?,
            quote_flagged: row.try_get("quote_flagged")?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn obs(key: &str, day: NaiveDate, ppg: Option<f64>) -> Observation {
        Observation {
            date: day,
            product: Product {
                key: key.to_string(),
                name: format!("Product {key}"),
                url: format!("/{key}"),
                metal: Metal::Gold,
                category: Category::Coin,
                weight_grams: Some(31.1),
                purity_per_mille: Some(917),
                fine_metal_grams: Some(28.52),
                price_bgn: ppg.map(|v| v * 28.52),
                price_eur: None,
                buy_price: Some(3750.0),
                sell_price: Some(3900.0),
                price_per_fine_gram: ppg,
                spread_pct: Some(3.85),
                quote_flagged: false,
            },
        }
    }

    #[tokio::test]
    async fn put_is_idempotent_per_key_and_date() {
        let store = HistoryStore::open_in_memory().await.unwrap();
        let day = date(2025, 6, 2);

        store.put(&obs("krugerrand", day, Some(136.74))).await.unwrap();
        store.put(&obs("krugerrand", day, Some(140.11))).await.unwrap();

        let all = store.all_for_date(Metal::Gold, day).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].product.price_per_fine_gram, Some(140.11));
    }

    #[tokio::test]
    async fn round_trips_every_field() {
        let store = HistoryStore::open_in_memory().await.unwrap();
        let day = date(2025, 6, 2);
        let original = obs("maple", day, Some(135.5));

        store.put(&original).await.unwrap();
        let loaded = store.get("maple", day).await.unwrap().unwrap();
        assert_eq!(loaded, original);
        assert!(store.get("maple", date(2025, 6, 3)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn top_n_orders_and_breaks_ties_deterministically() {
        let store = HistoryStore::open_in_memory().await.unwrap();
        let day = date(2025, 6, 2);

        let batch = vec![
            obs("c-later", day, Some(120.0)),
            obs("b-tie", day, Some(118.0)),
            obs("a-tie", day, Some(118.0)),
            obs("unranked", day, None),
        ];
        store.put_day(day, &batch).await.unwrap();

        let first = store.top_n(Metal::Gold, day, 10).await.unwrap();
        let keys: Vec<_> = first.iter().map(|o| o.product.key.as_str()).collect();
        assert_eq!(keys, vec!["a-tie", "b-tie", "c-later"]);

        // Identical stored data yields identical ordered output.
        let second = store.top_n(Metal::Gold, day, 10).await.unwrap();
        assert_eq!(first, second);

        let limited = store.top_n(Metal::Gold, day, 2).await.unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test]
    async fn previous_is_strictly_before() {
        let store = HistoryStore::open_in_memory().await.unwrap();
        store.put(&obs("bar", date(2025, 6, 1), Some(100.0))).await.unwrap();
        store.put(&obs("bar", date(2025, 6, 4), Some(101.0))).await.unwrap();

        let prev = store.previous("bar", date(2025, 6, 4)).await.unwrap().unwrap();
        assert_eq!(prev.date, date(2025, 6, 1));
        assert!(store.previous("bar", date(2025, 6, 1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn range_is_ordered_by_date() {
        let store = HistoryStore::open_in_memory().await.unwrap();
        for (d, ppg) in [(3, 102.0), (1, 100.0), (2, 101.0), (9, 109.0)] {
            store.put(&obs("bar", date(2025, 6, d), Some(ppg))).await.unwrap();
        }
        let rows = store
            .range("bar", date(2025, 6, 1), date(2025, 6, 3))
            .await
            .unwrap();
        let days: Vec<_> = rows.iter().map(|o| o.date.format("%d").to_string()).collect();
        assert_eq!(days, vec!["01", "02", "03"]);
    }

    #[tokio::test]
    async fn previous_trading_date_skips_gaps() {
        let store = HistoryStore::open_in_memory().await.unwrap();
        store.put(&obs("bar", date(2025, 6, 6), Some(100.0))).await.unwrap();
        // No scrape on the 7th and 8th (weekend).
        store.put(&obs("bar", date(2025, 6, 9), Some(101.0))).await.unwrap();

        let prev = store
            .latest_date_before(Metal::Gold, date(2025, 6, 9))
            .await
            .unwrap();
        assert_eq!(prev, Some(date(2025, 6, 6)));
        assert_eq!(
            store
                .latest_date_before(Metal::Gold, date(2025, 6, 6))
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn best_deal_looks_beyond_the_top_n() {
        let store = HistoryStore::open_in_memory().await.unwrap();
        store.put(&obs("pricey", date(2025, 6, 1), Some(140.0))).await.unwrap();
        store.put(&obs("cheap", date(2025, 6, 2), Some(118.5))).await.unwrap();

        let deal = store
            .best_deal(Metal::Gold, date(2025, 6, 1), date(2025, 6, 30))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(deal.product_key, "cheap");
        assert_eq!(deal.price_per_gram, 118.5);
        assert_eq!(deal.date, date(2025, 6, 2));
    }

    #[tokio::test]
    async fn prune_removes_only_expired_rows() {
        let store = HistoryStore::open_in_memory().await.unwrap();
        store.put(&obs("bar", date(2024, 11, 1), Some(95.0))).await.unwrap();
        store.put(&obs("bar", date(2025, 6, 1), Some(100.0))).await.unwrap();

        let removed = store.prune_before(date(2025, 1, 1)).await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.get("bar", date(2024, 11, 1)).await.unwrap().is_none());
        assert!(store.get("bar", date(2025, 6, 1)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn export_order_puts_unranked_last() {
        let store = HistoryStore::open_in_memory().await.unwrap();
        let day = date(2025, 6, 2);
        let batch = vec![
            obs("no-price", day, None),
            obs("mid", day, Some(125.0)),
            obs("cheap", day, Some(119.0)),
        ];
        store.put_day(day, &batch).await.unwrap();

        let rows = store.all_for_date(Metal::Gold, day).await.unwrap();
        let keys: Vec<_> = rows.iter().map(|o| o.product.key.as_str()).collect();
        assert_eq!(keys, vec!["cheap", "mid", "no-price"]);
    }

    #[tokio::test]
    async fn dates_with_data_are_distinct_and_ordered() {
        let store = HistoryStore::open_in_memory().await.unwrap();
        for d in [2, 1, 2, 5] {
            store.put(&obs("bar", date(2025, 6, d), Some(100.0))).await.unwrap();
        }
        let dates = store
            .dates_with_data(Metal::Gold, date(2025, 6, 1), date(2025, 6, 30))
            .await
            .unwrap();
        assert_eq!(dates, vec![date(2025, 6, 1), date(2025, 6, 2), date(2025, 6, 5)]);
    }
}
