use anyhow::Result;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::warn;

use bullion_tracker::application::services::TrackerService;
use bullion_tracker::infrastructure::fetch::ListingFetcher;
use bullion_tracker::infrastructure::market::SpotPriceClient;
use bullion_tracker::shared::config::TrackerConfig;
use bullion_tracker::shared::types::Metal;

#[derive(Parser, Debug)]
#[command(version, about = "Precious-metals listing tracker with price-history analytics")]
struct Args {
    /// Path to config file (optional; built-in defaults otherwise)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the daily batch: fetch, normalize, store, detect changes
    Scrape {
        #[arg(long, value_enum, default_value_t = MetalArg::Both)]
        metal: MetalArg,
        /// Observation date, UTC (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Override the change threshold percentage
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Recompute change events for a stored date without scraping
    Changes {
        #[arg(long, value_enum, default_value_t = MetalArg::Both)]
        metal: MetalArg,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Weekly or monthly statistics report
    Stats {
        #[arg(long, value_enum, default_value_t = MetalArg::Both)]
        metal: MetalArg,
        #[arg(long, value_enum, default_value_t = PeriodArg::Week)]
        period: PeriodArg,
        /// Last day of the period (defaults to today)
        #[arg(long)]
        end: Option<NaiveDate>,
        /// Also deliver the report to the configured webhook
        #[arg(long)]
        notify: bool,
    },
    /// Re-export a stored day as CSV
    Export {
        #[arg(long, value_enum, default_value_t = MetalArg::Both)]
        metal: MetalArg,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Delete observations past the retention window
    Prune,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MetalArg {
    Gold,
    Silver,
    Both,
}

impl MetalArg {
    fn metals(self) -> Vec<Metal> {
        match self {
            MetalArg::Gold => vec![Metal::Gold],
            MetalArg::Silver => vec![Metal::Silver],
            MetalArg::Both => vec![Metal::Gold, Metal::Silver],
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PeriodArg {
    Week,
    Month,
}

impl PeriodArg {
    fn days(self) -> i64 {
        match self {
            PeriodArg::Week => 7,
            PeriodArg::Month => 30,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => TrackerConfig::from_file(path)?,
        None => TrackerConfig::default(),
    };

    let today = Utc::now().date_naive();

    match args.command {
        Command::Scrape {
            metal,
            date,
            threshold,
        } => {
            if let Some(threshold) = threshold {
                config.tracker.change_threshold_pct = threshold;
            }
            let fetcher = ListingFetcher::new(config.source.clone())?;
            let service = TrackerService::new(config).await?;
            let date = date.unwrap_or(today);

            for metal in metal.metals() {
                let summary = service.run_daily(&fetcher, metal, date).await?;
                println!(
                    "{}: {} listings, {} products stored, {} rejected, {} change events",
                    metal,
                    summary.listings,
                    summary.products,
                    summary.rejected.len(),
                    summary.events.len()
                );
                for event in &summary.events {
                    println!("  {}", describe_event(event));
                }
            }
        }

        Command::Changes {
            metal,
            date,
            threshold,
        } => {
            if let Some(threshold) = threshold {
                config.tracker.change_threshold_pct = threshold;
            }
            let service = TrackerService::new(config).await?;
            let date = date.unwrap_or(today);

            for metal in metal.metals() {
                let events = service.detect_changes(metal, date).await?;
                println!("{metal} changes on {date}: {}", events.len());
                for event in &events {
                    println!("  {}", describe_event(event));
                }
            }
        }

        Command::Stats {
            metal,
            period,
            end,
            notify,
        } => {
            let spot_client = config
                .market
                .api_base
                .clone()
                .map(SpotPriceClient::new)
                .transpose()?;
            let service = TrackerService::new(config).await?;
            let period_end = end.unwrap_or(today);
            let period_start = period_end - chrono::Duration::days(period.days() - 1);

            for metal in metal.metals() {
                let spot = match &spot_client {
                    Some(client) => match client.fetch(metal).await {
                        Ok(spot) => Some(spot),
                        Err(e) => {
                            warn!(error = %e, "spot price unavailable");
                            None
                        }
                    },
                    None => None,
                };

                let report = service.report(metal, period_start, period_end, spot).await?;
                println!(
                    "{} {}..{}: mean {:.2} лв./г, stdev {:.2}, trend {}, {} days with data",
                    metal,
                    report.period_start,
                    report.period_end,
                    report.mean_price_per_gram,
                    report.stdev_price_per_gram,
                    report.trend.as_str(),
                    report.days_with_data
                );
                if let Some(deal) = &report.best_deal {
                    println!(
                        "  best deal: {} at {:.2} лв./г on {}",
                        deal.name, deal.price_per_gram, deal.date
                    );
                }
                if let Some(premium) = report.premium_over_spot_pct {
                    println!("  premium over spot: {premium:+.2}%");
                }
                if notify {
                    service.notify_report(&report).await?;
                }
            }
        }

        Command::Export { metal, date } => {
            let service = TrackerService::new(config).await?;
            let date = date.unwrap_or(today);
            for metal in metal.metals() {
                let path = service.export_csv(metal, date).await?;
                println!("wrote {}", path.display());
            }
        }

        Command::Prune => {
            let service = TrackerService::new(config).await?;
            let removed = service.prune(today).await?;
            println!("removed {removed} observations");
        }
    }

    Ok(())
}

fn describe_event(event: &bullion_tracker::domain::model::ChangeEvent) -> String {
    use bullion_tracker::domain::model::ChangeKind;
    match event.kind {
        ChangeKind::Moved => format!(
            "{}: {:.2} -> {:.2} лв./г ({:+.2}%)",
            event.name,
            event.previous_price_per_gram.unwrap_or(0.0),
            event.current_price_per_gram.unwrap_or(0.0),
            event.pct_change.unwrap_or(0.0)
        ),
        ChangeKind::Entered => format!(
            "{} entered the top 10 at #{}",
            event.name,
            event.rank_current.unwrap_or(0)
        ),
        ChangeKind::Dropped => format!(
            "{} dropped from the top 10 (was #{})",
            event.name,
            event.rank_previous.unwrap_or(0)
        ),
    }
}
