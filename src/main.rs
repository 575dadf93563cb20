use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lotfolio::config::{default_config_path, ResolvedConfig};
use lotfolio::format::MoneyFormat;
use lotfolio::fx::RateTable;
use lotfolio::holdings::LotFilter;
use lotfolio::market_data::{
    build_fx_source, env_key_lookup, resolver_from_config, JsonFilePriceCache,
};
use lotfolio::models::{AssetType, Currency, Id, Known, LotEdit, NewLot, Symbol};
use lotfolio::portfolio::PortfolioService;
use lotfolio::snapshot::SnapshotManager;
use lotfolio::storage::{JsonFileAssetCatalog, JsonFileStorage, ManualPriceBook, Storage};
use lotfolio::valuation::PortfolioValuation;

#[derive(Parser)]
#[command(name = "lotfolio")]
#[command(about = "Lot-based portfolio valuation with cached market prices")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// User whose portfolio is read and written
    #[arg(short, long, env = "LOTFOLIO_USER", default_value = "default")]
    user: String,

    /// Emit logs as JSON lines on stderr
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage purchase lots
    #[command(subcommand)]
    Lots(LotsCommand),
    /// Manage the asset catalog
    #[command(subcommand)]
    Assets(AssetsCommand),
    /// Resolve current prices, or record a manual price
    Prices(PricesArgs),
    /// Value the portfolio in the display currency
    Value {
        /// Bypass fresh cached quotes
        #[arg(long)]
        refresh: bool,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Capture today's portfolio snapshot
    Snapshot {
        /// Capture for this instant instead of now (RFC 3339)
        #[arg(long)]
        as_of: Option<DateTime<Utc>>,
    },
    /// List stored snapshots
    History {
        /// Show only the snapshot of this day
        #[arg(long, conflicts_with_all = ["from", "to"])]
        on: Option<NaiveDate>,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Dividend records and trailing-12-month yields
    #[command(subcommand)]
    Dividends(DividendsCommand),
    /// Show current configuration
    Config,
}

#[derive(Subcommand)]
enum LotsCommand {
    /// Record a purchase
    Add {
        symbol: String,
        quantity: Decimal,
        price: Decimal,
        #[arg(long, default_value = "USD")]
        currency: String,
        /// Purchase date (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long, default_value = "")]
        platform: String,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Change fields of an existing lot
    Edit {
        lot_id: String,
        #[arg(long)]
        quantity: Option<Decimal>,
        #[arg(long)]
        price: Option<Decimal>,
        #[arg(long)]
        currency: Option<String>,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        platform: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    List {
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Delete a lot and its dividend records
    Remove { lot_id: String },
}

#[derive(Subcommand)]
enum AssetsCommand {
    List,
    /// Define a custom asset priced from manual entries
    Add {
        symbol: String,
        name: String,
        #[arg(long)]
        precision: Option<u32>,
    },
}

#[derive(Args)]
#[command(args_conflicts_with_subcommands = true)]
struct PricesArgs {
    #[command(subcommand)]
    command: Option<PricesCommand>,

    /// Bypass fresh cached quotes
    #[arg(long)]
    refresh: bool,

    symbols: Vec<String>,
}

#[derive(Subcommand)]
enum PricesCommand {
    /// Record a manual price for a custom asset
    Set {
        symbol: String,
        price: Decimal,
        #[arg(long, default_value = "USD")]
        currency: Currency,
    },
    /// Show every cached quote
    Cached,
}

#[derive(Subcommand)]
enum DividendsCommand {
    /// Yield per holding as of a date (defaults to today)
    List {
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
    Add {
        lot_id: String,
        amount: Decimal,
        #[arg(long, default_value = "USD")]
        currency: Currency,
        #[arg(long)]
        date: NaiveDate,
    },
}

#[derive(Args)]
struct FilterArgs {
    #[arg(long)]
    symbol: Option<String>,
    #[arg(long = "type")]
    asset_type: Option<AssetType>,
    #[arg(long)]
    platform: Option<String>,
    #[arg(long)]
    search: Option<String>,
}

impl FilterArgs {
    fn into_filter(self) -> LotFilter {
        LotFilter {
            symbol: self.symbol.map(Symbol::new),
            asset_type: self.asset_type,
            platform: self.platform,
            search: self.search,
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let layer = fmt::layer().with_writer(std::io::stderr).with_target(true);
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer.json())
            .init();
    } else {
        tracing_subscriber::registry().with(filter).with(layer).init();
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn build_service(config: &ResolvedConfig) -> Result<PortfolioService> {
    let storage: Arc<dyn Storage> = Arc::new(JsonFileStorage::new(&config.data_dir));
    let catalog = Arc::new(JsonFileAssetCatalog::new(config.data_dir.join("assets.json")));
    let cache = Arc::new(JsonFilePriceCache::new(config.data_dir.join("price_cache.json")));

    let resolver = resolver_from_config(cache, config, &env_key_lookup)
        .with_manual_prices(Arc::new(ManualPriceBook::new(storage.clone())));
    let static_rates =
        RateTable::from_static(&config.fx.rates).context("Invalid [fx.rates] entry")?;

    let mut service = PortfolioService::new(storage, catalog, Arc::new(resolver))
        .with_static_rates(static_rates)
        .with_display_currency(config.display_currency.clone())
        .with_custom_precision(config.assets.custom_precision);
    if let Some(source) = build_fx_source(&config.fx) {
        service = service.with_fx_source(source);
    }
    Ok(service)
}

/// Human-readable totals printed next to the raw figures.
fn valuation_summary(valuation: &PortfolioValuation, money: &MoneyFormat) -> serde_json::Value {
    let currency = &valuation.currency;
    json!({
        "total_value": money.money(valuation.total_value, currency),
        "total_cost_basis": money.money(valuation.total_cost_basis, currency),
        "total_gain_loss": money.money(valuation.total_gain_loss, currency),
        "total_gain_loss_pct": money.percent(Known::Known(valuation.total_gain_loss_pct)),
        "holdings": valuation.holdings.iter().map(|h| json!({
            "symbol": h.symbol,
            "value": money.known_money(h.current_value, currency),
            "gain_loss": money.known_money(h.gain_loss, currency),
            "gain_loss_pct": money.percent(h.gain_loss_pct),
        })).collect::<Vec<_>>(),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = ResolvedConfig::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load lotfolio config: {}", cli.config.display()))?;
    let user = Id::from_string_checked(cli.user.as_str()).context("Invalid user id")?;
    let service = Arc::new(build_service(&config)?);
    let money = MoneyFormat::new(&config.display);

    match cli.command {
        Command::Lots(cmd) => match cmd {
            LotsCommand::Add {
                symbol,
                quantity,
                price,
                currency,
                date,
                platform,
                notes,
            } => {
                let purchase_date = date.unwrap_or_else(|| Utc::now().with_timezone(&config.timezone).date_naive());
                let lot = service
                    .add_lot(
                        &user,
                        NewLot {
                            symbol: Symbol::new(symbol),
                            quantity,
                            purchase_price: price,
                            currency,
                            purchase_date,
                            platform,
                            notes,
                        },
                    )
                    .await?;
                print_json(&lot)?;
            }
            LotsCommand::Edit {
                lot_id,
                quantity,
                price,
                currency,
                date,
                platform,
                notes,
            } => {
                let edit = LotEdit {
                    quantity,
                    purchase_price: price,
                    currency,
                    purchase_date: date,
                    platform,
                    notes: notes.map(|n| Some(n).filter(|n| !n.is_empty())),
                };
                let lot = service.edit_lot(&user, &Id::from_string(lot_id), edit).await?;
                print_json(&lot)?;
            }
            LotsCommand::List { filter } => {
                let lots = service.list_lots(&user, &filter.into_filter()).await?;
                print_json(&lots)?;
            }
            LotsCommand::Remove { lot_id } => {
                let lot_id = Id::from_string(lot_id);
                let removed = service.remove_lot(&user, &lot_id).await?;
                if !removed {
                    anyhow::bail!("Lot not found: {lot_id}");
                }
                print_json(&json!({ "removed": lot_id }))?;
            }
        },

        Command::Assets(cmd) => match cmd {
            AssetsCommand::List => print_json(&service.list_assets().await?)?,
            AssetsCommand::Add {
                symbol,
                name,
                precision,
            } => {
                let definition = service.define_custom_asset(symbol, name, precision).await?;
                print_json(&definition)?;
            }
        },

        Command::Prices(args) => match args.command {
            Some(PricesCommand::Set {
                symbol,
                price,
                currency,
            }) => {
                let manual = service.record_manual_price(symbol, price, currency).await?;
                print_json(&manual)?;
            }
            Some(PricesCommand::Cached) => {
                print_json(&service.resolver().cached_quotes().await?)?;
            }
            None => {
                if args.symbols.is_empty() {
                    anyhow::bail!("No symbols given");
                }
                let symbols: Vec<Symbol> = args.symbols.iter().map(Symbol::new).collect();
                let prices = service.resolve_symbols(&symbols, args.refresh).await?;
                print_json(&prices)?;
            }
        },

        Command::Value { refresh, filter } => {
            let valuation = service
                .valuation(&user, &filter.into_filter(), refresh)
                .await?;
            let summary = valuation_summary(&valuation, &money);
            print_json(&json!({ "valuation": valuation, "summary": summary }))?;
        }

        Command::Snapshot { as_of } => {
            let manager = SnapshotManager::new(service.clone()).with_timezone(config.timezone);
            let (snapshot, outcome) = manager.capture_snapshot(&user, as_of).await?;
            print_json(&json!({ "outcome": outcome, "snapshot": snapshot }))?;
        }

        Command::History { on, from, to } => {
            let manager = SnapshotManager::new(service.clone()).with_timezone(config.timezone);
            match on {
                Some(day) => {
                    let snapshot = manager
                        .snapshot_for(&user, day)
                        .await?
                        .with_context(|| format!("No snapshot stored for {day}"))?;
                    print_json(&snapshot)?;
                }
                None => print_json(&manager.history(&user, from, to).await?)?,
            }
        }

        Command::Dividends(cmd) => match cmd {
            DividendsCommand::List { as_of } => {
                let as_of = as_of.unwrap_or_else(|| Utc::now().with_timezone(&config.timezone).date_naive());
                print_json(&service.dividend_yields(&user, as_of).await?)?;
            }
            DividendsCommand::Add {
                lot_id,
                amount,
                currency,
                date,
            } => {
                let payment = service
                    .record_dividend(&user, &Id::from_string(lot_id), amount, currency, date)
                    .await?;
                print_json(&payment)?;
            }
        },

        Command::Config => {
            print_json(&json!({
                "config_file": cli.config,
                "data_dir": config.data_dir,
                "display_currency": config.display_currency,
                "base_currency": config.base_currency,
                "timezone": config.timezone.name(),
            }))?;
        }
    }

    Ok(())
}
