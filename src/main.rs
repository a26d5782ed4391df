use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use tokio::sync::watch;

use price_excursion::binance::rest::BinanceRestClient;
use price_excursion::config::{Config, StoreBackendKind};
use price_excursion::driver::{DriverSettings, FeedDriver};
use price_excursion::event::FeedHandle;
use price_excursion::model::coin::{find_coin, COINS};
use price_excursion::price_store::{
    MemoryStore, PostgresStore, PriceStore, SqliteStore, StoreBackend,
};
use price_excursion::server::{self, ServerState};
use price_excursion::tick_processor::TickProcessor;
use price_excursion::trajectory::noise_from_seed;

#[tokio::main]
async fn main() -> Result<()> {
    // Install rustls crypto provider (required by rustls 0.23+)
    let _ = rustls::crypto::ring::default_provider().install_default();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or("run");
    if matches!(command, "help" | "--help" | "-h") {
        print_usage();
        return Ok(());
    }
    if command == "coins" {
        for coin in COINS {
            println!("{:<10} {:<6} {}", coin.symbol, coin.base_asset(), coin.name);
        }
        return Ok(());
    }

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {:#}", e);
            eprintln!("Make sure config/default.toml exists (or set PRICE_EXCURSION_CONFIG)");
            std::process::exit(1);
        }
    };

    init_tracing(&config)?;

    match command {
        "run" => run(config).await,
        "init-db" => {
            let store = build_store(&config).await?;
            store.provision().await.context("failed to provision price store")?;
            println!("{} store provisioned (table `{}`)", store.label(), config.store.table);
            Ok(())
        }
        "schema" => {
            let store = build_store(&config).await?;
            println!("{}", store.schema().trim());
            Ok(())
        }
        "history" => {
            let symbol = args
                .get(1)
                .ok_or_else(|| anyhow!("`history` requires a symbol argument"))?;
            let coin = find_coin(symbol).ok_or_else(|| anyhow!("unknown symbol `{}`", symbol))?;
            let limit = match args.get(2) {
                Some(v) => v
                    .parse::<usize>()
                    .with_context(|| format!("invalid limit `{}`", v))?,
                None => config.feed.history_load_limit,
            };
            let store = build_store(&config).await?;
            for p in store.history(coin.symbol, limit).await? {
                println!(
                    "{}  {:>16.6}  {}",
                    p.timestamp_iso(),
                    p.price,
                    if p.is_simulated { "SIM" } else { "LIVE" }
                );
            }
            Ok(())
        }
        other => bail!(
            "unknown subcommand `{}`. expected one of: run|init-db|schema|history|coins|help",
            other
        ),
    }
}

fn print_usage() {
    println!("price-excursion [COMMAND]");
    println!();
    println!("  run                      start the feed driver and HTTP control surface (default)");
    println!("  init-db                  create the price table for the configured store");
    println!("  schema                   print the DDL for the configured store");
    println!("  history SYMBOL [LIMIT]   print stored prices, oldest first");
    println!("  coins                    list supported assets");
}

fn init_tracing(config: &Config) -> Result<()> {
    // Log to file so stdout stays usable for CLI output
    if let Some(parent) = config.logging.file.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let log_file = std::fs::File::create(&config.logging.file)
        .with_context(|| format!("failed to create {}", config.logging.file.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::try_new(&config.logging.level)
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
            }),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .json()
        .init();
    Ok(())
}

async fn build_store(config: &Config) -> Result<StoreBackend> {
    let table = &config.store.table;
    let store = match config.store.backend {
        StoreBackendKind::Sqlite => {
            StoreBackend::Sqlite(SqliteStore::open(&config.store.sqlite_path, table)?)
        }
        StoreBackendKind::Postgres => {
            let url = config
                .store
                .database_url
                .as_deref()
                .ok_or_else(|| anyhow!("DATABASE_URL is not set"))?;
            StoreBackend::Postgres(
                PostgresStore::connect_async(url, table)
                    .await
                    .context("failed to connect to postgres")?,
            )
        }
        StoreBackendKind::Memory => StoreBackend::Memory(MemoryStore::new()),
    };
    Ok(store)
}

async fn run(config: Config) -> Result<()> {
    tracing::info!(
        symbol = %config.feed.symbol,
        rest_url = %config.binance.rest_base_url,
        store = ?config.store.backend,
        "Starting price-excursion"
    );

    let store = build_store(&config).await?;
    if config.store.auto_provision {
        store.provision().await.context("auto-provision failed")?;
    }

    let rest_client = Arc::new(BinanceRestClient::new(
        &config.binance.rest_base_url,
        config.binance.request_timeout(),
    )?);
    match rest_client.ping().await {
        Ok(()) => tracing::info!("Binance ping OK"),
        Err(e) => {
            tracing::warn!(error = %e, "Binance unreachable; feed will hold prices until it recovers")
        }
    }

    let processor = TickProcessor::new(
        Arc::clone(&rest_client),
        store.clone(),
        noise_from_seed(config.simulation.seed),
        config.simulation.params,
    );
    let driver = FeedDriver::new(
        processor,
        &config.feed.symbol,
        DriverSettings {
            window_len: config.feed.history_len,
            history_load_limit: config.feed.history_load_limit,
        },
    )?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let tick_interval = config.feed.tick_interval()?;
    let (feed, driver_task) = driver.spawn(tick_interval, shutdown_rx.clone());
    tokio::spawn(report_halts(feed.clone()));

    if config.server.enabled {
        let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
            .await
            .with_context(|| format!("failed to bind {}", config.server.bind_addr))?;
        println!("control surface on http://{}", listener.local_addr()?);
        let state = ServerState {
            feed: feed.clone(),
            store: store.clone(),
        };
        tokio::spawn(async move {
            if let Err(e) = server::serve(listener, state).await {
                tracing::error!(error = %e, "HTTP server error");
            }
        });
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    let _ = shutdown_tx.send(true);
    let _ = driver_task.await;
    Ok(())
}

/// Print provisioning instructions whenever the feed halts on a missing table.
async fn report_halts(feed: FeedHandle) {
    let mut rx = feed.subscribe();
    let mut was_halted = false;
    loop {
        let (halted, reason, schema) = {
            let snap = rx.borrow_and_update();
            (snap.halted, snap.halt_reason.clone(), snap.schema_hint.clone())
        };
        if halted && !was_halted {
            eprintln!("Database setup required: {}", reason.unwrap_or_default());
            if let Some(schema) = schema {
                eprintln!("Run `price-excursion init-db` or execute:\n{}", schema.trim());
            }
            eprintln!("Then POST /api/resume to continue.");
        }
        was_halted = halted;
        if rx.changed().await.is_err() {
            break;
        }
    }
}
