use anyhow::{Context, Result};
use common::config::Config;
use common::gmgn::GmgnClient;
use common::store::WalletStore;

mod analyze;
mod cli;
mod job;
mod metrics;
mod source;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::parse_args(std::env::args()).map_err(anyhow::Error::msg)?;
    let config = Config::load(args.config_path.as_deref())?;

    let (dispatch, otel_guard) =
        common::observability::build_dispatch("scraper", &config.general.log_level);
    tracing::dispatcher::set_global_default(dispatch).map_err(anyhow::Error::msg)?;

    let code = match &args.command {
        cli::Command::Run => run(&config).await?,
        cli::Command::Price { token } => {
            price(&config, token).await?;
            0
        }
        cmd => {
            // Inspection commands use sync Database; they exit immediately.
            let db = common::db::Database::open_readonly(&config.store.path)
                .with_context(|| format!("cannot open store at {}", config.store.path))?;
            cli::run_command(&db, cmd)?;
            0
        }
    };

    // process::exit skips destructors; flush traces first.
    drop(otel_guard);
    std::process::exit(code);
}

fn upstream_client(config: &Config) -> Result<GmgnClient> {
    Ok(GmgnClient::new(
        &config.upstream.base_url,
        config.upstream.timeout(),
        &config.upstream.user_agent,
    )?)
}

async fn run(config: &Config) -> Result<i32> {
    if let Some(port) = config.observability.prometheus_port {
        metrics::install_prometheus(port)?;
    }
    metrics::describe();

    let settings = job::ScrapeSettings::from_config(&config.scraper)?;
    let client = upstream_client(config)?;

    tracing::info!(
        timeframe = %settings.timeframe,
        tag = %settings.tag,
        min_winrate = settings.min_winrate,
        store = %config.store.path,
        "scrape run starting"
    );

    let store = match WalletStore::open(&config.store.path).await {
        Ok(store) => store,
        Err(err) => {
            tracing::error!(error = %err, path = %config.store.path, "cannot open store");
            return Ok(job::RunOutcome::Failed.exit_code());
        }
    };

    let outcome = job::run_scrape(&store, &client, &settings, chrono::Utc::now()).await;
    if let Err(err) = store.close().await {
        tracing::warn!(error = %err, "failed to close store");
    }
    Ok(outcome.exit_code())
}

async fn price(config: &Config, token: &str) -> Result<()> {
    let client = upstream_client(config)?;
    match client.fetch_token_price(token).await? {
        Some(usd) => println!("{token}  usd_price={usd}"),
        None => println!("{token}  usd_price=(none)"),
    }
    Ok(())
}
