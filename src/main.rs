use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;
use std::path::PathBuf;
use stockpick::{
    commands::{advise, check, scan, show, test_alert},
    config::{env_map, Settings},
    context::AppContext,
};

#[derive(Parser)]
#[command(name = "stockpick")]
#[command(about = "Daily momentum scanner, position sizer and profit-target alerts")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch recent prices for the ticker list, rank them and save today's pick
    Scan {
        /// Ticker list (one per line, or a CSV with a ticker/symbol column)
        #[arg(long = "tickers-file", value_name = "PATH")]
        tickers_file: Option<PathBuf>,
        /// Scoring method: volatility_adjusted, momentum or intraday
        #[arg(long)]
        scoring: Option<String>,
        /// Trading days of momentum lookback
        #[arg(long)]
        lookback: Option<usize>,
        /// Minimum average daily volume
        #[arg(long = "min-volume")]
        min_volume: Option<f64>,
        /// Hide the progress bar
        #[arg(long = "no-progress")]
        no_progress: bool,
    },
    /// Split a budget into whole shares across tickers
    Advise {
        /// Tickers (space or comma separated)
        #[arg(value_delimiter = ',', num_args = 0..)]
        tickers: Vec<String>,
        /// Use the top N rows of the candidates file instead of explicit tickers
        #[arg(long = "from-candidates", value_name = "N", conflicts_with = "tickers")]
        from_candidates: Option<usize>,
        /// Budget to invest
        #[arg(long)]
        amount: Option<f64>,
        /// Allocation policy: minimum or max-profit
        #[arg(long)]
        mode: Option<String>,
        /// Save the allocation as the portfolio checked by `check`
        #[arg(long)]
        save: bool,
    },
    /// Compare current prices with buy prices and alert when the target is reached
    Check {
        /// Profit target in percent
        #[arg(long)]
        target: Option<f64>,
    },
    /// Print the saved pick and the top candidates
    Show {
        /// Number of candidates to print
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// Send a test message through every configured alert channel
    TestAlert,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let Cli { command } = cli;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let env = env_map();
    let mut settings = Settings::from_settings_with_overrides(&env, &setting_overrides(&command))?;
    if let Commands::Scan {
        tickers_file: Some(path),
        ..
    } = &command
    {
        settings.tickers_file = path.clone();
    }

    info!("Starting stockpick. Not financial advice. Use at your own risk.");
    let app_context = AppContext::initialize(settings, env)?;

    match command {
        Commands::Scan { no_progress, .. } => {
            scan::run(&app_context, !no_progress).await?;
        }
        Commands::Advise {
            tickers,
            from_candidates,
            amount,
            save,
            ..
        } => {
            let options = advise::AdviseOptions {
                tickers,
                from_candidates,
                amount,
                mode: Some(app_context.settings().allocation_mode),
                save,
            };
            advise::run(&app_context, &options).await?;
        }
        Commands::Check { target } => {
            check::run(&app_context, target).await?;
        }
        Commands::Show { top } => {
            show::run(&app_context, top)?;
        }
        Commands::TestAlert => {
            let delivered = test_alert::run(&app_context).await?;
            info!("Test alert accepted by: {}", delivered.join(", "));
        }
    }

    Ok(())
}

/// Command-line flags as settings keys, so they pass the same validation as the environment.
fn setting_overrides(command: &Commands) -> Vec<(&'static str, String)> {
    let mut overrides = Vec::new();
    match command {
        Commands::Scan {
            scoring,
            lookback,
            min_volume,
            ..
        } => {
            if let Some(raw) = scoring {
                overrides.push(("SCORING_METHOD", raw.clone()));
            }
            if let Some(days) = lookback {
                overrides.push(("LOOKBACK_DAYS", days.to_string()));
            }
            if let Some(volume) = min_volume {
                overrides.push(("MIN_AVG_VOLUME", volume.to_string()));
            }
        }
        Commands::Advise { mode, .. } => {
            if let Some(raw) = mode {
                overrides.push(("ALLOCATION_MODE", raw.clone()));
            }
        }
        Commands::Check { .. } | Commands::Show { .. } | Commands::TestAlert => {}
    }
    overrides
}
