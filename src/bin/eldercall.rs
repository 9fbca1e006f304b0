use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use eldercall::{
    app::{self, AppStateBuilder},
    auth::TokenSigner,
    config::Config,
    version,
};
use std::time::Duration;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    author,
    version = version::get_short_version(),
    about = "Places greeting calls that play a recorded clip before bridging to the sender",
    long_about = version::get_version_info()
)]
struct Cli {
    #[clap(
        long,
        global = true,
        help = "Path to the configuration file (TOML format)"
    )]
    conf: Option<String>,
    #[clap(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print a bearer token for a configured user and exit
    IssueToken {
        #[clap(long)]
        user: String,
        /// Lifetime in hours, defaults to `[auth] token_ttl_hours`
        #[clap(long)]
        ttl_hours: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    let config = if let Some(ref path) = cli.conf {
        println!("Loading config from: {}", path);
        Config::load(path).with_context(|| format!("failed to load config {}", path))?
    } else {
        println!("Loading default config");
        Config::default()
    };

    if let Some(Commands::IssueToken { user, ttl_hours }) = &cli.command {
        if !config.users.iter().any(|u| &u.id == user) {
            anyhow::bail!("user {} is not configured", user);
        }
        let Some(secret) = config.auth.token_secret.as_deref().filter(|s| !s.is_empty()) else {
            anyhow::bail!("auth.token_secret must be set to issue tokens");
        };
        let hours = ttl_hours.unwrap_or(config.auth.token_ttl_hours);
        let ttl = Duration::from_secs(hours.saturating_mul(3600));
        let token = TokenSigner::new(secret)
            .issue_token(user, ttl)
            .context("failed to sign token")?;
        println!("{}", token);
        return Ok(());
    }

    println!("Start at {}", Utc::now());
    println!("{}", version::get_version_info());

    let mut env_filter = EnvFilter::from_default_env();
    if let Some(Ok(level)) = config
        .log_level
        .as_ref()
        .map(|level| level.parse::<LevelFilter>())
    {
        env_filter = env_filter.add_directive(level.into());
    }

    let mut _guard = None;
    if let Some(ref log_file) = config.log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .with_context(|| format!("failed to open log file {}", log_file))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        _guard = Some(guard);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(non_blocking),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()?;
    }

    let state = AppStateBuilder::new().config(config).build().await?;
    info!("starting eldercall on {}", state.config.http_addr);
    app::run(state).await
}
