use anyhow::Context;
use clap::{Parser, Subcommand};
use news_relay::traits::{EventStream, MessageLookup};
use news_relay::{JsonlEventStream, JsonlHistory, Relay, RelayConfig, RestartPolicy};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "news-relay", about = "Relays hashtagged channel posts to the news API")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Run without making any calls to the API
    #[arg(short, long)]
    dry: bool,

    /// Log as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Backfill the channel from an export and write the emitted payloads to `<channel>.json`
    History {
        /// Channel export, one message per line
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Relay live events until the stream closes
    Live {
        /// Event stream file, or `-` for stdin
        #[arg(short, long, default_value = "-")]
        events: String,

        /// Channel export used to find group siblings of edited messages
        #[arg(long)]
        lookup: Option<PathBuf>,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn open_events(events: &str) -> anyhow::Result<Box<dyn EventStream>> {
    if events == "-" {
        return Ok(Box::new(JsonlEventStream::stdin()));
    }
    let stream = JsonlEventStream::open(events)
        .await
        .with_context(|| format!("cannot open event stream {}", events))?;
    Ok(Box::new(stream))
}

async fn run_live(relay: &Relay, events: &str) -> anyhow::Result<()> {
    let mut restarts = RestartPolicy::default();

    loop {
        let handled_before = relay.events_handled();
        let outcome = match open_events(events).await {
            Ok(mut stream) => relay.run_live(stream.as_mut()).await.map_err(anyhow::Error::from),
            Err(e) => Err(e),
        };
        match outcome {
            Ok(()) => return Ok(()),
            Err(e) => {
                error!("Live relay failed: {:#}", e);
                let delay = restarts.next_delay(relay.events_handled() > handled_before);
                warn!("Restarting in {:?}", delay);
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut config = RelayConfig::read(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;
    if cli.dry {
        config.publisher.dry = true;
    }
    config
        .validate()
        .with_context(|| format!("invalid config in {}", cli.config.display()))?;

    match cli.command {
        Command::History { input } => {
            let history = Arc::new(JsonlHistory::open(&input).await?);
            let lookup: Arc<dyn MessageLookup> = history.clone();
            let relay = Relay::from_config(config, Some(lookup)).await?;
            let emitted = relay.run_history(history).await?;
            info!("History backfill finished with {} payload(s)", emitted.len());
        }
        Command::Live { events, lookup } => {
            let lookup: Option<Arc<dyn MessageLookup>> = match lookup {
                Some(path) => Some(Arc::new(JsonlHistory::open(&path).await?)),
                None => None,
            };
            let relay = Relay::from_config(config, lookup).await?;
            run_live(&relay, &events).await?;
        }
    }

    Ok(())
}
