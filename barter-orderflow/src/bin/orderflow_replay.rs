use barter_orderflow::{
    OrderflowEngine, OrderflowError, ProfileConfig, ProfileSink,
    feed::{FeedEvent, RawTrade, TimeBarClock},
    sink::{JsonLinesSink, LadderSink},
};
use std::{
    io::{self, BufWriter},
    str::FromStr,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

/// Sink output format selected via `ORDERFLOW_OUTPUT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Json,
    Ladder,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "ladder" => Ok(Self::Ladder),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

/// Replays a JSON lines feed from stdin through the order flow engine, writing sink output to
/// stdout.
///
/// Input lines are [`FeedEvent`]s, or [`RawTrade`]s stamped by a [`TimeBarClock`] when
/// `ORDERFLOW_BAR_SECS` is set.
#[tokio::main]
async fn main() {
    // Initialize logging
    init_logging();

    let code = match run().await {
        Ok(()) => 0,
        Err(error) => {
            error!(%error, "orderflow replay failed");
            1
        }
    };

    // Stdin reads occupy a blocking thread that runtime shutdown would otherwise wait on
    std::process::exit(code);
}

async fn run() -> Result<(), OrderflowError> {
    let config = ProfileConfig::from_env();

    // Configurable buffer size via ORDERFLOW_CHANNEL_BUFFER env var (default: 10,000)
    let buffer_size = env_var("ORDERFLOW_CHANNEL_BUFFER")
        .filter(|size: &usize| *size > 0)
        .unwrap_or(10_000);

    let output = env_var("ORDERFLOW_OUTPUT").unwrap_or(OutputFormat::Json);

    let clock = env_var::<i64>("ORDERFLOW_BAR_SECS")
        .map(TimeBarClock::from_secs)
        .transpose()?;

    let stdout = BufWriter::new(io::stdout());
    let sink: Box<dyn ProfileSink> = match output {
        OutputFormat::Json => Box::new(JsonLinesSink::new(stdout)),
        OutputFormat::Ladder => {
            let precision = env_var::<usize>("ORDERFLOW_PRICE_PRECISION").unwrap_or(2);
            Box::new(LadderSink::new(stdout, config.display).with_precision(precision))
        }
    };

    let mut engine = OrderflowEngine::new(config, sink)?;

    let config = engine.config();
    info!(
        ?output,
        buffer_size,
        time_bars = clock.is_some(),
        tick_size = config.tick_size,
        ticks_per_level = config.ticks_per_level,
        imbalance_threshold = config.imbalance_threshold,
        "starting orderflow replay"
    );

    let (tx, mut rx) = mpsc::channel::<FeedEvent>(buffer_size);
    let reader = spawn_feed_reader(tx, clock);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    // Single writer: every feed event is applied to the engine in arrival order
    let outcome = loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("received Ctrl-C, shutting down");
                break Ok(());
            }
            event = rx.recv() => match event {
                Some(event) => match engine.process(event) {
                    Ok(()) => {}
                    Err(error) if error.is_terminal() => break Err(error),
                    Err(error) => warn!(%error, "skipping feed event"),
                },
                None => {
                    info!("feed exhausted");
                    break Ok(());
                }
            }
        }
    };

    reader.abort();
    outcome?;

    engine.flush()?;
    info!(bars = engine.bar_count(), "orderflow replay finished");

    Ok(())
}

/// Spawn the stdin reader task forwarding decoded feed events to the engine.
fn spawn_feed_reader(
    tx: mpsc::Sender<FeedEvent>,
    mut clock: Option<TimeBarClock>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(error) => {
                    error!(%error, "failed to read feed line");
                    break;
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            let events = match decode(&line, clock.as_mut()) {
                Ok(events) => events,
                Err(error) => {
                    warn!(%error, %line, "skipping undecodable feed line");
                    continue;
                }
            };

            for event in events {
                if tx.send(event).await.is_err() {
                    debug!("engine stopped, closing feed reader");
                    return;
                }
            }
        }

        // Close the final time bar so its snapshot is emitted
        if let Some(event) = clock.as_mut().and_then(TimeBarClock::finish) {
            let _ = tx.send(event).await;
        }
    })
}

fn decode(
    line: &str,
    clock: Option<&mut TimeBarClock>,
) -> Result<Vec<FeedEvent>, OrderflowError> {
    match clock {
        Some(clock) => RawTrade::decode(line).map(|trade| clock.stamp(trade)),
        None => FeedEvent::decode(line).map(|event| vec![event]),
    }
}

fn env_var<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparsable environment variable");
            None
        }
    }
}

/// Initialize logging, stdout is reserved for sink output
fn init_logging() {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}
