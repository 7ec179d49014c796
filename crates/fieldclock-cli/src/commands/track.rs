//! Commands that talk to the location backend.

use std::time::Duration;

use clap::Args;
use fieldclock_core::location::source_from_config;
use fieldclock_core::{Config, LocationError, TrackerService};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use super::{open_tracker, print_json, print_notifications, CmdResult};

#[derive(Args)]
pub struct TrackArgs {
    /// Stop after this many seconds (default: until Ctrl-C or the backend runs dry)
    #[arg(long)]
    pub seconds: Option<u64>,
}

fn runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
}

pub fn run(args: TrackArgs) -> CmdResult {
    let config = Config::load()?;
    runtime()?.block_on(track(config, args))
}

async fn track(config: Config, args: TrackArgs) -> CmdResult {
    let tracker = open_tracker(&config)?;
    let source = source_from_config(&config)?;
    let service = TrackerService::spawn(tracker, source);

    let mut notifications = service.subscribe();
    let mut errors = service.subscribe_errors();
    service.start_tracking().await?;

    let deadline = async {
        match args.seconds {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            received = notifications.recv() => match received {
                Ok(n) => print_notifications(&[n])?,
                Err(RecvError::Lagged(missed)) => warn!(missed, "Notification output fell behind"),
                Err(RecvError::Closed) => break,
            },
            received = errors.recv() => match received {
                Ok(LocationError::StreamEnded) => break,
                Ok(e) => println!("{}", json!({ "kind": "error", "message": e.to_string() })),
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    // Shutdown drains fixes already queued; print what they produced.
    let tracker = service.shutdown().await?;
    while let Ok(n) = notifications.try_recv() {
        print_notifications(&[n])?;
    }
    eprintln!("stopped in state {}", tracker.state());
    Ok(())
}

pub fn locate() -> CmdResult {
    let config = Config::load()?;
    runtime()?.block_on(async {
        let source = source_from_config(&config)?;
        let fix = source.get_current_position().await?;
        print_json(&fix)
    })
}
