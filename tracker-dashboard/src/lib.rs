mod state;
mod view;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use log::{LevelFilter, info, warn};
use tokio::sync::{mpsc, watch};
use tracker_logic::{
    ConnectionInfo, LatestFetcher, LiveTransport, LocationTracker, TrackerSettings, TrackerState,
};
use tracker_transport::{HttpFetcher, ServerConfig, SocketIoTransport};

pub use state::{Command, RedrawSender, Tracker, spawn_command_reader};
pub use view::{DashboardView, Panel};

pub type Result<T = (), E = anyhow::Error> = std::result::Result<T, E>;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Base URL of the tracking service's HTTP API, overrides API_BASE_URL
    #[arg(long)]
    api_url: Option<String>,

    /// Base URL of the tracking service's live socket, overrides SOCKET_URL
    #[arg(long)]
    socket_url: Option<String>,

    /// Max readings to keep in history (0 keeps everything)
    #[arg(long, default_value_t = TrackerSettings::default().history_limit)]
    history: usize,

    /// Number of recent readings to list
    #[arg(long, default_value_t = 10)]
    show: usize,

    /// Log messages at or above this level go to stderr. Logs share the terminal with the
    /// dashboard, so only errors are shown by default
    #[arg(long, default_value_t = LevelFilter::Error)]
    log_level: LevelFilter,
}

fn draw(frame: &str) {
    // Clear and home the cursor before every frame
    println!("\x1B[2J\x1B[H{frame}");
}

/// Redraw on every state or connection change and apply commands until `quit` resolves or a
/// [Command::Quit] comes in. A closed command channel only stops command handling.
async fn drive<F: LatestFetcher, T: LiveTransport>(
    tracker: &LocationTracker<F, T, RedrawSender>,
    redraw: &RedrawSender,
    mut connection_rx: watch::Receiver<ConnectionInfo>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    quit: impl Future<Output = ()>,
    mut render: impl FnMut(&TrackerState, &ConnectionInfo),
) {
    tokio::pin!(quit);

    loop {
        let state = tracker.clone_state().await;
        render(&state, &tracker.connection());

        tokio::select! {
            biased;

            _ = &mut quit => break,

            Some(cmd) = commands.recv() => match cmd {
                Command::Refresh => tracker.refresh(),
                Command::Quit => break,
            },

            _ = redraw.wait() => {}

            Ok(()) = connection_rx.changed() => {}
        }
    }
}

pub async fn run() -> Result {
    let cli = Cli::parse();

    // RUST_LOG still refines the level per module
    colog::basic_builder()
        .filter_level(cli.log_level)
        .parse_default_env()
        .init();

    let mut config = ServerConfig::from_env();
    if let Some(url) = cli.api_url {
        config.api_base_url = url;
    }
    if let Some(url) = cli.socket_url {
        config.socket_url = url;
    }

    info!("Starting {} {}", config.app_name, config.app_version);

    let fetcher = HttpFetcher::new(&config)?;
    info!("Fetching latest location from {}", fetcher.url());

    let socket_url = config
        .socket_io_url()
        .context("Invalid live socket URL")?;
    let transport = SocketIoTransport::new(socket_url);
    let connection_rx = transport.subscribe_connection();

    let redraw = RedrawSender::default();
    let settings = TrackerSettings {
        history_limit: cli.history,
    };
    let tracker = Arc::new(Tracker::new(settings, fetcher, transport, redraw.clone()));

    let view = DashboardView {
        title: config.app_name,
        version: config.app_version,
        show: cli.show,
    };

    let tracker_task = tokio::spawn({
        let tracker = tracker.clone();
        async move {
            tracker.open().await;
        }
    });

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    spawn_command_reader(std::io::BufReader::new(std::io::stdin()), command_tx);

    let ctrl_c = async {
        if let Err(why) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {why}");
        }
    };

    drive(
        &tracker,
        &redraw,
        connection_rx,
        command_rx,
        ctrl_c,
        |state, connection| draw(&view.render(state, connection)),
    )
    .await;

    info!("Shutting down");
    tracker.close();
    tracker_task.await.context("Tracker task panicked")?;

    Ok(())
}
