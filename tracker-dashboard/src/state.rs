use std::{io::BufRead, sync::Arc, thread};

use log::warn;
use tokio::sync::{Notify, mpsc};
use tracker_logic::{LocationTracker, StateUpdateSender};
use tracker_transport::{HttpFetcher, SocketIoTransport};

/// Wakes the render loop whenever the tracker state changes
#[derive(Clone, Default)]
pub struct RedrawSender(Arc<Notify>);

impl RedrawSender {
    pub async fn wait(&self) {
        self.0.notified().await;
    }
}

impl StateUpdateSender for RedrawSender {
    fn send_update(&self) {
        self.0.notify_one();
    }
}

pub type Tracker = LocationTracker<HttpFetcher, SocketIoTransport, RedrawSender>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Refresh,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "r" | "refresh" => Some(Self::Refresh),
            "q" | "quit" | "exit" => Some(Self::Quit),
            _ => None,
        }
    }
}

/// Read commands line by line on a dedicated thread and forward them to `commands`.
///
/// Blocking reads don't belong on the runtime, a read that never returns would keep it from
/// shutting down. The channel closes once `reader` hits EOF or fails.
pub fn spawn_command_reader<R>(reader: R, commands: mpsc::UnboundedSender<Command>)
where
    R: BufRead + Send + 'static,
{
    thread::spawn(move || {
        for line in reader.lines() {
            let line = match line {
                Ok(line) => line,
                Err(why) => {
                    warn!("Failed to read from stdin: {why}");
                    break;
                }
            };
            match Command::parse(&line) {
                Some(cmd) => {
                    if commands.send(cmd).is_err() {
                        break;
                    }
                }
                None => warn!("Unknown command {:?}, use r or q", line.trim()),
            }
        }
    });
}
