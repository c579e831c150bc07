use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::Context;
use bramble_vfs::FileWatcher;
use crossbeam_channel as channel;

use crate::DaemonInner;

/// Background thread forwarding watcher messages to the daemon.
pub(crate) struct WatchDriver {
    stop: channel::Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl WatchDriver {
    pub(crate) fn spawn<W>(daemon: Arc<DaemonInner>, watcher: W) -> anyhow::Result<Self>
    where
        W: FileWatcher + 'static,
    {
        let (stop_tx, stop_rx) = channel::bounded::<()>(0);
        let events = watcher.receiver().clone();
        let thread = thread::Builder::new()
            .name("bramble-watch-driver".to_owned())
            .spawn(move || {
                // Keeps the backend alive for as long as the driver runs.
                let _watcher = watcher;
                loop {
                    channel::select! {
                        recv(stop_rx) -> _ => break,
                        recv(events) -> msg => {
                            let Ok(msg) = msg else {
                                tracing::debug!(
                                    target: "bramble.daemon",
                                    "watcher channel closed; stopping driver"
                                );
                                break;
                            };
                            match msg {
                                Ok(event) => {
                                    daemon.handle_event(event);
                                }
                                Err(err) => daemon.handle_watch_error(&err),
                            }
                        }
                    }
                }
            })
            .context("failed to spawn watch driver thread")?;
        Ok(Self {
            stop: stop_tx,
            thread: Some(thread),
        })
    }

    pub(crate) fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.stop.send(());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for WatchDriver {
    fn drop(&mut self) {
        self.shutdown();
    }
}
