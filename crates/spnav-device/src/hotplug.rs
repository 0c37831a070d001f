//! Directory-watching hotplug monitor.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use notify::event::ModifyKind;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::backend::HotplugMonitor;
use crate::error::Result;

const DEVICE_NODE_PREFIX: &str = "event";

type WatchResult = notify::Result<notify::Event>;

/// Watches the device directory for event nodes appearing or vanishing.
///
/// The watcher callback runs on notify's thread and only forwards into a
/// channel; all interpretation happens in [`HotplugMonitor::handle`] on the
/// caller's task.
pub struct NotifyHotplug {
    dir: PathBuf,
    watcher: Option<RecommendedWatcher>,
    rx: Option<mpsc::UnboundedReceiver<WatchResult>>,
    pending: Vec<WatchResult>,
}

impl NotifyHotplug {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            watcher: None,
            rx: None,
            pending: Vec::new(),
        }
    }
}

fn is_device_node(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(DEVICE_NODE_PREFIX))
}

fn is_topology_change(event: &notify::Event) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_))
    ) && event.paths.iter().any(|p| is_device_node(p))
}

#[async_trait]
impl HotplugMonitor for NotifyHotplug {
    fn init(&mut self) -> Result<()> {
        if self.watcher.is_some() {
            return Ok(());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |result: WatchResult| {
            let _ = tx.send(result);
        })?;
        watcher.watch(&self.dir, RecursiveMode::NonRecursive)?;
        info!("Watching for device hotplug in {}", self.dir.display());

        self.watcher = Some(watcher);
        self.rx = Some(rx);
        Ok(())
    }

    fn shutdown(&mut self) {
        if self.watcher.take().is_some() {
            debug!("Hotplug monitor stopped");
        }
        self.rx = None;
        self.pending.clear();
    }

    fn is_available(&self) -> bool {
        self.rx.is_some()
    }

    async fn wait(&mut self) {
        if !self.pending.is_empty() {
            return;
        }

        let Some(rx) = self.rx.as_mut() else {
            return std::future::pending().await;
        };

        if let Some(result) = rx.recv().await {
            self.pending.push(result);
        } else {
            warn!("Hotplug watcher channel closed");
            self.watcher = None;
            self.rx = None;
            std::future::pending::<()>().await;
        }
    }

    fn handle(&mut self) -> Result<bool> {
        if let Some(rx) = self.rx.as_mut() {
            while let Ok(result) = rx.try_recv() {
                self.pending.push(result);
            }
        }

        let mut changed = false;
        for result in self.pending.drain(..) {
            match result {
                Ok(event) if is_topology_change(&event) => {
                    debug!("Device node change: {:?} {:?}", event.kind, event.paths);
                    changed = true;
                }
                Ok(_) => {}
                Err(e) => warn!("Hotplug watcher error: {}", e),
            }
        }
        Ok(changed)
    }
}

impl Drop for NotifyHotplug {
    fn drop(&mut self) {
        self.shutdown();
    }
}
