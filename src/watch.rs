//! Background polling and the control loop that reacts to it.
//!
//! Two watcher threads feed the main thread through their own channels:
//!
//! - the store watcher polls the project index file's modification time and
//!   reports changes together with the last editor
//! - the session watcher owns a CAD session (built inside the thread) and
//!   reports when the active document changes
//!
//! Watchers never share state with the main thread; shutdown sets a flag
//! they check once per tick.

use crate::cad::CadSession;
use crate::storage::index::IndexStore;
use crate::storage::{Entry, Status};
use crate::sync::SyncReport;
use crate::vault::Vault;
use anyhow::Result;
use crossbeam::channel::{Receiver, Sender, TryRecvError, unbounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};

/// Message sent from a watcher thread to the control loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// The project index file changed on disk.
    ProjectChanged {
        /// Last editor recorded in the store at the time of the change
        editor: Option<String>,
    },
    /// The CAD session switched to a different document.
    ActiveDocument(String),
    /// The watcher could not talk to its source.
    WatcherError(String),
}

/// Running watcher thread. Stops and joins when dropped.
#[derive(Debug)]
pub struct WatcherHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl WatcherHandle {
    fn spawn(name: &str, body: impl FnOnce(Arc<AtomicBool>) + Send + 'static) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let thread = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(flag))?;
        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }

    /// Asks the thread to stop at its next tick.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Stops the thread and waits for it.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.request_stop();
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            tracing::warn!("watcher thread panicked");
        }
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Polls the project store's modification time.
///
/// Sends [`WatchEvent::ProjectChanged`] whenever the time differs from the
/// previous tick. The first observation only sets the baseline.
///
/// # Errors
///
/// Returns an error if the thread cannot be spawned.
pub fn spawn_store_watcher(
    store: IndexStore,
    interval: Duration,
) -> Result<(WatcherHandle, Receiver<WatchEvent>)> {
    let (tx, rx) = unbounded();
    let handle = WatcherHandle::spawn("cadsync-store-watch", move |stop| {
        let mut last = store.modified_time().ok().flatten();
        while !stop.load(Ordering::Relaxed) {
            std::thread::sleep(interval);
            if stop.load(Ordering::Relaxed) {
                break;
            }
            if !poll_store(&store, &mut last, &tx) {
                break;
            }
        }
        tracing::debug!("store watcher stopped");
    })?;
    Ok((handle, rx))
}

/// One store tick; returns false once the receiver is gone.
fn poll_store(store: &IndexStore, last: &mut Option<SystemTime>, tx: &Sender<WatchEvent>) -> bool {
    let current = match store.modified_time() {
        Ok(current) => current,
        Err(e) => return tx.send(WatchEvent::WatcherError(format!("{e:#}"))).is_ok(),
    };
    if current == *last {
        return true;
    }
    *last = current;

    let editor = match store.last_editor() {
        Ok(editor) => editor,
        Err(e) => {
            tracing::warn!(error = %e, "cannot read last editor");
            None
        }
    };
    tracing::debug!(editor = ?editor, "project store changed");
    tx.send(WatchEvent::ProjectChanged { editor }).is_ok()
}

/// Polls a CAD session for its active document.
///
/// `factory` runs on the watcher thread, so the session never crosses
/// threads. Sends [`WatchEvent::ActiveDocument`] when a different document
/// gains focus and [`WatchEvent::WatcherError`] when the session fails.
///
/// # Errors
///
/// Returns an error if the thread cannot be spawned.
pub fn spawn_session_watcher<F>(
    factory: F,
    interval: Duration,
) -> Result<(WatcherHandle, Receiver<WatchEvent>)>
where
    F: FnOnce() -> Result<Box<dyn CadSession>> + Send + 'static,
{
    let (tx, rx) = unbounded();
    let handle = WatcherHandle::spawn("cadsync-session-watch", move |stop| {
        let mut session = match factory() {
            Ok(session) => session,
            Err(e) => {
                let _ = tx.send(WatchEvent::WatcherError(format!("{e:#}")));
                return;
            }
        };

        let mut last: Option<String> = None;
        while !stop.load(Ordering::Relaxed) {
            let event = match session.active_document_name() {
                Ok(name) if name != last => {
                    last.clone_from(&name);
                    name.map(WatchEvent::ActiveDocument)
                }
                Ok(_) => None,
                Err(e) => Some(WatchEvent::WatcherError(format!("{e:#}"))),
            };
            if let Some(event) = event
                && tx.send(event).is_err()
            {
                break;
            }
            std::thread::sleep(interval);
        }
        tracing::debug!("session watcher stopped");
    })?;
    Ok((handle, rx))
}

/// Asks the person at the keyboard.
pub trait Prompt {
    /// Whether to check out `entry`, which just became the active document.
    fn confirm_unregister(&mut self, entry: &Entry) -> bool;
}

/// What the control loop did with one event.
#[derive(Debug)]
pub enum Handled {
    /// Local replica synced after another user's change
    Synced(SyncReport),
    /// Own change; no sync needed
    SelfChange,
    /// Active document checked out on request
    Unregistered(String),
    /// Active document left registered
    Declined(String),
    /// Event needed no action
    Ignored,
    /// Watcher or handler failure, already logged
    Failed(String),
}

/// Drains watcher channels on the main thread and acts on their events.
pub struct ControlLoop<'a> {
    vault: &'a Vault,
    cad: &'a mut dyn CadSession,
    prompt: &'a mut dyn Prompt,
    receivers: Vec<Receiver<WatchEvent>>,
}

impl<'a> ControlLoop<'a> {
    #[must_use]
    pub fn new(vault: &'a Vault, cad: &'a mut dyn CadSession, prompt: &'a mut dyn Prompt) -> Self {
        Self {
            vault,
            cad,
            prompt,
            receivers: Vec::new(),
        }
    }

    /// Adds a watcher's channel to the set drained each tick.
    #[must_use]
    pub fn watch(mut self, receiver: Receiver<WatchEvent>) -> Self {
        self.receivers.push(receiver);
        self
    }

    /// Handles every event currently queued, without blocking.
    ///
    /// Channels whose watcher has gone away are dropped.
    pub fn drain(&mut self) -> Vec<Handled> {
        let mut handled = Vec::new();
        let mut i = 0;
        while i < self.receivers.len() {
            match self.receivers[i].try_recv() {
                Ok(event) => handled.push(self.handle(event)),
                Err(TryRecvError::Empty) => i += 1,
                Err(TryRecvError::Disconnected) => {
                    self.receivers.remove(i);
                }
            }
        }
        handled
    }

    /// Drains every `interval` until `stop` is set or all watchers are gone.
    pub fn run(&mut self, stop: &AtomicBool, interval: Duration, mut on_handled: impl FnMut(&Handled)) {
        while !stop.load(Ordering::Relaxed) && !self.receivers.is_empty() {
            for outcome in self.drain() {
                on_handled(&outcome);
            }
            std::thread::sleep(interval);
        }
    }

    fn handle(&mut self, event: WatchEvent) -> Handled {
        match event {
            WatchEvent::ProjectChanged { editor } => {
                if editor.as_deref() == Some(self.vault.user()) {
                    return Handled::SelfChange;
                }
                match self.vault.sync_to_local() {
                    Ok(report) => Handled::Synced(report),
                    Err(e) => failed("automatic sync failed", &e),
                }
            }
            WatchEvent::ActiveDocument(name) => self.on_active_document(name),
            WatchEvent::WatcherError(message) => {
                tracing::warn!(error = %message, "watcher error");
                Handled::Failed(message)
            }
        }
    }

    fn on_active_document(&mut self, name: String) -> Handled {
        let entry = match self.vault.project().get_by_name(&name) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!(name = %name, error = %e, "active document is not in the project");
                return Handled::Ignored;
            }
        };
        if entry.is_dir() || entry.status != Status::Registered {
            return Handled::Ignored;
        }

        if !self.prompt.confirm_unregister(&entry) {
            return Handled::Declined(name);
        }
        match self.vault.unregister(&name, &mut *self.cad) {
            Ok(_) => Handled::Unregistered(name),
            Err(e) => failed("could not check out active document", &e),
        }
    }
}

fn failed(what: &str, error: &anyhow::Error) -> Handled {
    tracing::warn!(error = %format!("{error:#}"), "{what}");
    Handled::Failed(format!("{what}: {error:#}"))
}
