//! Directory watching for bundle hot reload.
//!
//! # Responsibilities
//! - Turn filesystem notifications into `WatchEvent`s for one directory
//! - Debounce bursts of events per path before acting on them
//! - Drive a `BundleScanner`: scan on create/modify, remove on delete, rescan on overflow
//!
//! # Design Decisions
//! - One blocking thread per watched directory; scans never run on request threads
//! - Event sources sit behind `WatchChannel` so native, polling and in-memory
//!   sources are interchangeable
//! - A bad bundle is logged and skipped; only a failure of the event source ends the thread

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use notify::event::{MetadataKind, ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;

use crate::bundle::resolver::ProviderHandler;
use crate::bundle::scanner::BundleScanner;

/// Longest the watcher thread blocks before re-checking its stop flag.
const TICK: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to watch {path:?}: {source}")]
    Setup {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("watch event channel closed")]
    Closed,

    #[error("failed to start watcher thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// A filesystem change relevant to the bundle directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Created(PathBuf),
    Modified(PathBuf),
    Removed(PathBuf),
    /// Events were dropped; the directory must be rescanned.
    Overflow,
}

impl WatchEvent {
    pub fn path(&self) -> Option<&Path> {
        match self {
            WatchEvent::Created(path) | WatchEvent::Modified(path) | WatchEvent::Removed(path) => Some(path),
            WatchEvent::Overflow => None,
        }
    }
}

/// Source of watch events.
pub trait WatchChannel: Send {
    /// Next event, or `None` if nothing arrived within `timeout`.
    fn next_event(&mut self, timeout: Duration) -> Result<Option<WatchEvent>, WatchError>;
}

/// In-memory source, used for embedding and tests.
impl WatchChannel for mpsc::Receiver<WatchEvent> {
    fn next_event(&mut self, timeout: Duration) -> Result<Option<WatchEvent>, WatchError> {
        match self.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(mpsc::RecvTimeoutError::Timeout) => Ok(None),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(WatchError::Closed),
        }
    }
}

/// Which `notify` backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchBackend {
    /// The platform's native notification API.
    Native,
    /// Portable fallback that polls the directory.
    Polling { interval: Duration },
}

/// `notify`-backed event source for one directory (non-recursive).
pub struct NotifyChannel {
    _watcher: Box<dyn Watcher + Send>,
    rx: mpsc::Receiver<notify::Result<Event>>,
    pending: VecDeque<WatchEvent>,
}

impl NotifyChannel {
    pub fn open(directory: &Path, backend: WatchBackend) -> Result<Self, WatchError> {
        let (tx, rx) = mpsc::channel();
        let handler = move |result: notify::Result<Event>| {
            // The receiver is gone only when the channel was dropped.
            let _ = tx.send(result);
        };
        let setup_error = |source| WatchError::Setup {
            path: directory.to_path_buf(),
            source,
        };

        let mut watcher: Box<dyn Watcher + Send> = match backend {
            WatchBackend::Native => {
                Box::new(RecommendedWatcher::new(handler, Config::default()).map_err(setup_error)?)
            }
            WatchBackend::Polling { interval } => Box::new(
                PollWatcher::new(handler, Config::default().with_poll_interval(interval))
                    .map_err(setup_error)?,
            ),
        };
        watcher
            .watch(directory, RecursiveMode::NonRecursive)
            .map_err(setup_error)?;

        Ok(Self {
            _watcher: watcher,
            rx,
            pending: VecDeque::new(),
        })
    }
}

impl WatchChannel for NotifyChannel {
    fn next_event(&mut self, timeout: Duration) -> Result<Option<WatchEvent>, WatchError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(result) => self.pending.extend(translate_result(result)),
                Err(mpsc::RecvTimeoutError::Timeout) => return Ok(None),
                Err(mpsc::RecvTimeoutError::Disconnected) => return Err(WatchError::Closed),
            }
        }
    }
}

/// Per-path errors are transient (a file vanished mid-poll); a pathless one means events were lost.
fn translate_result(result: notify::Result<Event>) -> Vec<WatchEvent> {
    match result {
        Ok(event) => translate(event),
        Err(e) if e.paths.is_empty() => {
            tracing::warn!(error = %e, "Watch service error, rescanning directory");
            vec![WatchEvent::Overflow]
        }
        Err(e) => {
            tracing::warn!(error = %e, paths = ?e.paths, "Ignoring watch error");
            e.paths.into_iter().map(WatchEvent::Modified).collect()
        }
    }
}

fn translate(event: Event) -> Vec<WatchEvent> {
    if event.need_rescan() {
        return vec![WatchEvent::Overflow];
    }
    let paths = event.paths;
    match event.kind {
        EventKind::Create(_) => paths.into_iter().map(WatchEvent::Created).collect(),
        EventKind::Remove(_) => paths.into_iter().map(WatchEvent::Removed).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            paths.into_iter().map(WatchEvent::Removed).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            paths.into_iter().map(WatchEvent::Created).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut paths = paths.into_iter();
            let mut events = Vec::new();
            if let Some(from) = paths.next() {
                events.push(WatchEvent::Removed(from));
            }
            events.extend(paths.map(WatchEvent::Created));
            events
        }
        // Renames we cannot pair up; existence decides at flush time.
        EventKind::Modify(ModifyKind::Name(_)) => paths.into_iter().map(WatchEvent::Modified).collect(),
        // The polling backend reports content changes as write-time changes.
        EventKind::Modify(ModifyKind::Metadata(MetadataKind::WriteTime)) => {
            paths.into_iter().map(WatchEvent::Modified).collect()
        }
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(_) => paths.into_iter().map(WatchEvent::Modified).collect(),
        _ => Vec::new(),
    }
}

/// Holds the latest event per path until it has been quiet for the debounce window.
#[derive(Debug)]
pub struct EventDebouncer {
    window: Duration,
    pending: HashMap<PathBuf, Instant>,
}

impl EventDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: HashMap::new(),
        }
    }

    pub fn add(&mut self, path: PathBuf) {
        self.pending.insert(path, Instant::now());
    }

    /// Paths with no new event for the whole window, oldest first.
    pub fn settled(&mut self) -> Vec<PathBuf> {
        let now = Instant::now();
        let mut ready: Vec<(PathBuf, Instant)> = self
            .pending
            .iter()
            .filter(|(_, seen)| now.duration_since(**seen) >= self.window)
            .map(|(path, seen)| (path.clone(), *seen))
            .collect();
        ready.sort_by_key(|(_, seen)| *seen);
        for (path, _) in &ready {
            self.pending.remove(path);
        }
        ready.into_iter().map(|(path, _)| path).collect()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

/// Background thread applying directory changes to a scanner.
pub struct DirectoryWatcher {
    name: String,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl DirectoryWatcher {
    /// Start watching with `channel` as the event source.
    pub fn spawn<H, C>(scanner: Arc<BundleScanner<H>>, channel: C, debounce: Duration) -> Result<Self, WatchError>
    where
        H: ProviderHandler,
        C: WatchChannel + 'static,
    {
        let name = format!("{}-dir-watcher", scanner.kind());
        let stop = Arc::new(AtomicBool::new(false));

        let handle = {
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name(name.clone())
                .spawn(move || watch_loop(scanner, channel, debounce, stop))
                .map_err(WatchError::Spawn)?
        };

        Ok(Self {
            name,
            stop,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Ask the thread to stop and wait for it.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!(watcher = %self.name, "Watcher thread panicked");
            }
        }
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

fn watch_loop<H, C>(scanner: Arc<BundleScanner<H>>, mut channel: C, debounce: Duration, stop: Arc<AtomicBool>)
where
    H: ProviderHandler,
    C: WatchChannel,
{
    let kind = scanner.kind();
    let mut debouncer = EventDebouncer::new(debounce);
    let tick = debounce.clamp(Duration::from_millis(10), TICK);
    tracing::info!(kind, directory = ?scanner.directory(), "Watching bundle directory");

    while !stop.load(Ordering::SeqCst) {
        match channel.next_event(tick) {
            Ok(Some(WatchEvent::Overflow)) => {
                tracing::warn!(kind, "Watch events were dropped, rescanning directory");
                debouncer.clear();
                if let Err(e) = scanner.rescan_all() {
                    tracing::error!(kind, error = %e, "Directory rescan failed");
                }
            }
            Ok(Some(event)) => {
                if let Some(path) = event.path() {
                    if scanner.is_bundle(path) {
                        tracing::debug!(kind, event = ?event, "Bundle change detected");
                        debouncer.add(path.to_path_buf());
                    }
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(kind, error = %e, "Watcher stopped, hot reload disabled for this directory");
                return;
            }
        }

        for path in debouncer.settled() {
            apply(&scanner, &path);
        }
    }
    tracing::info!(kind, "Watcher stopped");
}

/// Existence decides: present bundles are (re)scanned, missing ones removed.
fn apply<H: ProviderHandler>(scanner: &BundleScanner<H>, path: &Path) {
    if path.is_file() {
        if let Err(e) = scanner.scan(path) {
            tracing::error!(kind = scanner.kind(), bundle = ?path, error = %e, "Skipping unreadable bundle");
        }
    } else {
        scanner.remove(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, Flag, RemoveKind};

    #[test]
    fn test_translate_events() {
        let path = PathBuf::from("/b/a.zip");
        let created = Event::new(EventKind::Create(CreateKind::File)).add_path(path.clone());
        assert_eq!(translate(created), vec![WatchEvent::Created(path.clone())]);

        let modified = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content))).add_path(path.clone());
        assert_eq!(translate(modified), vec![WatchEvent::Modified(path.clone())]);

        let removed = Event::new(EventKind::Remove(RemoveKind::File)).add_path(path.clone());
        assert_eq!(translate(removed), vec![WatchEvent::Removed(path.clone())]);

        let renamed = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/b/old.zip"))
            .add_path(path.clone());
        assert_eq!(
            translate(renamed),
            vec![WatchEvent::Removed(PathBuf::from("/b/old.zip")), WatchEvent::Created(path.clone())]
        );

        let touched = Event::new(EventKind::Modify(ModifyKind::Metadata(MetadataKind::WriteTime))).add_path(path.clone());
        assert_eq!(translate(touched), vec![WatchEvent::Modified(path.clone())]);
        let chmod = Event::new(EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions))).add_path(path.clone());
        assert!(translate(chmod).is_empty());

        let rescan = Event::new(EventKind::Other).set_flag(Flag::Rescan);
        assert_eq!(translate(rescan), vec![WatchEvent::Overflow]);
    }

    #[test]
    fn test_debouncer_waits_for_quiet_period() {
        let mut debouncer = EventDebouncer::new(Duration::from_millis(50));
        debouncer.add(PathBuf::from("a.zip"));
        debouncer.add(PathBuf::from("a.zip"));
        assert!(debouncer.settled().is_empty());

        thread::sleep(Duration::from_millis(80));
        assert_eq!(debouncer.settled(), vec![PathBuf::from("a.zip")]);
        assert!(!debouncer.has_pending());
    }

    #[test]
    fn test_watch_errors_do_not_end_the_channel() {
        let with_path = notify::Error::io(std::io::Error::from(std::io::ErrorKind::NotFound))
            .add_path(PathBuf::from("/b/a.zip"));
        assert_eq!(
            translate_result(Err(with_path)),
            vec![WatchEvent::Modified(PathBuf::from("/b/a.zip"))]
        );
        assert_eq!(
            translate_result(Err(notify::Error::generic("queue overflow"))),
            vec![WatchEvent::Overflow]
        );
    }

    #[test]
    fn test_in_memory_channel() {
        let (tx, mut rx) = mpsc::channel();
        tx.send(WatchEvent::Overflow).unwrap();
        assert_eq!(rx.next_event(Duration::from_millis(10)).unwrap(), Some(WatchEvent::Overflow));
        assert_eq!(rx.next_event(Duration::from_millis(10)).unwrap(), None);
        drop(tx);
        assert!(matches!(rx.next_event(Duration::from_millis(10)), Err(WatchError::Closed)));
    }

    mod loop_tests {
        use super::*;
        use std::fs::File;
        use std::io::Write;

        use zip::write::SimpleFileOptions;

        use crate::bundle::resolver::ProviderTable;
        use crate::bundle::scanner::ScanSettings;
        use crate::routing::mapping::RouteHandler;
        use crate::routing::registry::RouteRegistry;

        fn write_bundle(dir: &Path, name: &str, uri: &str) -> PathBuf {
            let path = dir.join(name);
            let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());
            zip.start_file("META-INF/route/routes.json", SimpleFileOptions::default())
                .unwrap();
            let doc = format!(r#"{{"entries": [{{"uri": "{uri}", "provider": "pong"}}]}}"#);
            zip.write_all(doc.as_bytes()).unwrap();
            zip.finish().unwrap();
            path
        }

        fn scanner(dir: &Path) -> Arc<BundleScanner<RouteHandler>> {
            Arc::new(
                BundleScanner::new(
                    Arc::new(RouteRegistry::new("route")),
                    Arc::new(ProviderTable::with_defaults()),
                    ScanSettings {
                        directory: dir.to_path_buf(),
                        bundle_glob: "*.zip".to_string(),
                        metadata_dir: "META-INF/route".to_string(),
                        scan_timeout: Duration::from_secs(5),
                    },
                )
                .unwrap(),
            )
        }

        fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
            let deadline = Instant::now() + Duration::from_secs(5);
            while Instant::now() < deadline {
                if condition() {
                    return true;
                }
                thread::sleep(Duration::from_millis(20));
            }
            condition()
        }

        #[test]
        fn test_overflow_reconciles_directory() {
            let dir = tempfile::tempdir().unwrap();
            let bundle = write_bundle(dir.path(), "a.zip", "/hello");
            let scanner = scanner(dir.path());
            scanner.scan_all().unwrap();
            assert!(scanner.registry().contains("/hello"));

            let (tx, rx) = mpsc::channel();
            let mut watcher = DirectoryWatcher::spawn(Arc::clone(&scanner), rx, Duration::from_millis(10)).unwrap();

            std::fs::remove_file(&bundle).unwrap();
            let late = write_bundle(dir.path(), "b.zip", "/late");
            tx.send(WatchEvent::Overflow).unwrap();

            assert!(wait_until(|| !scanner.registry().contains("/hello")));
            assert!(wait_until(|| scanner.registry().contains("/late")));
            assert_eq!(scanner.bundles(), vec!["b.zip"]);
            assert!(late.is_file());
            watcher.stop();
        }

        #[test]
        fn test_non_bundle_files_are_ignored() {
            let dir = tempfile::tempdir().unwrap();
            let scanner = scanner(dir.path());
            let (tx, rx) = mpsc::channel();
            let mut watcher = DirectoryWatcher::spawn(Arc::clone(&scanner), rx, Duration::from_millis(10)).unwrap();

            // A readable archive, but its name does not match the glob.
            let stray = write_bundle(dir.path(), "x.txt", "/stray");
            tx.send(WatchEvent::Created(stray)).unwrap();
            let bundle = write_bundle(dir.path(), "c.zip", "/real");
            tx.send(WatchEvent::Created(bundle)).unwrap();

            assert!(wait_until(|| scanner.registry().contains("/real")));
            assert!(!scanner.registry().contains("/stray"));
            assert_eq!(scanner.bundles(), vec!["c.zip"]);
            watcher.stop();
        }

        #[test]
        fn test_watcher_survives_per_path_errors() {
            let dir = tempfile::tempdir().unwrap();
            let scanner = scanner(dir.path());

            let mut channel = NotifyChannel::open(
                dir.path(),
                WatchBackend::Polling {
                    interval: Duration::from_secs(3600),
                },
            )
            .unwrap();
            let (tx, rx) = mpsc::channel();
            channel.rx = rx;
            let mut watcher = DirectoryWatcher::spawn(Arc::clone(&scanner), channel, Duration::from_millis(10)).unwrap();

            let vanished = notify::Error::io(std::io::Error::from(std::io::ErrorKind::NotFound))
                .add_path(dir.path().join("gone.zip"));
            tx.send(Err(vanished)).unwrap();
            thread::sleep(Duration::from_millis(300));
            assert!(watcher.is_running());

            let bundle = write_bundle(dir.path(), "d.zip", "/after");
            tx.send(Ok(Event::new(EventKind::Create(notify::event::CreateKind::File)).add_path(bundle)))
                .unwrap();
            assert!(wait_until(|| scanner.registry().contains("/after")));
            watcher.stop();
        }

        #[test]
        fn test_events_before_spawn_are_kept() {
            let dir = tempfile::tempdir().unwrap();
            let scanner = scanner(dir.path());
            let channel = NotifyChannel::open(
                dir.path(),
                WatchBackend::Polling {
                    interval: Duration::from_millis(50),
                },
            )
            .unwrap();

            // Arrives after subscribing but before the watcher thread exists.
            write_bundle(dir.path(), "early.zip", "/early");
            thread::sleep(Duration::from_millis(300));

            let mut watcher = DirectoryWatcher::spawn(Arc::clone(&scanner), channel, Duration::from_millis(10)).unwrap();
            assert!(wait_until(|| scanner.registry().contains("/early")));
            watcher.stop();
        }
    }
}
