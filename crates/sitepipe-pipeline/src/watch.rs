//! Watch mode: re-run the pipeline when files under the base directory change.
//!
//! A `notify` watcher feeds [`WatchSignal`]s into an unbounded channel. A
//! single debounce loop drains it: relevant paths accumulate into a pending
//! set, and once the quiescence deadline passes with no further relevant
//! events the pipeline is re-executed from scratch. Watcher overflow forces a
//! run. After each run the trigger may report fresh output locations, so
//! edits to the document's `out` options are picked up without a restart.
//! Cancellation is cooperative and never interrupts a run in flight.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use sitepipe_types::{PipelineError, Result};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::document::load_document;
use crate::engine::{PipelineExecutor, PipelineResult, RunOptions};
use crate::events::{EventEmitter, PipelineEvent};
use crate::graph::StepGraph;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Directory names never worth re-running for, wherever they appear.
pub const DEFAULT_IGNORE_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "target",
    ".cache",
    ".sitepipe",
];

/// Editor swap files and OS metadata.
pub const TRANSIENT_PATTERNS: &[&str] = &[
    "*.swp",
    "*.swx",
    "*.swo",
    "*~",
    ".#*",
    "#*#",
    ".DS_Store",
    "Thumbs.db",
    "4913",
];

/// Step option keys whose values name files or directories the pipeline writes.
pub const OUTPUT_KEYS: &[&str] = &[
    "out",
    "output",
    "outDir",
    "outputDir",
    "dest",
    "destination",
    "report",
    "baseline",
];

#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Quiet period required after the last relevant event.
    pub debounce: Duration,
    /// Run once before waiting for changes.
    pub run_on_start: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            run_on_start: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchSignal {
    Changed(Vec<PathBuf>),
    /// The watcher may have dropped events; rescan by running.
    Overflow,
}

// ---------------------------------------------------------------------------
// ChangeFilter
// ---------------------------------------------------------------------------

/// Decides whether a changed path should count toward a re-run.
#[derive(Debug, Clone)]
pub struct ChangeFilter {
    root: PathBuf,
    ignore_roots: Vec<PathBuf>,
    transient: GlobSet,
}

impl ChangeFilter {
    pub fn new(root: impl Into<PathBuf>, ignore_roots: Vec<PathBuf>) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in TRANSIENT_PATTERNS {
            let glob = Glob::new(pattern).map_err(|e| PipelineError::Watch(e.to_string()))?;
            builder.add(glob);
        }
        let transient = builder
            .build()
            .map_err(|e| PipelineError::Watch(e.to_string()))?;
        Ok(Self {
            root: root.into(),
            ignore_roots,
            transient,
        })
    }

    /// Filter for `graph`, ignoring the outputs its steps declare.
    pub fn for_graph(graph: &StepGraph, base_dir: &Path) -> Result<Self> {
        Self::new(base_dir, infer_ignore_roots(graph, base_dir))
    }

    pub fn ignore_roots(&self) -> &[PathBuf] {
        &self.ignore_roots
    }

    pub fn set_ignore_roots(&mut self, roots: Vec<PathBuf>) {
        self.ignore_roots = roots;
    }

    pub fn is_relevant(&self, path: &Path) -> bool {
        if self.ignore_roots.iter().any(|root| path.starts_with(root)) {
            return false;
        }
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let in_ignored_dir = relative.components().any(|c| {
            c.as_os_str()
                .to_str()
                .is_some_and(|name| DEFAULT_IGNORE_DIRS.contains(&name))
        });
        if in_ignored_dir {
            return false;
        }
        match path.file_name() {
            Some(name) => !self.transient.is_match(Path::new(name)),
            None => true,
        }
    }
}

/// Output locations declared by step options, resolved against `base_dir`.
///
/// A value resolving to the base directory itself is dropped, since ignoring
/// it would ignore every change.
pub fn infer_ignore_roots(graph: &StepGraph, base_dir: &Path) -> Vec<PathBuf> {
    let mut roots = Vec::new();
    for step in graph.steps() {
        for key in OUTPUT_KEYS {
            let Some(value) = step.option_str(key) else {
                continue;
            };
            let root = normalize(&base_dir.join(value));
            if base_dir.starts_with(&root) {
                tracing::warn!(step = %step.id, key = %key, "Output location contains the base directory; not ignoring it");
                continue;
            }
            if !roots.contains(&root) {
                roots.push(root);
            }
        }
    }
    roots
}

/// Lexically resolve `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    use std::path::Component;
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// CancelSignal
// ---------------------------------------------------------------------------

/// Cooperative cancellation shared between the watch loop and its owner.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

// ---------------------------------------------------------------------------
// RunTrigger
// ---------------------------------------------------------------------------

/// What the watch loop does when it fires.
#[async_trait]
pub trait RunTrigger: Send + Sync {
    async fn trigger(&self) -> Result<PipelineResult>;

    /// Output locations to ignore from now on. `None` keeps the current set.
    fn ignore_roots(&self) -> Option<Vec<PathBuf>> {
        None
    }
}

/// Re-loads the pipeline document and runs it from scratch on every trigger,
/// so edits to the document itself take effect.
pub struct FileRunner {
    executor: PipelineExecutor,
    path: PathBuf,
    options: RunOptions,
}

impl FileRunner {
    pub fn new(executor: PipelineExecutor, path: impl Into<PathBuf>, options: RunOptions) -> Self {
        Self {
            executor,
            path: path.into(),
            options,
        }
    }
}

#[async_trait]
impl RunTrigger for FileRunner {
    async fn trigger(&self) -> Result<PipelineResult> {
        self.executor.run_file(&self.path, &self.options).await
    }

    fn ignore_roots(&self) -> Option<Vec<PathBuf>> {
        let graph = load_document(&self.path)
            .and_then(|doc| StepGraph::from_document(&doc))
            .ok()?;
        let base_dir = self
            .options
            .base_dir_override
            .clone()
            .unwrap_or_else(|| graph.base_dir.clone());
        Some(infer_ignore_roots(&graph, &base_dir))
    }
}

// ---------------------------------------------------------------------------
// WatchController
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct WatchStats {
    pub runs: usize,
    /// Runs that errored before producing a result (bad document, ...).
    pub errors: usize,
    pub last_result: Option<PipelineResult>,
}

pub struct WatchController<T: RunTrigger> {
    trigger: T,
    filter: ChangeFilter,
    config: WatchConfig,
    cancel: CancelSignal,
    events: Option<EventEmitter>,
}

impl<T: RunTrigger> WatchController<T> {
    pub fn new(trigger: T, filter: ChangeFilter, config: WatchConfig) -> Self {
        Self {
            trigger,
            filter,
            config,
            cancel: CancelSignal::new(),
            events: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    /// Watch `root` recursively until cancelled.
    pub async fn watch(&self, root: &Path) -> Result<WatchStats> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        // Dropping the watcher stops its callbacks.
        let _watcher = spawn_fs_watcher(root, tx)?;
        tracing::info!(root = %root.display(), debounce_ms = self.config.debounce.as_millis() as u64, "Watching for changes");
        Ok(self.run_loop(rx).await)
    }

    /// Debounce loop over an arbitrary signal source. Ends on cancellation or
    /// when every sender is gone.
    pub async fn run_loop(&self, mut rx: UnboundedReceiver<WatchSignal>) -> WatchStats {
        let mut stats = WatchStats::default();
        let mut pending: BTreeSet<PathBuf> = BTreeSet::new();
        let mut overflow = false;
        let mut deadline: Option<Instant> = None;
        let mut filter = self.filter.clone();

        if self.config.run_on_start && !self.cancel.is_cancelled() {
            self.run_once(&mut stats, &mut filter, Vec::new(), false).await;
        }

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!("Watch cancelled");
                break;
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::info!("Watch cancelled");
                    break;
                }
                signal = rx.recv() => match signal {
                    Some(WatchSignal::Changed(paths)) => {
                        let relevant: Vec<_> =
                            paths.into_iter().filter(|p| filter.is_relevant(p)).collect();
                        if !relevant.is_empty() {
                            tracing::debug!(paths = relevant.len(), "Relevant change, restarting quiet period");
                            pending.extend(relevant);
                            deadline = Some(Instant::now() + self.config.debounce);
                        }
                    }
                    Some(WatchSignal::Overflow) => {
                        tracing::warn!("File watcher overflow, forcing a run");
                        overflow = true;
                        deadline = Some(Instant::now());
                    }
                    None => {
                        if !pending.is_empty() || overflow {
                            let changed = std::mem::take(&mut pending).into_iter().collect();
                            self.run_once(&mut stats, &mut filter, changed, overflow).await;
                        }
                        break;
                    }
                },
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    deadline = None;
                    let changed = std::mem::take(&mut pending).into_iter().collect();
                    self.run_once(&mut stats, &mut filter, changed, std::mem::take(&mut overflow)).await;
                }
            }
        }

        stats
    }

    async fn run_once(
        &self,
        stats: &mut WatchStats,
        filter: &mut ChangeFilter,
        changed: Vec<PathBuf>,
        overflow: bool,
    ) {
        if !changed.is_empty() || overflow {
            tracing::info!(changed = changed.len(), overflow, "Change detected, re-running pipeline");
            if let Some(events) = &self.events {
                events.emit(PipelineEvent::WatchTriggered {
                    changed: changed.iter().map(|p| p.display().to_string()).collect(),
                    overflow,
                });
            }
        }

        stats.runs += 1;
        match self.trigger.trigger().await {
            Ok(result) => {
                if result.success {
                    tracing::info!(run_id = %result.run_id, duration_ms = result.duration_ms, "Watch run succeeded");
                } else {
                    tracing::warn!(run_id = %result.run_id, aborted_at = ?result.aborted_at, "Watch run failed");
                }
                stats.last_result = Some(result);
            }
            Err(e) if e.is_config() => {
                stats.errors += 1;
                tracing::warn!(error = %e, "Pipeline document is invalid, waiting for the next change");
            }
            Err(e) => {
                stats.errors += 1;
                tracing::error!(error = %e, "Watch run could not start");
            }
        }

        if let Some(roots) = self.trigger.ignore_roots() {
            if roots != filter.ignore_roots() {
                tracing::debug!(roots = roots.len(), "Output locations changed");
                filter.set_ignore_roots(roots);
            }
        }
    }
}

/// Start a recursive `notify` watcher on `root` feeding `tx`.
pub fn spawn_fs_watcher(
    root: &Path,
    tx: UnboundedSender<WatchSignal>,
) -> Result<notify::RecommendedWatcher> {
    use notify::{Event as NotifyEvent, EventKind, RecursiveMode, Watcher};

    let mut watcher = notify::recommended_watcher(move |res: std::result::Result<NotifyEvent, notify::Error>| {
        let signal = match res {
            Ok(event) if event.need_rescan() => WatchSignal::Overflow,
            Ok(event) => {
                if matches!(event.kind, EventKind::Access(_)) || event.paths.is_empty() {
                    return;
                }
                WatchSignal::Changed(event.paths)
            }
            Err(e) => {
                tracing::warn!(error = %e, "File watcher error");
                WatchSignal::Overflow
            }
        };
        let _ = tx.send(signal);
    })
    .map_err(|e| PipelineError::Watch(e.to_string()))?;

    watcher
        .watch(root, RecursiveMode::Recursive)
        .map_err(|e| PipelineError::Watch(e.to_string()))?;
    Ok(watcher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::mpsc::unbounded_channel;

    struct Counter {
        runs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RunTrigger for Counter {
        async fn trigger(&self) -> Result<PipelineResult> {
            let n = self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(PipelineResult {
                run_id: format!("run-{n}"),
                mode: "default".into(),
                steps: Vec::new(),
                success: true,
                duration_ms: 0,
                aborted_at: None,
            })
        }
    }

    fn controller(debounce_ms: u64) -> (WatchController<Counter>, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let filter = ChangeFilter::new("/site", vec![PathBuf::from("/site/dist")]).unwrap();
        let config = WatchConfig {
            debounce: Duration::from_millis(debounce_ms),
            run_on_start: false,
        };
        (
            WatchController::new(Counter { runs: runs.clone() }, filter, config),
            runs,
        )
    }

    /// Reports `/site/public` as the output location once it has run.
    struct MovedOutput {
        runs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RunTrigger for MovedOutput {
        async fn trigger(&self) -> Result<PipelineResult> {
            Counter { runs: self.runs.clone() }.trigger().await
        }

        fn ignore_roots(&self) -> Option<Vec<PathBuf>> {
            (self.runs.load(Ordering::SeqCst) > 0).then(|| vec![PathBuf::from("/site/public")])
        }
    }

    /// Fails every run with a document error.
    struct BrokenDocument;

    #[async_trait]
    impl RunTrigger for BrokenDocument {
        async fn trigger(&self) -> Result<PipelineResult> {
            Err(PipelineError::ConfigError("step 1: missing task".into()))
        }
    }

    fn changed(path: &str) -> WatchSignal {
        WatchSignal::Changed(vec![PathBuf::from(path)])
    }

    #[tokio::test]
    async fn burst_within_window_triggers_one_run() {
        let (ctl, runs) = controller(150);
        let (tx, rx) = unbounded_channel();
        let sender = tokio::spawn(async move {
            for name in ["a.md", "b.md", "c.md"] {
                tx.send(changed(&format!("/site/content/{name}"))).unwrap();
                tokio::time::sleep(Duration::from_millis(30)).await;
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
            drop(tx);
        });
        let stats = ctl.run_loop(rx).await;
        sender.await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(stats.runs, 1);
    }

    #[tokio::test]
    async fn separated_bursts_trigger_separate_runs() {
        let (ctl, runs) = controller(50);
        let (tx, rx) = unbounded_channel();
        tokio::spawn(async move {
            tx.send(changed("/site/a.md")).unwrap();
            tokio::time::sleep(Duration::from_millis(300)).await;
            tx.send(changed("/site/b.md")).unwrap();
            tokio::time::sleep(Duration::from_millis(300)).await;
        });
        ctl.run_loop(rx).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn ignored_changes_do_not_trigger() {
        let (ctl, runs) = controller(20);
        let (tx, rx) = unbounded_channel();
        for path in [
            "/site/dist/index.html",
            "/site/.git/index",
            "/site/content/.post.md.swp",
            "/site/content/post.md~",
            "/site/.DS_Store",
            "/site/theme/node_modules/x/index.js",
        ] {
            tx.send(changed(path)).unwrap();
        }
        drop(tx);
        ctl.run_loop(rx).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn closed_channel_flushes_pending_changes() {
        let (ctl, runs) = controller(10_000);
        let (tx, rx) = unbounded_channel();
        tx.send(changed("/site/content/a.md")).unwrap();
        drop(tx);
        ctl.run_loop(rx).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn overflow_forces_a_run() {
        let (ctl, runs) = controller(10_000);
        let (tx, rx) = unbounded_channel();
        let cancel = ctl.cancel_signal();
        tx.send(WatchSignal::Overflow).unwrap();
        let watcher = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            cancel.cancel();
            drop(tx);
        });
        ctl.run_loop(rx).await;
        watcher.await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_stops_the_loop_and_drops_pending() {
        let (ctl, runs) = controller(10_000);
        let (tx, rx) = unbounded_channel();
        tx.send(changed("/site/a.md")).unwrap();
        let cancel = ctl.cancel_signal();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });
        ctl.run_loop(rx).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        drop(tx);
    }

    #[tokio::test]
    async fn initial_run_happens_before_waiting() {
        let (mut ctl, runs) = controller(50);
        ctl.config.run_on_start = true;
        let (tx, rx) = unbounded_channel::<WatchSignal>();
        drop(tx);
        let stats = ctl.run_loop(rx).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(stats.last_result.unwrap().run_id, "run-0");
    }

    #[tokio::test]
    async fn ignore_roots_follow_the_latest_run() {
        let runs = Arc::new(AtomicUsize::new(0));
        let filter = ChangeFilter::new("/site", vec![PathBuf::from("/site/dist")]).unwrap();
        let config = WatchConfig {
            debounce: Duration::from_millis(20),
            run_on_start: true,
        };
        let ctl = WatchController::new(MovedOutput { runs: runs.clone() }, filter, config);
        let (tx, rx) = unbounded_channel();
        tx.send(changed("/site/public/index.html")).unwrap();
        drop(tx);
        ctl.run_loop(rx).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // The old location counts as a source again.
        let (tx, rx) = unbounded_channel();
        tx.send(changed("/site/dist/index.html")).unwrap();
        drop(tx);
        ctl.run_loop(rx).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn invalid_document_counts_as_error_and_keeps_watching() {
        let filter = ChangeFilter::new("/site", Vec::new()).unwrap();
        let config = WatchConfig {
            debounce: Duration::from_millis(10),
            run_on_start: true,
        };
        let ctl = WatchController::new(BrokenDocument, filter, config);
        let (tx, rx) = unbounded_channel();
        tx.send(changed("/site/sitepipe.json")).unwrap();
        drop(tx);
        let stats = ctl.run_loop(rx).await;
        assert_eq!(stats.runs, 2);
        assert_eq!(stats.errors, 2);
        assert!(stats.last_result.is_none());
    }

    #[test]
    fn file_runner_reads_output_roots_from_the_current_document() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let path = root.join("sitepipe.json");
        let write = |out: &str| {
            let doc = json!({"steps": [{"task": "build", "command": "true", "out": out}]});
            std::fs::write(&path, doc.to_string()).unwrap();
        };
        let runner = FileRunner::new(
            PipelineExecutor::with_default_registry(),
            &path,
            RunOptions::default(),
        );

        write("dist");
        assert_eq!(runner.ignore_roots(), Some(vec![root.join("dist")]));
        write("public");
        assert_eq!(runner.ignore_roots(), Some(vec![root.join("public")]));

        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(runner.ignore_roots(), None);
    }

    #[tokio::test]
    async fn cancel_signal_wakes_waiters() {
        let signal = CancelSignal::new();
        let waiter = {
            let s = signal.clone();
            tokio::spawn(async move { s.cancelled().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        signal.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        // Already-cancelled signals resolve immediately.
        signal.cancelled().await;
    }

    #[test]
    fn output_roots_are_inferred_from_step_options() {
        let steps = json!([
            {"task": "build", "out": "dist"},
            {"task": "transform", "input": "data/site.json", "out": "./dist/site.json", "report": "reports/t.json"},
            {"task": "exec", "command": "x", "baseline": "baselines/lint.json", "dest": "."}
        ]);
        let graph = StepGraph::from_steps(
            steps.as_array().unwrap(),
            PathBuf::from("/site/sitepipe.json"),
            PathBuf::from("/site"),
        )
        .unwrap();
        let roots = infer_ignore_roots(&graph, Path::new("/site"));
        assert_eq!(
            roots,
            vec![
                PathBuf::from("/site/dist"),
                PathBuf::from("/site/dist/site.json"),
                PathBuf::from("/site/reports/t.json"),
                PathBuf::from("/site/baselines/lint.json"),
            ]
        );

        let filter = ChangeFilter::for_graph(&graph, Path::new("/site")).unwrap();
        assert!(!filter.is_relevant(Path::new("/site/dist/a.html")));
        assert!(filter.is_relevant(Path::new("/site/data/site.json")));
        assert!(filter.is_relevant(Path::new("/site/sitepipe.json")));
    }

    #[tokio::test]
    async fn fs_watcher_reports_real_changes() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let (tx, mut rx) = unbounded_channel();
        let _watcher = spawn_fs_watcher(&root, tx).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        std::fs::write(root.join("page.md"), "# hi").unwrap();

        let signal = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match signal {
            WatchSignal::Changed(paths) => {
                assert!(paths.iter().any(|p| p.ends_with("page.md")), "{paths:?}");
            }
            WatchSignal::Overflow => {}
        }
    }
}
