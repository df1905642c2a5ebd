//! Batch conversion scheduler.
//!
//! Converts a queue of files under one settings snapshot with a fixed
//! concurrency cap, tracks per-file and aggregate results, and supports
//! cooperative cancellation. All scheduler state is mutated inside the
//! admit/complete transitions, each of which runs under the state mutex,
//! so concurrent completions cannot race the terminal-batch check.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::{BatchEvent, ConversionSettings, ImageFile};
use crate::processing::{ConversionEngine, FileConverter};
use crate::utils::{next_available_path, output_file_name, ConverterError};

/// Maximum simultaneous conversions unless configured otherwise.
pub const DEFAULT_MAX_CONCURRENT: usize = 4;

/// Result of a single file conversion within a batch.
///
/// Created by the scheduler's completion handlers and never mutated
/// afterwards; consumed by the UI summary.
#[derive(Debug, Clone)]
pub struct BatchFileResult {
    pub file: ImageFile,
    pub success: bool,
    pub output_path: Option<PathBuf>,
    /// Negative when the output is larger than the source
    pub bytes_saved: i64,
    pub error_message: String,
}

/// Per-batch state, owned exclusively by the scheduler.
struct BatchState {
    queue: VecDeque<ImageFile>,
    active: HashMap<ImageFile, JoinHandle<()>>,
    completed: Vec<BatchFileResult>,
    failed: Vec<BatchFileResult>,
    settings: Arc<ConversionSettings>,
    output_folder: PathBuf,
    running: bool,
    total: usize,
    next_index: usize,
}

impl BatchState {
    fn idle() -> Self {
        Self {
            queue: VecDeque::new(),
            active: HashMap::new(),
            completed: Vec::new(),
            failed: Vec::new(),
            settings: Arc::new(ConversionSettings::default()),
            output_folder: PathBuf::new(),
            running: false,
            total: 0,
            next_index: 0,
        }
    }
}

/// Schedules batch conversions with bounded concurrency.
///
/// Cloning is cheap (shared state behind an `Arc`); completion handlers
/// hold their own clone. Must be used from within a Tokio runtime:
/// conversions run on the blocking thread pool and completions are handled
/// on runtime tasks.
#[derive(Clone)]
pub struct BatchScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    state: Mutex<BatchState>,
    cancel_requested: AtomicBool,
    events: UnboundedSender<BatchEvent>,
    converter: Arc<dyn FileConverter>,
    max_concurrent: usize,
}

impl BatchScheduler {
    /// Creates a scheduler backed by the real conversion engine.
    pub fn new(events: UnboundedSender<BatchEvent>, max_concurrent: usize) -> Self {
        Self::with_converter(events, max_concurrent, Arc::new(ConversionEngine::new()))
    }

    /// Creates a scheduler with a custom converter (used by tests).
    pub fn with_converter(
        events: UnboundedSender<BatchEvent>,
        max_concurrent: usize,
        converter: Arc<dyn FileConverter>,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                state: Mutex::new(BatchState::idle()),
                cancel_requested: AtomicBool::new(false),
                events,
                converter,
                max_concurrent: max_concurrent.clamp(1, 16),
            }),
        }
    }

    /// Starts converting `files` under a snapshot of `settings`, writing
    /// into `output_folder`.
    ///
    /// Returns `false` (leaving the running batch untouched) if a batch is
    /// already active.
    pub fn start_batch(
        &self,
        files: Vec<ImageFile>,
        settings: ConversionSettings,
        output_folder: PathBuf,
    ) -> bool {
        let mut st = self.state();
        if st.running {
            warn!("Batch already running. Ignoring new batch request.");
            return false;
        }

        let total = files.len();
        *st = BatchState {
            queue: files.into_iter().collect(),
            active: HashMap::new(),
            completed: Vec::new(),
            failed: Vec::new(),
            settings: Arc::new(settings),
            output_folder,
            running: true,
            total,
            next_index: 0,
        };
        self.inner.cancel_requested.store(false, Ordering::SeqCst);
        info!("Starting batch conversion of {total} files");

        for _ in 0..self.inner.max_concurrent.min(total) {
            self.admit_next(&mut st);
        }
        // An empty batch is terminal right away
        self.check_batch_completion(&mut st);
        true
    }

    /// Requests cooperative cancellation.
    ///
    /// Prevents new admissions only; already-running conversions finish
    /// naturally and are counted in the final tallies.
    pub fn cancel_all(&self) {
        let st = self.state();
        if !st.running {
            return;
        }
        self.inner.cancel_requested.store(true, Ordering::SeqCst);
        warn!(
            "Batch cancellation requested. {} files will be skipped.",
            st.queue.len()
        );
    }

    /// Whether a batch is currently active.
    pub fn is_running(&self) -> bool {
        self.state().running
    }

    /// (active, pending, completed, failed) counts from one consistent
    /// snapshot of the scheduler state.
    pub fn progress_counts(&self) -> (usize, usize, usize, usize) {
        let st = self.state();
        (
            st.active.len(),
            st.queue.len(),
            st.completed.len(),
            st.failed.len(),
        )
    }

    /// Results of files converted so far in the current/last batch.
    pub fn completed_results(&self) -> Vec<BatchFileResult> {
        self.state().completed.clone()
    }

    /// Results of files that failed so far in the current/last batch.
    pub fn failed_results(&self) -> Vec<BatchFileResult> {
        self.state().failed.clone()
    }

    fn state(&self) -> MutexGuard<'_, BatchState> {
        // A worker thread can only poison this lock by panicking mid-update;
        // the stored counters remain usable for reporting.
        self.inner
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Admits the next pending file, respecting the concurrency cap and the
    /// cancellation flag. Called with the state lock held.
    fn admit_next(&self, st: &mut BatchState) {
        if self.inner.cancel_requested.load(Ordering::SeqCst) {
            return;
        }
        if st.active.len() >= self.inner.max_concurrent {
            return;
        }
        let Some(file) = st.queue.pop_front() else {
            return;
        };
        st.next_index += 1;
        let index = st.next_index;
        let total = st.total;

        let mut output_path = st.output_folder.join(output_file_name(&file, &st.settings));
        if st.settings.auto_increment && output_path.exists() {
            output_path = next_available_path(&output_path);
        }

        // Started must be announced before the worker can emit progress
        let _ = self.inner.events.send(BatchEvent::FileStarted {
            file: file.clone(),
            index,
            total,
        });
        debug!("Starting conversion [{index}/{total}]: {}", file.filename());

        let scheduler = self.clone();
        let settings = Arc::clone(&st.settings);
        let task_file = file.clone();
        let handle = tokio::spawn(async move {
            let events = scheduler.inner.events.clone();
            let progress_file = task_file.clone();
            let input_file = task_file.clone();
            let converter = Arc::clone(&scheduler.inner.converter);
            let joined = tokio::task::spawn_blocking(move || {
                let progress = move |percent: u8| {
                    let _ = events.send(BatchEvent::FileProgress {
                        file: progress_file.clone(),
                        percent,
                    });
                };
                converter.convert(&input_file.path, &output_path, &settings, &progress)
            })
            .await;

            let result = match joined {
                Ok(result) => result,
                // A panicking conversion is recorded as that file's failure,
                // never as a scheduler fault.
                Err(e) => Err(ConverterError::processing(format!(
                    "Conversion task panicked: {e}"
                ))),
            };
            scheduler.on_file_done(task_file, result);
        });

        st.active.insert(file, handle);
    }

    /// Handles one file's completion: records the result, refills the freed
    /// slot, and fires the terminal event when the batch has drained.
    fn on_file_done(
        &self,
        file: ImageFile,
        result: Result<crate::core::ConversionOutcome, ConverterError>,
    ) {
        let mut st = self.state();
        st.active.remove(&file);

        match result {
            Ok(outcome) => {
                let bytes_saved = file.size_bytes as i64 - outcome.output_size as i64;
                st.completed.push(BatchFileResult {
                    file: file.clone(),
                    success: true,
                    output_path: Some(outcome.output_path.clone()),
                    bytes_saved,
                    error_message: String::new(),
                });
                let _ = self.inner.events.send(BatchEvent::FileCompleted {
                    file: file.clone(),
                    output_path: outcome.output_path,
                    bytes_saved,
                });
                info!(
                    "Completed: {} (saved {:.1} KB)",
                    file.filename(),
                    bytes_saved as f64 / 1024.0
                );
            }
            Err(e) => {
                let message = e.to_string();
                st.failed.push(BatchFileResult {
                    file: file.clone(),
                    success: false,
                    output_path: None,
                    bytes_saved: 0,
                    error_message: message.clone(),
                });
                let _ = self.inner.events.send(BatchEvent::FileFailed {
                    file: file.clone(),
                    error: message.clone(),
                });
                warn!("Failed: {} - {message}", file.filename());
            }
        }

        // An individual failure never aborts the batch; try to refill the
        // slot immediately.
        self.admit_next(&mut st);
        self.check_batch_completion(&mut st);
    }

    /// Fires the terminal event exactly once when no work remains.
    fn check_batch_completion(&self, st: &mut BatchState) {
        if !st.running {
            return;
        }
        let cancelled = self.inner.cancel_requested.load(Ordering::SeqCst);
        if !st.active.is_empty() || (!st.queue.is_empty() && !cancelled) {
            return;
        }

        st.running = false;
        let successful = st.completed.len();
        let failed = st.failed.len();
        let _ = self.inner.events.send(BatchEvent::BatchFinished {
            total: st.total,
            successful,
            failed,
        });
        info!("Batch conversion finished: {successful} successful, {failed} failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ConversionOutcome, SizeTargetStatus};
    use crate::utils::ConverterResult;
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    struct StubConverter {
        delay: Duration,
        current: AtomicUsize,
        peak: AtomicUsize,
        fail_marker: Option<&'static str>,
    }

    impl StubConverter {
        fn new(delay_ms: u64) -> Arc<Self> {
            Arc::new(Self {
                delay: Duration::from_millis(delay_ms),
                current: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                fail_marker: None,
            })
        }

        fn failing_on(delay_ms: u64, marker: &'static str) -> Arc<Self> {
            Arc::new(Self {
                delay: Duration::from_millis(delay_ms),
                current: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                fail_marker: Some(marker),
            })
        }
    }

    impl FileConverter for StubConverter {
        fn convert(
            &self,
            input: &Path,
            output: &Path,
            _settings: &ConversionSettings,
            progress: &(dyn Fn(u8) + Send + Sync),
        ) -> ConverterResult<ConversionOutcome> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            progress(50);
            std::thread::sleep(self.delay);
            self.current.fetch_sub(1, Ordering::SeqCst);

            if let Some(marker) = self.fail_marker {
                if input.to_string_lossy().contains(marker) {
                    return Err(ConverterError::decode("stub decode failure"));
                }
            }
            Ok(ConversionOutcome {
                message: "ok".into(),
                output_path: output.to_path_buf(),
                output_size: 10,
                quality_used: None,
                size_target: SizeTargetStatus::NotRequested,
            })
        }
    }

    fn files(names: &[&str]) -> Vec<ImageFile> {
        names
            .iter()
            .map(|name| ImageFile {
                path: PathBuf::from(format!("/virtual/{name}.png")),
                size_bytes: 100,
                width: Some(1),
                height: Some(1),
                format: Some("PNG".into()),
            })
            .collect()
    }

    async fn drain_until_finished(rx: &mut UnboundedReceiver<BatchEvent>) -> Vec<BatchEvent> {
        let mut events = Vec::new();
        tokio::time::timeout(Duration::from_secs(30), async {
            while let Some(event) = rx.recv().await {
                let done = matches!(event, BatchEvent::BatchFinished { .. });
                events.push(event);
                if done {
                    break;
                }
            }
        })
        .await
        .expect("batch did not finish in time");
        events
    }

    fn finished_counts(events: &[BatchEvent]) -> (usize, usize, usize) {
        let mut found = None;
        for event in events {
            if let BatchEvent::BatchFinished {
                total,
                successful,
                failed,
            } = event
            {
                assert!(found.is_none(), "BatchFinished fired more than once");
                found = Some((*total, *successful, *failed));
            }
        }
        found.expect("no BatchFinished event")
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrency_never_exceeds_the_cap() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let stub = StubConverter::new(30);
        let scheduler = BatchScheduler::with_converter(tx, 4, stub.clone());

        let names: Vec<String> = (0..10).map(|i| format!("file{i}")).collect();
        let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
        assert!(scheduler.start_batch(
            files(&name_refs),
            ConversionSettings::default(),
            PathBuf::from("/virtual/out"),
        ));

        // Every observed snapshot accounts for all ten files
        while scheduler.is_running() {
            let (active, pending, completed, failed) = scheduler.progress_counts();
            assert!(active <= 4, "active workers exceeded the cap: {active}");
            assert_eq!(active + pending + completed + failed, 10);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let events = drain_until_finished(&mut rx).await;
        assert_eq!(finished_counts(&events), (10, 10, 0));
        assert!(stub.peak.load(Ordering::SeqCst) <= 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn one_failure_does_not_abort_the_batch() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let stub = StubConverter::failing_on(5, "bad");
        let scheduler = BatchScheduler::with_converter(tx, 4, stub);

        let names: Vec<String> = (0..10)
            .map(|i| if i == 3 { "bad3".to_string() } else { format!("file{i}") })
            .collect();
        let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
        scheduler.start_batch(
            files(&name_refs),
            ConversionSettings::default(),
            PathBuf::from("/virtual/out"),
        );

        let events = drain_until_finished(&mut rx).await;
        assert_eq!(finished_counts(&events), (10, 9, 1));
        assert!(events.iter().any(|e| matches!(
            e,
            BatchEvent::FileFailed { file, .. } if file.filename() == "bad3.png"
        )));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn cancellation_skips_pending_files_and_finishes_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let scheduler = BatchScheduler::with_converter(tx, 4, StubConverter::new(100));

        let names: Vec<String> = (0..10).map(|i| format!("file{i}")).collect();
        let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
        scheduler.start_batch(
            files(&name_refs),
            ConversionSettings::default(),
            PathBuf::from("/virtual/out"),
        );
        // The four admitted conversions run to natural completion; the other
        // six are never admitted.
        scheduler.cancel_all();

        let events = drain_until_finished(&mut rx).await;
        let (total, successful, failed) = finished_counts(&events);
        assert_eq!(total, 10);
        assert_eq!(successful + failed, 4);
        let skipped = total - successful - failed;
        assert_eq!(skipped, 6);
        assert!(!scheduler.is_running());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn second_start_is_rejected_while_running() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let scheduler = BatchScheduler::with_converter(tx, 2, StubConverter::new(40));

        assert!(scheduler.start_batch(
            files(&["a", "b", "c"]),
            ConversionSettings::default(),
            PathBuf::from("/virtual/out"),
        ));
        assert!(!scheduler.start_batch(
            files(&["x"]),
            ConversionSettings::default(),
            PathBuf::from("/virtual/out"),
        ));

        let events = drain_until_finished(&mut rx).await;
        // The running batch was unaffected by the rejected request
        assert_eq!(finished_counts(&events), (3, 3, 0));

        // A new batch is allowed once the previous one finished
        assert!(scheduler.start_batch(
            files(&["x"]),
            ConversionSettings::default(),
            PathBuf::from("/virtual/out"),
        ));
        let events = drain_until_finished(&mut rx).await;
        assert_eq!(finished_counts(&events), (1, 1, 0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn empty_batch_finishes_immediately() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let scheduler = BatchScheduler::with_converter(tx, 4, StubConverter::new(1));

        scheduler.start_batch(
            Vec::new(),
            ConversionSettings::default(),
            PathBuf::from("/virtual/out"),
        );
        assert!(!scheduler.is_running());
        let events = drain_until_finished(&mut rx).await;
        assert_eq!(finished_counts(&events), (0, 0, 0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn per_file_events_are_ordered() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let scheduler = BatchScheduler::with_converter(tx, 4, StubConverter::new(5));

        scheduler.start_batch(
            files(&["only"]),
            ConversionSettings::default(),
            PathBuf::from("/virtual/out"),
        );
        let events = drain_until_finished(&mut rx).await;

        let kinds: Vec<&'static str> = events
            .iter()
            .map(|e| match e {
                BatchEvent::FileStarted { index, total, .. } => {
                    assert_eq!((*index, *total), (1, 1));
                    "started"
                }
                BatchEvent::FileProgress { .. } => "progress",
                BatchEvent::FileCompleted { bytes_saved, .. } => {
                    assert_eq!(*bytes_saved, 90);
                    "completed"
                }
                BatchEvent::FileFailed { .. } => "failed",
                BatchEvent::BatchFinished { .. } => "finished",
            })
            .collect();
        assert_eq!(kinds, vec!["started", "progress", "completed", "finished"]);
    }
}
