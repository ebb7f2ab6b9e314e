//! Periodic transport state reporter for UI updates.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread::JoinHandle,
    time::Duration,
};

use crate::playback::transport::TransportState;

/// Snapshot of transport state sent to UI consumers.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub state: TransportState,
    /// Seconds of the local track played so far.
    pub time: f64,
    pub primary_frames: u64,
    pub mix_frames: u64,
    pub finished: bool,
}

impl Default for Report {
    fn default() -> Self {
        Self {
            state: TransportState::Idle,
            time: 0.0,
            primary_frames: 0,
            mix_frames: 0,
            finished: false,
        }
    }
}

/// Callback that produces the current [`Report`].
pub type ReportSource = Arc<dyn Fn() -> Report + Send + Sync>;

/// Background reporter that polls the transport at fixed intervals.
#[derive(Clone)]
pub struct Reporter {
    source: ReportSource,
    report: Arc<Mutex<dyn Fn(Report) + Send>>,
    interval: Duration,
    finish: Arc<AtomicBool>,
    thread_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Reporter {
    /// Create a reporter that hands `source()` to `report` whenever it changes.
    pub fn new(
        source: ReportSource,
        report: Arc<Mutex<dyn Fn(Report) + Send>>,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            report,
            interval,
            finish: Arc::new(AtomicBool::new(false)),
            thread_handle: Arc::new(Mutex::new(None)),
        }
    }

    fn run(&self) {
        let mut last_report: Option<Report> = None;

        loop {
            let report = (self.source)();

            if last_report.as_ref() != Some(&report) {
                (*self.report.lock().unwrap())(report.clone());
                last_report = Some(report);
            }

            if self.finish.load(Ordering::Relaxed) {
                break;
            }

            std::thread::sleep(self.interval);
        }
    }

    /// Start the background reporting thread.
    pub fn start(&self) {
        self.stop();
        self.finish.store(false, Ordering::Relaxed);
        let this = self.clone();
        let handle = std::thread::spawn(move || this.run());
        *self.thread_handle.lock().unwrap() = Some(handle);
    }

    /// Stop the background reporting thread.
    pub fn stop(&self) {
        self.finish.store(true, Ordering::Relaxed);
        if let Some(handle) = self.thread_handle.lock().unwrap().take() {
            if handle.thread().id() == std::thread::current().id() {
                log::warn!("reporter stop called from reporter thread; skipping join");
            } else if handle.join().is_err() {
                log::warn!("reporter thread panicked during join");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle.lock().unwrap().is_some()
    }
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    #[test]
    fn reports_only_on_change() {
        let frames = Arc::new(AtomicU64::new(0));
        let polled = frames.clone();
        let source: ReportSource = Arc::new(move || Report {
            state: TransportState::Playing,
            primary_frames: polled.load(Ordering::Relaxed),
            ..Report::default()
        });
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        let report: Arc<Mutex<dyn Fn(Report) + Send>> =
            Arc::new(Mutex::new(move |report: Report| sink.lock().unwrap().push(report)));

        let reporter = Reporter::new(source, report, Duration::from_millis(2));
        reporter.start();
        std::thread::sleep(Duration::from_millis(30));
        frames.store(480, Ordering::Relaxed);
        std::thread::sleep(Duration::from_millis(30));
        reporter.stop();
        assert!(!reporter.is_running());

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].primary_frames, 0);
        assert_eq!(received[1].primary_frames, 480);
    }
}
