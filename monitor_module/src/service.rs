//! Worker threads driving the monitor at its two cadences.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::monitor::Monitor;
use crate::whatsapp_web::ConversationSource;

/// Granularity at which sleeping workers re-check the stop flag.
const STOP_CHECK_STEP: Duration = Duration::from_millis(250);

pub struct MonitorControl {
    stop: Arc<AtomicBool>,
    handles: Vec<thread::JoinHandle<()>>,
}

impl MonitorControl {
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn stop_and_join(&mut self) {
        self.stop();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

/// Start the poll and summary workers.
///
/// Each task type runs on its own dedicated thread, so one poll always
/// completes before the next poll fires and likewise for summaries; the two
/// task types interleave freely, serialized on the monitor mutex. The poll
/// worker fires once immediately before entering its periodic loop.
pub fn start_monitor_threads<S: ConversationSource + Send + 'static>(
    monitor: Arc<Mutex<Monitor<S>>>,
    check_interval: Duration,
    summary_interval: Duration,
) -> MonitorControl {
    let stop = Arc::new(AtomicBool::new(false));
    let mut handles = Vec::with_capacity(2);

    {
        let monitor = monitor.clone();
        let stop = stop.clone();
        let handle = thread::spawn(move || {
            info!(
                "poll worker started (interval {}s)",
                check_interval.as_secs()
            );
            while !stop.load(Ordering::Relaxed) {
                {
                    let mut monitor = monitor.lock().unwrap_or_else(|poison| poison.into_inner());
                    monitor.poll_once();
                }
                sleep_until_stopped(&stop, check_interval);
            }
            info!("poll worker stopped");
        });
        handles.push(handle);
    }

    {
        let monitor = monitor.clone();
        let stop = stop.clone();
        let handle = thread::spawn(move || {
            info!(
                "summary worker started (interval {}s)",
                summary_interval.as_secs()
            );
            loop {
                sleep_until_stopped(&stop, summary_interval);
                if stop.load(Ordering::Relaxed) {
                    break;
                }
                let mut monitor = monitor.lock().unwrap_or_else(|poison| poison.into_inner());
                if let Err(err) = monitor.generate_summary() {
                    error!("summary generation failed: {}", err);
                }
            }
            info!("summary worker stopped");
        });
        handles.push(handle);
    }

    MonitorControl { stop, handles }
}

fn sleep_until_stopped(stop: &AtomicBool, duration: Duration) {
    let deadline = Instant::now() + duration;
    while !stop.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        thread::sleep(STOP_CHECK_STEP.min(deadline - now));
    }
}
