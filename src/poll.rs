use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel as channel;
use tracing::debug;

pub const LIVE_INTERVAL: Duration = Duration::from_millis(2000);

/// What a tick handler wants the loop to do next.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Tick {
    Continue,
    Stop,
}

/// A periodic task owned by the view that started it.
///
/// The handler runs once immediately and then on every interval, always on
/// the same worker and never overlapping: a tick that outlives the interval
/// delays the next one instead of running beside it. `stop` (or dropping
/// the task) returns only once the worker has exited, so no handler runs
/// after teardown.
pub struct PollTask {
    name: String,
    stop_tx: Option<channel::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PollTask {
    pub fn start<F>(name: impl Into<String>, interval: Duration, mut on_tick: F) -> io::Result<Self>
    where
        F: FnMut() -> Tick + Send + 'static,
    {
        let name = name.into();
        let (stop_tx, stop_rx) = channel::bounded::<()>(1);
        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            let ticker = channel::tick(interval);
            loop {
                if on_tick() == Tick::Stop {
                    break;
                }
                crossbeam_channel::select! {
                    recv(stop_rx) -> _ => break,
                    recv(ticker) -> _ => {}
                }
            }
        })?;
        debug!(task = %name, ?interval, "poll task started");
        Ok(Self { name, stop_tx: Some(stop_tx), handle: Some(handle) })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn stop(&mut self) {
        // dropping the sender wakes the worker's select
        self.stop_tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
            debug!(task = %self.name, "poll task stopped");
        }
    }
}

impl Drop for PollTask {
    fn drop(&mut self) {
        self.stop();
    }
}
