use log::debug;
use std::ops::ControlFlow;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// A per-frame callback driven at a fixed rate on the tokio runtime.
///
/// Dropping the loop aborts its task; no frame runs after the drop returns
/// on a current-thread runtime, and at most the one in flight finishes on a
/// multi-threaded one.
pub struct RenderLoop {
    task: JoinHandle<()>,
    label: &'static str,
}

impl RenderLoop {
    /// `frame` receives the frame number and may end the loop with
    /// `ControlFlow::Break`.
    pub fn start<F>(runtime: &Handle, label: &'static str, frame_rate: u32, mut frame: F) -> Self
    where
        F: FnMut(u64) -> ControlFlow<()> + Send + 'static,
    {
        let frame_rate = frame_rate.max(1);
        let period = Duration::from_secs_f64(1.0 / frame_rate as f64);
        debug!("Render loop '{}' started at {} fps", label, frame_rate);

        let task = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            let mut frames = 0u64;
            loop {
                ticker.tick().await;
                if frame(frames).is_break() {
                    break;
                }
                frames += 1;
            }
            debug!("Render loop '{}' finished after {} frames", label, frames);
        });

        Self { task, label }
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn cancel(self) {}
}

impl Drop for RenderLoop {
    fn drop(&mut self) {
        self.task.abort();
        debug!("Render loop '{}' cancelled", self.label);
    }
}
