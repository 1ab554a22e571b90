//! Start/stop control shared by the scheduler and observer loops.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{watch, Notify};

struct Shared {
    /// Next loop generation. Every flag or liveness decision is made while
    /// this is locked.
    generation: Mutex<u64>,
    running: watch::Sender<bool>,
    /// Generation of the loop task that is alive, if any.
    live: watch::Sender<Option<u64>>,
    wake: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, u64> {
        self.generation.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the live marker if the loop task ends without passing through
/// `should_exit`, e.g. on panic or runtime shutdown.
struct Release {
    shared: Arc<Shared>,
    generation: u64,
}

impl Drop for Release {
    fn drop(&mut self) {
        let _guard = self.shared.lock();
        self.shared.live.send_if_modified(|live| {
            if *live == Some(self.generation) {
                *live = None;
                true
            } else {
                false
            }
        });
    }
}

/// A continue flag plus the single live task of a long-lived loop.
///
/// A loop stays live until it observes a cleared flag in `should_exit`, so a
/// `start` that races with `stop` or `shutdown` revives the existing loop
/// instead of spawning a second one.
pub(crate) struct LoopControl {
    shared: Arc<Shared>,
}

impl LoopControl {
    pub(crate) fn new() -> Self {
        let (running, _) = watch::channel(false);
        let (live, _) = watch::channel(None);
        Self {
            shared: Arc::new(Shared {
                generation: Mutex::new(0),
                running,
                live,
                wake: Notify::new(),
            }),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        *self.shared.running.borrow()
    }

    /// Set the flag and spawn `body` unless a loop is already alive.
    /// Returns `true` if a new loop was spawned.
    pub(crate) fn start<F>(&self, body: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut generation = self.shared.lock();
        self.shared.running.send_replace(true);
        if self.shared.live.borrow().is_some() {
            return false;
        }
        *generation += 1;
        let release = Release {
            shared: self.shared.clone(),
            generation: *generation,
        };
        self.shared.live.send_replace(Some(*generation));
        tokio::spawn(async move {
            let _release = release;
            body.await;
        });
        true
    }

    /// Clear the flag. The loop finishes its current iteration and exits.
    pub(crate) fn stop(&self) {
        let _guard = self.shared.lock();
        self.shared.running.send_replace(false);
    }

    /// Called by the loop between iterations. Returns `true` if the loop
    /// must exit, releasing its live marker.
    pub(crate) fn should_exit(&self) -> bool {
        let _guard = self.shared.lock();
        if *self.shared.running.borrow() {
            return false;
        }
        self.shared.live.send_replace(None);
        true
    }

    /// Sleep for `delay`, returning early on `stop` or `wake`.
    pub(crate) async fn pause(&self, delay: Duration) {
        let mut running = self.shared.running.subscribe();
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = running.wait_for(|r| !*r) => {}
            _ = self.shared.wake.notified() => {}
        }
    }

    /// Cut the current pause short.
    pub(crate) fn wake(&self) {
        self.shared.wake.notify_one();
    }

    /// Stop and wait for the loop to finish its current iteration.
    ///
    /// Returns early if a `start` revives the loop before it exits.
    pub(crate) async fn shutdown(&self) {
        self.stop();
        let mut live = self.shared.live.subscribe();
        let mut running = self.shared.running.subscribe();
        tokio::select! {
            _ = live.wait_for(Option::is_none) => {}
            _ = running.wait_for(|r| *r) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn counting_loop(control: Arc<LoopControl>, ticks: Arc<AtomicU32>) -> impl Future<Output = ()> {
        async move {
            loop {
                ticks.fetch_add(1, Ordering::SeqCst);
                control.pause(Duration::from_secs(1)).await;
                if control.should_exit() {
                    return;
                }
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_does_not_spawn() {
        let control = Arc::new(LoopControl::new());
        let ticks = Arc::new(AtomicU32::new(0));
        assert!(control.start(counting_loop(control.clone(), ticks.clone())));
        assert!(!control.start(counting_loop(control.clone(), ticks.clone())));

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);

        control.shutdown().await;
        assert!(!control.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cuts_pause_short_and_restart_spawns_again() {
        let control = Arc::new(LoopControl::new());
        let ticks = Arc::new(AtomicU32::new(0));
        control.start(counting_loop(control.clone(), ticks.clone()));
        tokio::task::yield_now().await;

        control.shutdown().await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);

        assert!(control.start(counting_loop(control.clone(), ticks.clone())));
        tokio::task::yield_now().await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
        control.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn wake_skips_remaining_pause() {
        let control = Arc::new(LoopControl::new());
        let ticks = Arc::new(AtomicU32::new(0));
        control.start(counting_loop(control.clone(), ticks.clone()));
        tokio::task::yield_now().await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);

        control.wake();
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
        control.shutdown().await;
    }

    /// Tracks how many iterations are in flight at once.
    #[derive(Default)]
    struct Overlap {
        active: AtomicU32,
        max: AtomicU32,
        iterations: AtomicU32,
    }

    fn working_loop(control: Arc<LoopControl>, overlap: Arc<Overlap>) -> impl Future<Output = ()> {
        async move {
            loop {
                let now = overlap.active.fetch_add(1, Ordering::SeqCst) + 1;
                overlap.max.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(3)).await;
                overlap.active.fetch_sub(1, Ordering::SeqCst);
                overlap.iterations.fetch_add(1, Ordering::SeqCst);
                control.pause(Duration::from_secs(1)).await;
                if control.should_exit() {
                    return;
                }
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn start_during_shutdown_revives_the_same_loop() {
        let control = Arc::new(LoopControl::new());
        let overlap = Arc::new(Overlap::default());
        assert!(control.start(working_loop(control.clone(), overlap.clone())));
        tokio::time::sleep(Duration::from_secs(1)).await;

        let stopping = control.clone();
        let shutdown = tokio::spawn(async move { stopping.shutdown().await });
        tokio::task::yield_now().await;
        assert!(!control.start(working_loop(control.clone(), overlap.clone())));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(shutdown.is_finished());
        assert_eq!(overlap.max.load(Ordering::SeqCst), 1);
        assert!(control.is_running());
        assert!(overlap.iterations.load(Ordering::SeqCst) >= 2);

        control.shutdown().await;
        assert!(!control.is_running());
        assert_eq!(overlap.active.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_then_start_before_exit_keeps_one_loop() {
        let control = Arc::new(LoopControl::new());
        let overlap = Arc::new(Overlap::default());
        control.start(working_loop(control.clone(), overlap.clone()));
        tokio::time::sleep(Duration::from_secs(1)).await;

        control.stop();
        assert!(!control.start(working_loop(control.clone(), overlap.clone())));
        control.stop();
        assert!(!control.start(working_loop(control.clone(), overlap.clone())));

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(overlap.max.load(Ordering::SeqCst), 1);
        assert!(overlap.iterations.load(Ordering::SeqCst) >= 4);
        control.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_then_start_spawns_after_exit() {
        let control = Arc::new(LoopControl::new());
        let overlap = Arc::new(Overlap::default());
        control.start(working_loop(control.clone(), overlap.clone()));
        tokio::time::sleep(Duration::from_secs(1)).await;

        control.shutdown().await;
        assert_eq!(overlap.iterations.load(Ordering::SeqCst), 1);
        assert!(control.start(working_loop(control.clone(), overlap.clone())));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(overlap.max.load(Ordering::SeqCst), 1);
        control.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn panicked_loop_can_be_restarted() {
        let control = Arc::new(LoopControl::new());
        assert!(control.start(async { panic!("loop body failed") }));
        tokio::time::sleep(Duration::from_millis(10)).await;

        let ticks = Arc::new(AtomicU32::new(0));
        assert!(control.start(counting_loop(control.clone(), ticks.clone())));
        tokio::task::yield_now().await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
        control.shutdown().await;
    }
}
