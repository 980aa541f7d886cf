// src/session/task.rs  -  Cancellable worker thread with bounded join
use super::control::SessionControl;
use crate::lock;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[derive(Default)]
struct Latch {
    done: Mutex<bool>,
    cv:   Condvar,
}

impl Latch {
    fn set(&self) {
        *lock(&self.done) = true;
        self.cv.notify_all();
    }

    fn is_set(&self) -> bool { *lock(&self.done) }

    fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut done = lock(&self.done);
        while !*done {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            done = self.cv.wait_timeout(done, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}

/// Sets the latch when the worker body returns or unwinds.
struct ExitGuard(Arc<Latch>);

impl Drop for ExitGuard {
    fn drop(&mut self) { self.0.set(); }
}

/// A worker thread cooperatively cancelled through its [`SessionControl`].
///
/// The body decides where it is safe to stop (chunk boundaries for
/// playback); `stop` only flags and waits a bounded time.
pub struct WorkerTask {
    control: Arc<SessionControl>,
    exited:  Arc<Latch>,
    thread:  Mutex<Option<JoinHandle<()>>>,
}

impl WorkerTask {
    pub fn spawn<F>(name: &str, control: Arc<SessionControl>, body: F) -> std::io::Result<Self>
    where F: FnOnce(&SessionControl) + Send + 'static
    {
        let exited = Arc::new(Latch::default());
        let guard  = ExitGuard(Arc::clone(&exited));
        let ctl    = Arc::clone(&control);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _guard = guard;
                body(&ctl);
            })?;
        Ok(Self { control, exited, thread: Mutex::new(Some(handle)) })
    }

    pub fn control(&self) -> &Arc<SessionControl> { &self.control }

    pub fn cancel(&self) { self.control.cancel(); }

    pub fn has_exited(&self) -> bool { self.exited.is_set() }

    /// Wait up to `timeout` for the worker to exit. On timeout the thread is
    /// detached and keeps running until its own exit path.
    pub fn join_timeout(&self, timeout: Duration) -> bool {
        let exited = self.exited.wait(timeout);
        let handle = lock(&self.thread).take();
        match (exited, handle) {
            (true, Some(h)) => {
                if h.join().is_err() {
                    log::error!("[task] worker panicked");
                }
            }
            (false, Some(h)) => {
                log::warn!(
                    "[task] worker '{}' still running after {:?}  →  detached",
                    h.thread().name().unwrap_or("?"),
                    timeout
                );
            }
            (_, None) => {}
        }
        exited
    }

    /// Cancel + bounded join.
    pub fn stop(&self, timeout: Duration) -> bool {
        self.cancel();
        self.join_timeout(timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn stop_joins_cooperative_worker() {
        let control = Arc::new(SessionControl::new());
        let task = WorkerTask::spawn("coop", control, |ctl| {
            while ctl.checkpoint() {
                thread::sleep(Duration::from_millis(1));
            }
        }).expect("spawn");
        assert!(!task.has_exited());
        assert!(task.stop(Duration::from_secs(2)));
        assert!(task.has_exited());
    }

    #[test]
    fn stuck_worker_is_detached_not_awaited() {
        let release = Arc::new(AtomicBool::new(false));
        let r = Arc::clone(&release);
        let task = WorkerTask::spawn("stuck", Arc::new(SessionControl::new()), move |_| {
            while !r.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(1));
            }
        }).expect("spawn");

        let t0 = Instant::now();
        assert!(!task.stop(Duration::from_millis(30)));
        assert!(t0.elapsed() < Duration::from_secs(1));

        release.store(true, Ordering::SeqCst);
        assert!(task.exited.wait(Duration::from_secs(2)));
    }

    #[test]
    fn latch_is_set_even_if_body_panics() {
        let task = WorkerTask::spawn("panics", Arc::new(SessionControl::new()), |_| {
            panic!("boom");
        }).expect("spawn");
        assert!(task.join_timeout(Duration::from_secs(2)));
    }
}
