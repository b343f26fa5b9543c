use super::Sweeper;
use crate::codec::Codec;
use crate::map::OffheapMap;
use crate::memory::Allocator;
use core::fmt;
use log::{error, info};
use parking_lot::{Condvar, Mutex};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

#[derive(Default)]
struct State {
    forced: bool,
    stopped: bool,
}

#[derive(Default)]
struct Signal {
    state: Mutex<State>,
    wake: Condvar,
}

impl Signal {
    fn update(&self, change: impl FnOnce(&mut State)) {
        let mut state = self.state.lock();
        change(&mut state);
        self.wake.notify_one();
    }
}

/// A named thread that sweeps a map every `cleanup_interval` milliseconds.
///
/// The interval is re-read from the map's [`Settings`](crate::config::Settings)
/// before every wait, so changing it takes effect after the current wait.
/// With an interval of 0 the thread sleeps until [`force`](Self::force).
/// [`force`](Self::force) starts a sweep right away. Dropping the handle
/// stops the thread and waits for it.
///
/// A sweep that panics is logged and the thread carries on with the next
/// interval.
pub struct CleanupThread {
    name: String,
    signal: Arc<Signal>,
    handle: Option<JoinHandle<()>>,
}

impl CleanupThread {
    /// Starts a thread called `name` running `sweeper` against `map`.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be created.
    pub fn spawn<C, A, S>(name: impl Into<String>, map: Arc<OffheapMap<C, A>>, sweeper: S) -> io::Result<Self>
    where
        C: Codec + 'static,
        A: Allocator + 'static,
        S: Sweeper + Send + 'static,
    {
        let name = name.into();
        let signal = Arc::new(Signal::default());
        let handle = thread::Builder::new().name(name.clone()).spawn({
            let name = name.clone();
            let signal = Arc::clone(&signal);
            move || run(&name, &map, sweeper, &signal)
        })?;

        Ok(Self {
            name,
            signal,
            handle: Some(handle),
        })
    }

    /// Name of the thread.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wakes the thread to sweep now instead of at the end of the interval.
    pub fn force(&self) {
        self.signal.update(|state| state.forced = true);
    }

    /// Stops the thread, waiting for a running sweep to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.signal.update(|state| state.stopped = true);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("{} terminated abnormally", self.name);
            }
        }
    }
}

impl Drop for CleanupThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for CleanupThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanupThread")
            .field("name", &self.name)
            .field("running", &self.handle.is_some())
            .finish()
    }
}

fn run<C, A, S>(name: &str, map: &OffheapMap<C, A>, mut sweeper: S, signal: &Signal)
where
    C: Codec,
    A: Allocator,
    S: Sweeper,
{
    loop {
        {
            let mut state = signal.state.lock();
            if !state.forced && !state.stopped {
                // an interval of 0 means sweep only when forced
                match map.settings().cleanup_interval() {
                    0 => signal.wake.wait(&mut state),
                    _ => {
                        let interval = map.settings().cleanup_interval_duration();
                        signal.wake.wait_for(&mut state, interval);
                    }
                }
            }
            if state.stopped {
                return;
            }
            state.forced = false;
        }

        let start = Instant::now();
        match panic::catch_unwind(AssertUnwindSafe(|| sweeper.sweep(map))) {
            Ok(0) => {}
            Ok(cleaned) => info!(
                "{} cleaned {} entries in {} ms",
                name,
                cleaned,
                start.elapsed().as_millis()
            ),
            Err(_) => error!("sweep panicked in {}", name),
        }
    }
}
