//! Cooperative single-step worker thread
//!
//! [`ExecutionThread`] runs one worker computation on a dedicated thread while the
//! owning ("organizer") thread controls its pace. The worker may only pause or
//! stop inside [`Cooperator::cooperate`], its cooperation point.
//!
//! # Modes
//!
//! | Mode            | Worker at a cooperation point                          |
//! |-----------------|--------------------------------------------------------|
//! | `RunningFree`   | continues immediately                                  |
//! | `WaitForResume` | reports arrival, then blocks until granted a step      |
//! | terminate       | returns [`Cancelled`], which the worker propagates out |
//!
//! # Handshake
//!
//! Two one-way channels share a mutex:
//! - organizer → worker: the `requested` counter, bumped by [`resume`] and
//!   [`cycle`]; the worker tracks how many grants it has `consumed`
//! - worker → organizer: the `arrivals` counter, bumped each time the worker
//!   parks, plus the `finished` flag
//!
//! Counters only ever grow, so a wakeup is genuine exactly when the counter the
//! waiter watches has moved. In `WaitForResume` mode the worker parks once before
//! its first statement and once after every granted statement, so after
//! `cycle()` returns with `requested == n` the worker has arrived `n + 1` times:
//! it has run exactly `n` statements and is parked before the next one.
//!
//! That proof of quiescence is what lets the organizer inspect shared program
//! state without any finer-grained locking.
//!
//! [`resume`]: ExecutionThread::resume
//! [`cycle`]: ExecutionThread::cycle

use super::errors::ThreadError;
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Pacing requested by the organizer when starting the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    RunningFree,
    WaitForResume,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    RunningFree,
    WaitForResume,
    Terminate,
}

impl From<RunMode> for Mode {
    fn from(mode: RunMode) -> Self {
        match mode {
            RunMode::RunningFree => Mode::RunningFree,
            RunMode::WaitForResume => Mode::WaitForResume,
        }
    }
}

/// Returned from a cooperation point once termination has been requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

/// How a worker ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T, E> {
    Finished(T),
    Failed(E),
    /// Stopped on request; not an error
    Cancelled,
    Panicked(String),
}

#[derive(Debug)]
struct Signals {
    mode: Mode,
    requested: u64,
    consumed: u64,
    arrivals: u64,
    finished: bool,
}

#[derive(Debug)]
struct Shared {
    signals: Mutex<Signals>,
    to_worker: Condvar,
    to_organizer: Condvar,
}

/// The worker's handle on the handshake.
#[derive(Debug, Clone)]
pub struct Cooperator {
    shared: Arc<Shared>,
}

impl Cooperator {
    /// The cooperation point. Returns immediately when running free, parks when
    /// stepping, and fails with [`Cancelled`] once termination is requested.
    pub fn cooperate(&self) -> Result<(), Cancelled> {
        let mut signals = self.shared.signals.lock();
        match signals.mode {
            Mode::RunningFree => return Ok(()),
            Mode::Terminate => return Err(Cancelled),
            Mode::WaitForResume => {}
        }

        signals.arrivals += 1;
        tracing::trace!(arrivals = signals.arrivals, "worker parked");
        self.shared.to_organizer.notify_all();

        loop {
            match signals.mode {
                Mode::Terminate => return Err(Cancelled),
                Mode::RunningFree => return Ok(()),
                Mode::WaitForResume if signals.requested > signals.consumed => {
                    signals.consumed += 1;
                    return Ok(());
                }
                Mode::WaitForResume => self.shared.to_worker.wait(&mut signals),
            }
        }
    }
}

/// Marks the worker finished even if it unwinds by panic.
struct FinishGuard(Arc<Shared>);

impl Drop for FinishGuard {
    fn drop(&mut self) {
        let mut signals = self.0.signals.lock();
        signals.finished = true;
        self.0.to_organizer.notify_all();
    }
}

type Worker<T, E> = Box<dyn FnOnce(Cooperator) -> Outcome<T, E> + Send>;

pub struct ExecutionThread<T, E> {
    shared: Arc<Shared>,
    worker: Option<Worker<T, E>>,
    handle: Option<JoinHandle<Outcome<T, E>>>,
    outcome: Option<Outcome<T, E>>,
    stack_size: Option<usize>,
}

impl<T, E> ExecutionThread<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    pub fn new<F>(worker: F) -> Self
    where
        F: FnOnce(Cooperator) -> Outcome<T, E> + Send + 'static,
    {
        ExecutionThread {
            shared: Arc::new(Shared {
                signals: Mutex::new(Signals {
                    mode: Mode::RunningFree,
                    requested: 0,
                    consumed: 0,
                    arrivals: 0,
                    finished: false,
                }),
                to_worker: Condvar::new(),
                to_organizer: Condvar::new(),
            }),
            worker: Some(Box::new(worker)),
            handle: None,
            outcome: None,
            stack_size: None,
        }
    }

    /// Native stack size for the worker thread.
    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    fn spawn(&mut self, mode: Mode) -> Result<(), ThreadError> {
        if self.handle.is_some() || self.outcome.is_some() {
            return Err(ThreadError::AlreadyStarted);
        }
        let worker = self.worker.take().ok_or(ThreadError::Terminated)?;
        self.shared.signals.lock().mode = mode;

        let cooperator = Cooperator {
            shared: Arc::clone(&self.shared),
        };
        let guard = FinishGuard(Arc::clone(&self.shared));
        let mut builder = thread::Builder::new().name("cvm-worker".to_string());
        if let Some(bytes) = self.stack_size {
            builder = builder.stack_size(bytes);
        }
        let handle = builder
            .spawn(move || {
                let _guard = guard;
                worker(cooperator)
            })
            .map_err(|e| ThreadError::Spawn(e.to_string()))?;

        tracing::debug!(?mode, "worker started");
        self.handle = Some(handle);
        Ok(())
    }

    /// Start the worker running free and block until it ends.
    pub fn run_blocking(&mut self) -> Result<(), ThreadError> {
        self.spawn(Mode::RunningFree)?;
        self.join();
        Ok(())
    }

    /// Start the worker without waiting for it.
    pub fn start_async(&mut self, mode: RunMode) -> Result<(), ThreadError> {
        self.spawn(mode.into())
    }

    /// Grant the worker one more step and return immediately.
    pub fn resume(&mut self) -> Result<(), ThreadError> {
        self.ensure_stepping()?;
        let mut signals = self.shared.signals.lock();
        signals.requested += 1;
        self.shared.to_worker.notify_all();
        Ok(())
    }

    /// Grant the worker one more step and block until it has parked at its next
    /// cooperation point or finished.
    pub fn cycle(&mut self) -> Result<(), ThreadError> {
        self.ensure_stepping()?;
        let mut signals = self.shared.signals.lock();
        if !signals.finished {
            signals.requested += 1;
            let target = signals.requested + 1;
            self.shared.to_worker.notify_all();
            while signals.arrivals < target && !signals.finished {
                self.shared.to_organizer.wait(&mut signals);
            }
        }
        let finished = signals.finished;
        drop(signals);

        if finished {
            self.join();
        }
        Ok(())
    }

    fn ensure_stepping(&self) -> Result<(), ThreadError> {
        if self.handle.is_none() && self.outcome.is_none() {
            return Err(ThreadError::NotStarted);
        }
        match self.shared.signals.lock().mode {
            Mode::WaitForResume => Ok(()),
            Mode::RunningFree => Err(ThreadError::NotStepping),
            Mode::Terminate => Err(ThreadError::Terminated),
        }
    }

    /// Request cancellation and block until the worker thread has joined.
    /// Idempotent, and a no-op on a worker that never started.
    pub fn terminate(&mut self) {
        {
            let mut signals = self.shared.signals.lock();
            if !signals.finished {
                signals.mode = Mode::Terminate;
            }
            self.shared.to_worker.notify_all();
        }
        if self.worker.take().is_some() {
            tracing::debug!("worker discarded before start");
        }
        self.join();
    }

    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let outcome = handle
                .join()
                .unwrap_or_else(|payload| Outcome::Panicked(panic_message(payload)));
            tracing::debug!("worker joined");
            self.outcome = Some(outcome);
        }
    }

    pub fn is_started(&self) -> bool {
        self.handle.is_some() || self.outcome.is_some()
    }

    /// Started and not yet finished
    pub fn is_running(&self) -> bool {
        self.handle.is_some() && !self.shared.signals.lock().finished
    }

    /// The worker's result, once it has ended. Joins a finished worker that has
    /// not been reaped yet.
    pub fn outcome(&mut self) -> Option<&Outcome<T, E>> {
        if self.handle.is_some() && self.shared.signals.lock().finished {
            self.join();
        }
        self.outcome.as_ref()
    }
}

impl<T, E> Drop for ExecutionThread<T, E> {
    fn drop(&mut self) {
        {
            let mut signals = self.shared.signals.lock();
            if !signals.finished {
                signals.mode = Mode::Terminate;
            }
            self.shared.to_worker.notify_all();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
