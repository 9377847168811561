//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Cancellable timers for the single-threaded protocol event loop.
//!
//! Timers never run protocol code themselves. Their callbacks are expected to
//! post a message into the owner's input channel, so that every protocol
//! action happens from the owner's event loop. Dropping a timer handle aborts
//! the underlying task, which guarantees that a cleared timer never delivers
//! a stale callback.
//!
//! When the `testing` feature is enabled timers are inert: they never fire,
//! and tests inject the corresponding messages directly.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use tokio::{task, time};
use tracing::{Instrument, error};

/// A handle which can be used to manipulate the task created by the
/// [`Task::spawn`] function.
///
/// By default, dropping this handle cancels the task (unless [`Task::detach`]
/// is used).
#[derive(Debug)]
pub struct Task<T> {
    join_handle: task::JoinHandle<T>,
    detached: bool,
}

/// One-shot timer. Dropping this handle cancels the timer.
#[derive(Debug)]
pub struct TimeoutTask {
    timer: Timer,
}

/// Periodic timer. Dropping this handle cancels the timer.
#[derive(Debug)]
pub struct IntervalTask {
    timer: Timer,
}

// State shared by both timer flavors.
#[derive(Debug)]
struct Timer {
    period: Duration,
    deadline: Arc<Mutex<Instant>>,
    #[cfg(not(feature = "testing"))]
    control: UnboundedSender<Control>,
    #[cfg(not(feature = "testing"))]
    _task: Task<()>,
}

#[derive(Debug)]
enum Control {
    Reset(Option<Duration>),
}

// ===== impl Task =====

impl<T> Task<T> {
    /// Spawns a new asynchronous task, returning a handle for it.
    pub fn spawn<Fut>(future: Fut) -> Task<T>
    where
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        Task {
            join_handle: task::spawn(future),
            detached: false,
        }
    }

    /// Detach the task, meaning it will no longer be canceled if its handle is
    /// dropped.
    pub fn detach(&mut self) {
        self.detached = true;
    }
}

impl<T> Future for Task<T> {
    type Output = Result<T, task::JoinError>;

    fn poll(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        Pin::new(&mut self.join_handle).poll(cx)
    }
}

impl<T> Drop for Task<T> {
    fn drop(&mut self) {
        if !self.detached {
            self.join_handle.abort();
        }
    }
}

// ===== impl TimeoutTask =====

impl TimeoutTask {
    /// Starts a one-shot timer that calls `cb` once `timeout` expires.
    ///
    /// A zero timeout fires on the next turn of the runtime, after the code
    /// that created the timer has returned.
    pub fn new<F, Fut>(timeout: Duration, cb: F) -> TimeoutTask
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let deadline = Arc::new(Mutex::new(Instant::now() + timeout));

        #[cfg(not(feature = "testing"))]
        {
            let (control_tx, mut control_rx) = mpsc::unbounded_channel();
            let deadline_child = deadline.clone();
            let task = Task::spawn(
                async move {
                    let sleep = time::sleep(timeout);
                    tokio::pin!(sleep);

                    loop {
                        tokio::select! {
                            _ = &mut sleep => {
                                (cb)().await;
                                break;
                            }
                            message = control_rx.recv() => {
                                let Some(Control::Reset(new_timeout)) = message
                                else {
                                    // Handle dropped.
                                    break;
                                };
                                let next = Instant::now()
                                    + new_timeout.unwrap_or(timeout);
                                sleep.as_mut().reset(next);
                                *deadline_child.lock().unwrap() = next;
                            }
                        }
                    }
                }
                .in_current_span(),
            );

            TimeoutTask {
                timer: Timer {
                    period: timeout,
                    deadline,
                    control: control_tx,
                    _task: task,
                },
            }
        }
        #[cfg(feature = "testing")]
        {
            let _ = cb;
            TimeoutTask {
                timer: Timer {
                    period: timeout,
                    deadline,
                },
            }
        }
    }

    /// Restarts the timer, regardless if it has already expired or not.
    ///
    /// If a new timeout value isn't specified, the last value will be reused.
    pub fn reset(&mut self, timeout: Option<Duration>) {
        self.timer.reset(timeout);
    }

    /// Returns the remaining time before the timer expires.
    pub fn remaining(&self) -> Duration {
        self.timer.remaining()
    }

    /// Returns the configured timeout.
    pub fn timeout(&self) -> Duration {
        self.timer.period
    }
}

// ===== impl IntervalTask =====

impl IntervalTask {
    /// Starts a periodic timer that calls `cb` every `interval`.
    ///
    /// When `tick_on_start` is set the first call happens immediately.
    pub fn new<F, Fut>(
        interval: Duration,
        tick_on_start: bool,
        mut cb: F,
    ) -> IntervalTask
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let deadline = Arc::new(Mutex::new(Instant::now() + interval));

        #[cfg(not(feature = "testing"))]
        {
            let (control_tx, mut control_rx) = mpsc::unbounded_channel();
            let deadline_child = deadline.clone();
            let task = Task::spawn(
                async move {
                    let mut ticker = if tick_on_start {
                        time::interval(interval)
                    } else {
                        time::interval_at(Instant::now() + interval, interval)
                    };

                    loop {
                        tokio::select! {
                            _ = ticker.tick() => {
                                let next = Instant::now() + ticker.period();
                                (cb)().await;
                                *deadline_child.lock().unwrap() = next;
                            }
                            message = control_rx.recv() => {
                                let Some(Control::Reset(new_interval)) = message
                                else {
                                    // Handle dropped.
                                    break;
                                };
                                let period = new_interval.unwrap_or(interval);
                                let next = Instant::now() + period;
                                ticker = time::interval_at(next, period);
                                *deadline_child.lock().unwrap() = next;
                            }
                        }
                    }
                }
                .in_current_span(),
            );

            IntervalTask {
                timer: Timer {
                    period: interval,
                    deadline,
                    control: control_tx,
                    _task: task,
                },
            }
        }
        #[cfg(feature = "testing")]
        {
            let _ = (tick_on_start, &mut cb);
            IntervalTask {
                timer: Timer {
                    period: interval,
                    deadline,
                },
            }
        }
    }

    /// Restarts the interval.
    ///
    /// If a new interval value isn't specified, the last value will be reused.
    pub fn reset(&mut self, interval: Option<Duration>) {
        self.timer.reset(interval);
    }

    /// Returns the remaining time before the next tick.
    pub fn remaining(&self) -> Duration {
        self.timer.remaining()
    }

    /// Returns the configured interval.
    pub fn interval(&self) -> Duration {
        self.timer.period
    }
}

// ===== impl Timer =====

impl Timer {
    fn reset(&mut self, period: Option<Duration>) {
        if let Some(period) = period {
            self.period = period;
        }
        *self.deadline.lock().unwrap() = Instant::now() + self.period;

        #[cfg(not(feature = "testing"))]
        if self.control.send(Control::Reset(period)).is_err() {
            error!("failed to reset timer");
        }
    }

    fn remaining(&self) -> Duration {
        let deadline = self.deadline.lock().unwrap();
        deadline.saturating_duration_since(Instant::now())
    }
}

// ===== unit tests =====

#[cfg(all(test, not(feature = "testing")))]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn timeout_fires_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _timer = TimeoutTask::new(Duration::from_secs(5), move || async move {
            let _ = tx.send(());
        });

        time::sleep(Duration::from_secs(6)).await;
        assert!(rx.try_recv().is_ok());
        time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_timeout_never_fires() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let timer = TimeoutTask::new(Duration::from_secs(1), move || async move {
            let _ = tx.send(());
        });
        drop(timer);

        time::sleep(Duration::from_secs(2)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn interval_ticks() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _timer =
            IntervalTask::new(Duration::from_secs(1), false, move || {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(());
                }
            });

        time::sleep(Duration::from_millis(3500)).await;
        let mut ticks = 0;
        while rx.try_recv().is_ok() {
            ticks += 1;
        }
        assert_eq!(ticks, 3);
    }
}
