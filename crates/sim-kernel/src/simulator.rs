//! The discrete-event run loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::info;

use crate::event::{EventId, EventPool};
use crate::rng::SimRng;
use crate::time::Time;

/// Receiver of dequeued events.
///
/// Handlers run to completion and may schedule further events through the
/// simulator they are handed; they must never schedule into the past.
pub trait EventHandler<E> {
    fn handle_event(&mut self, event: E, sim: &mut Simulator<E>);
}

/// Simulator construction parameters.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Simulation start time in seconds.
    pub start_second: f64,
    /// Simulation end time in seconds; `f64::INFINITY` selects a continuous
    /// run that idles until stopped.
    pub end_second: f64,
    /// Time slots per second, defaults to 1000000 i.e. 1us time slot.
    pub accuracy: u64,
    /// RNG seed; `None` draws from OS entropy.
    pub seed: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        SimulatorConfig {
            start_second: 0.0,
            end_second: 60.0,
            accuracy: 1_000_000,
            seed: Some(0),
        }
    }
}

/// Shared stop flag for a running simulation.
///
/// This is the only piece of the kernel that may be touched from another OS
/// thread (the wall-clock guard).
#[derive(Debug, Clone)]
pub struct StopHandle {
    running: Arc<AtomicBool>,
}

impl StopHandle {
    /// Request the run loop to stop after the current handler returns.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Discrete-event driven simulator core.
#[derive(Debug)]
pub struct Simulator<E> {
    accuracy: u64,
    ts: Time,
    te: Option<Time>,
    pool: EventPool<E>,
    rng: SimRng,
    running: Arc<AtomicBool>,
    total_events: u64,
    /// Wall-clock duration of the last `run()` call.
    pub time_spent: Duration,
}

impl<E> Simulator<E> {
    pub fn new(config: SimulatorConfig) -> Self {
        assert!(config.start_second >= 0.0);
        assert!(config.end_second >= config.start_second);
        let ts = Time::from_sec(config.start_second, config.accuracy);
        let te = if config.end_second.is_infinite() {
            None
        } else {
            Some(Time::from_sec(config.end_second, config.accuracy))
        };

        Simulator {
            accuracy: config.accuracy,
            ts,
            te,
            pool: EventPool::new(ts.time_slot(), te.map(|t| t.time_slot())),
            rng: SimRng::from_seed(config.seed),
            running: Arc::new(AtomicBool::new(false)),
            total_events: 0,
            time_spent: Duration::ZERO,
        }
    }

    /// Time slots per second.
    pub fn accuracy(&self) -> u64 {
        self.accuracy
    }

    /// Simulation start time.
    pub fn ts(&self) -> Time {
        self.ts
    }

    /// Simulation end time. `None` means continuous simulation.
    pub fn te(&self) -> Option<Time> {
        self.te
    }

    /// Current simulation time.
    pub fn tc(&self) -> Time {
        Time::new(self.pool.current_slot(), self.accuracy)
    }

    /// Produce a `Time` at this simulator's accuracy from seconds.
    pub fn time(&self, sec: f64) -> Time {
        Time::from_sec(sec, self.accuracy)
    }

    /// Produce a `Time` at this simulator's accuracy from a time slot.
    pub fn time_from_slot(&self, slot: i64) -> Time {
        Time::new(slot, self.accuracy)
    }

    pub fn rng(&mut self) -> &mut SimRng {
        &mut self.rng
    }

    /// Number of events executed so far.
    pub fn total_events(&self) -> u64 {
        self.total_events
    }

    /// Number of live pending events.
    pub fn pending_events(&self) -> usize {
        self.pool.len()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Handle that can stop the run loop, including from another thread.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            running: Arc::clone(&self.running),
        }
    }

    /// Add an event into the simulator event pool.
    ///
    /// Returns `None` when the event falls beyond a finite end time.
    pub fn schedule(&mut self, t: Time, payload: E) -> Option<EventId> {
        assert_eq!(
            t.accuracy(),
            self.accuracy,
            "Simulator: event accuracy mismatch"
        );
        self.pool.add_event(t, payload)
    }

    /// Flag a previously scheduled event as cancelled.
    pub fn cancel(&mut self, id: EventId) {
        self.pool.cancel(id);
    }

    /// Run the simulation until the queue drains (finite mode) or the stop
    /// handle fires (either mode).
    pub fn run<H: EventHandler<E>>(&mut self, handler: &mut H) {
        let is_continuous = self.te.is_none();
        let kind = if is_continuous { "Continuous" } else { "Finite" };
        info!("{kind} simulation started.");

        self.running.store(true, Ordering::SeqCst);
        let started = Instant::now();

        while self.running.load(Ordering::SeqCst) {
            match self.pool.next_event() {
                Some((_, event)) => {
                    self.total_events += 1;
                    handler.handle_event(event, self);
                }
                None if is_continuous => {
                    // idle briefly to wait for the stop signal
                    std::thread::sleep(Duration::from_millis(1));
                }
                None => {
                    self.running.store(false, Ordering::SeqCst);
                }
            }
        }

        self.time_spent = started.elapsed();
        let sim_time = (self.tc() - self.ts).sec();
        let speedup = if self.time_spent.is_zero() {
            f64::INFINITY
        } else {
            sim_time / self.time_spent.as_secs_f64()
        };
        info!(
            "{kind} simulation finished, runtime {:?}, {} events, sim_time {sim_time}, x{speedup:.1}",
            self.time_spent, self.total_events
        );
    }
}
