//! # Simulation Kernel
//!
//! Discrete-event simulation core shared by every protocol subsystem.
//!
//! ## Components
//!
//! - [`Time`] — fixed-point logical time (integer time slots at a configured
//!   slots-per-second accuracy).
//! - [`EventPool`] — min-time-ordered queue with stable FIFO tie-breaking and
//!   O(1) cancellation (cancelled events are skipped at dequeue, the queue is
//!   never rebuilt).
//! - [`Simulator`] — the run-to-completion event loop, generic over the event
//!   payload type. Finite runs stop when the queue empties; continuous runs
//!   idle until a [`StopHandle`] fires.
//! - [`SimRng`] — the explicitly seeded random number generator owned by the
//!   simulator and threaded through every call that needs randomness. No
//!   global RNG state exists anywhere in the workspace.
//! - [`WallClockTimeout`] — runaway-simulation protection on a detached OS
//!   thread; the only true concurrency, touching a single atomic stop flag.
//!
//! ## Ordering guarantees
//!
//! Events scheduled for the same timestamp execute in submission order.
//! Handlers may schedule further events for the current or a future time,
//! never the past (a past timestamp is a fatal invariant violation).

mod event;
mod rng;
mod simulator;
mod time;
mod timeout;

pub use event::{EventId, EventPool};
pub use rng::SimRng;
pub use simulator::{EventHandler, Simulator, SimulatorConfig, StopHandle};
pub use time::Time;
pub use timeout::WallClockTimeout;
