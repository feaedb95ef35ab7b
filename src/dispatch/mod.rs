//! Per-session task dispatch.
//!
//! ```text
//!  caller ──push/poll──▶ Dispatcher ──bounded queue──▶ worker thread
//!    ▲                                                   │ owns Box<dyn Analyzer>
//!    └───────────── oneshot reply ◀──────────────────────┘
//! ```
//!
//! Each session has exactly one worker thread, so the analyzer never sees two
//! calls at once and never leaves the thread that built it. A full queue is
//! reported to the caller instead of blocking.

mod counters;
mod loop_impl;
mod request;
mod worker;

pub use counters::CounterSnapshot;
pub(crate) use counters::Counters;
pub use worker::Dispatcher;
