//! Session management for concurrent streaming analysis.
//!
//! A session binds one analyzer instance to an opaque [`Handle`]. The
//! [`SessionManager`] owns the handle table and routes every operation to
//! the session's [`Dispatcher`](crate::dispatch::Dispatcher).
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                   SessionManager                      │
//! │  ├─ sessions: RwLock<HashMap<Handle, Arc<Session>>>   │
//! │  ├─ handles:  HandleAllocator (1, 2, 3, ...)          │
//! │  ├─ counters: push/poll submitted/completed           │
//! │  └─ ingest:   SampleBuffer                            │
//! └──────────────────────────────────────────────────────┘
//!          │                │                 │
//!          ▼                ▼                 ▼
//!  ┌──────────────┐ ┌──────────────┐  ┌──────────────┐
//!  │ handle 1     │ │ handle 2     │  │ handle N     │
//!  │ worker thread│ │ worker thread│  │ worker thread│
//!  │ analyzer     │ │ analyzer     │  │ analyzer     │
//!  └──────────────┘ └──────────────┘  └──────────────┘
//! ```

mod handle_allocator;
mod manager;
mod types;

pub use handle_allocator::HandleAllocator;
pub use manager::{SessionManager, SessionStats};
pub use types::{Handle, Session, SessionInfo, SessionStatus};
