//! State module for tracking session progress
//!
//! # Components
//!
//! - `SessionState`: the per-session crawl state machine
//!   (init, handshake, home, listing, pagination, detail, done, failed)

mod session_state;

pub use session_state::SessionState;
