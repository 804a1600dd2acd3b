//! Change recording primitives.
//!
//! Each observed transition is reduced to a shallow diff and appended to a
//! per-store bounded ring. Both are pure data structures; the monitor owns
//! the policy of when to call them.

mod diff;
mod history;

pub use diff::compute_diff;
pub use history::HistoryRing;
