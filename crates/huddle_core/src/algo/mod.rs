//! Scheduling algorithms: winner selection and candidate generation.
//!
//! Pure functions over model records; callers own persistence.

pub mod candidates;
pub mod finalize;

pub use candidates::{fit_at_window_start, generate_candidates, Candidate};
pub use finalize::{pick_preferred, pick_top_voted, SlotTally};
