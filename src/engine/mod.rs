//! Consensus engine.
//!
//! Pipeline run once per poll interval:
//! 1. [`sampler`]: wallet states and mids become per-symbol position rows
//! 2. [`detector`]: sides with at least `threshold` wallets become candidates
//! 3. [`dedup`]: candidates whose composition did not change are suppressed
//! 4. [`dispatcher`]: the rest go to the live feed and the messaging channel
//!
//! [`poller`] drives the pipeline; [`report`] reuses it for on-demand queries.

pub mod dedup;
pub mod detector;
pub mod dispatcher;
pub mod poller;
pub mod report;
pub mod sampler;
mod types;

pub use dedup::{DedupStats, SignalDeduplicator, SignalFingerprint, SignalStatus};
pub use detector::{detect, tally, SideTally};
pub use dispatcher::{build_alert_html, AlertDispatcher, DispatchedSignal, FeedMessage};
pub use poller::{CycleReport, PollLoop};
pub use report::Reporter;
pub use sampler::{build_rows, PositionSampler, WalletStates};
pub use types::{CandidateSignal, PositionKey, PositionRow, Side};
