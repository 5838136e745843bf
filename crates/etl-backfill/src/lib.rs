//! C8 BackfillService + C9 GapScanner: on-demand and system-initiated
//! time-range reloads, composed over C4 the way `mqk-testkit::orchestrator`
//! wires a fixed sequence of engines into one control loop — here the loop
//! runs once per backfill job or once per gap-scan tick rather than once per
//! bar.

mod gap_scanner;
mod service;

pub use etl_db::BackfillJobRow;
pub use gap_scanner::{GapScanner, SystemGapScanner, DEFAULT_LOOKBACK, DEFAULT_MIN_GAP, DEFAULT_SCAN_INTERVAL, MAX_ACTIVE_JOBS_PER_LOADER};
pub use service::{duration_seconds, BackfillService, SystemBackfillService, DEFAULT_PURGE_STRATEGY};
