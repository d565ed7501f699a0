// Node core timing and quorum constants.

use crest_common::time::TimestampMicros;

// Millis per second, it is used to prevent having random 1000 values anywhere
pub const MILLIS_PER_SECOND: u64 = 1000;

// Ordinary-pool flush period: the block builder wakes on this tick
pub const BUILD_INTERVAL_MS: u64 = 3 * MILLIS_PER_SECOND;

// A transaction older than this at build time is logged as stale
pub const TX_EXPIRE_INTERVAL_SECS: u64 = 10;

// Ordinary-pool size at any height that triggers an immediate build
pub const BUILD_THRESHOLD: usize = 1_000_000;

// Contract dispatcher round period
pub const CONTRACT_WAITING_TIME_MICROS: TimestampMicros = 3_000_000;

// Dirty-contract declarations expire after this much time, swept lazily at
// block-build time
pub const DIRTY_CONTRACT_EXPIRY_MICROS: TimestampMicros = 60_000_000;

// How long the block builder waits for the previous block hash
pub const PREV_HASH_WAIT_SECS: u64 = 6;

// Pre-hash reconciliation quorum: wait for 80% of the peers asked,
// short-circuit with at least 50% on timeout
pub const PREHASH_QUORUM_NUM: usize = 4;
pub const PREHASH_QUORUM_DEN: usize = 5;
pub const PREHASH_FALLBACK_NUM: usize = 1;
pub const PREHASH_FALLBACK_DEN: usize = 2;

// A divergent block is accepted when at least 2/3 of the responders agree
pub const PREHASH_ACCEPT_NUM: usize = 2;
pub const PREHASH_ACCEPT_DEN: usize = 3;

// How long the quorum waiter collects replies before the fallback check
pub const PREHASH_WAIT_SECS: u64 = 2;

// Fetched-block persistence: poll period and how long to keep polling
pub const SEEK_BLOCK_POLL_SECS: u64 = 1;
pub const SEEK_BLOCK_POLL_LIMIT_SECS: u64 = 2;

// Width of the time window one packager election covers
pub const ELECTION_WINDOW_MICROS: TimestampMicros = 3_000_000;
