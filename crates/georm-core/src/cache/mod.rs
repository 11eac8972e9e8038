//! Cache mirror tables.
//!
//! A mirror table holds records fetched from other sources together with
//! bookkeeping columns: the source tag, the write time and completeness
//! flags (per phase for two-phase sources). Reads drop records past the TTL;
//! writes replace prior rows keyed by id and source in parameter-bounded
//! chunks.

pub mod bookkeeping;
mod manager;
mod upsert;

pub use manager::CacheManager;
pub use upsert::{is_two_phase, upsert, ExtraColumn, MirrorLayout, UpsertSummary};
