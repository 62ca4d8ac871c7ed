//! Durable, append-only storage of every successfully fetched response.
//!
//! Records are addressed by collection, resource, period and status, and
//! looked up by freshness so that recent data can stand in for an
//! unreachable remote.

mod record;
mod storage;

pub use record::{Collection, DurableRecord, RecordKey, Status};
pub use storage::{RecordStore, SqliteStore};
