//! ledgerchat store crate - read-only data sources behind the chat pipeline.
//!
//! Provides the identity-scoped `AccountDataGateway` trait with an in-memory
//! implementation loaded from JSON fixtures, and the static `KnowledgeStore`
//! holding fee schedules and FAQ entries.

pub mod gateway;
pub mod knowledge;
pub mod memory;

pub use gateway::{AccountDataGateway, GatewayError, RecordFilter};
pub use knowledge::{FaqEntry, FeeRow, FeeSchedule, KnowledgeError, KnowledgeStore};
pub use memory::{AccountRecords, Fixture, InMemoryGateway, SeededSession};
