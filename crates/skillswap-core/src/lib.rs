//! Profile reconciliation and complementary-skill matching.
//!
//! Data flows one way: record source -> [`reconciler`] -> [`view_cache`],
//! with [`coalescer`] as the only feedback edge re-triggering passes.

pub mod coalescer;
pub mod config;
pub mod engine;
pub mod error;
pub mod matcher;
pub mod profile;
pub mod reconciler;
pub mod status;
pub mod view;
pub mod view_cache;

pub use config::Config;
pub use engine::Engine;
pub use error::EngineError;
pub use status::SyncStatus;
pub use view::{DisplaySource, MatchResult, MergedView, SkillPair};
pub use view_cache::ViewTable;
