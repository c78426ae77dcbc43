#![allow(missing_docs)]
//! Core of the Sift incremental fact and rule engine.
//!
//! Facts live in per-type stores split into a changed and a settled partition. Rules are
//! conjunctions of patterns over a fixed join shape; each tick they are evaluated
//! semi-naively, visiting only combinations that include at least one changed fact, and
//! the tick ends by committing changed facts to settled.

use tracing::{debug, instrument};

/// Condition trees: patterns, argument checks, guards and local variable bindings
pub mod condition;
/// Engine configuration and environment loading
pub mod config;
/// Error types
pub mod error;
/// Fact type identifiers and fact records
pub mod fact;
/// Per-type fact storage with changed/settled partitions
pub mod fact_store;
/// Cartesian product iteration and the semi-naive change-subset join
pub mod join;
/// Pull-based queries
pub mod query;
/// Rules and consequences
pub mod rule;
/// Evaluation counters
pub mod stats;
/// Tracing subscriber setup
pub mod telemetry;
/// The world and its tick driver
pub mod world;

pub use condition::{ArgCheck, ArithOp, Bindings, CompareOp, EvalContext, Expr, Guard, Pattern};
pub use config::{CommitPolicy, EngineConfig, LoggingConfig, TouchedTypes};
pub use error::{EngineError, EngineResult};
pub use fact::{Fact, FactId};
pub use fact_store::{FactBase, FactSlice, FactStore};
pub use join::{
    ChangeSubsets, JoinPasses, JoinVisitor, Touched, iterate_all, iterate_all_with_change_check,
    odometer,
};
pub use query::{Query, QueryRow};
pub use rule::{Consequence, Rule, RuleKind};
pub use stats::{RunStats, TickReport, WorldStats};
pub use world::World;

pub use sift_types::{EntityRef, Value};

/// Load configuration from `SIFT_*` variables and install the tracing subscriber
#[instrument]
pub fn init_from_environment() -> anyhow::Result<EngineConfig> {
    let config = EngineConfig::from_environment()?;
    telemetry::init_tracing(&config.logging)?;
    debug!(?config, "Sift engine configured");
    Ok(config)
}
