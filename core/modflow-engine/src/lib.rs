//! Relationship rule evaluation for modflow.
//!
//! When a record of a module is created, updated or deleted, every
//! relationship whose base is that module runs its rules for the event
//! against the target module's records.
//!
//! # Components
//!
//! - **RuleEvaluator**: runs the rules of one lifecycle event and everything
//!   it propagates to, returning an [`EvaluationReport`]
//! - **RecordService**: record CRUD that validates, pre-checks `validate`
//!   rules, writes, and then propagates
//!
//! # Evaluation
//!
//! 1. **Discover**: relationships out of the event's module; none is a no-op
//! 2. **Resolve**: parse the rule's target reference and source operand;
//!    `item.<name>` sources fan out to one application per array element
//! 3. **Bind**: pick target records through the relationship's binding
//! 4. **Apply**: mutate the target field atomically in the record store
//! 5. **Propagate**: changed targets raise `onUpdate` (cascade deletes raise
//!    `onDelete`), bounded by depth and a visited set
//!
//! Rule failures never roll back applied rules. Dangling references are
//! skipped with a warning.
//!
//! # Example
//!
//! ```
//! use modflow_engine::EngineConfig;
//!
//! let config = EngineConfig {
//!     timeout_ms: 5_000,
//!     ..Default::default()
//! };
//! assert!(config.max_depth.is_none());
//! ```

mod action;
mod binding;
mod config;
mod error;
mod evaluator;
mod outcome;
mod service;

pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use evaluator::RuleEvaluator;
pub use outcome::{EvaluationReport, EvaluationWarning, RuleError, RuleOutcome, RuleStatus, SkipReason};
pub use service::{RecordChange, RecordService};
