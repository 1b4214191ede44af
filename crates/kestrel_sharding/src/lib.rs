//! Sharding condition derivation: turns a bound statement's WHERE predicates
//! or INSERT value rows into the routing values that decide which shards the
//! statement touches.
//!
//! Pipeline: `Predicate` -> AND-groups -> `ConditionExtractor` per atom ->
//! `merger` per column -> one `ShardingCondition` per group or value row.

pub mod builder;
pub mod clock;
pub mod column;
pub mod condition;
pub mod expr;
pub mod extractor;
pub mod merger;
pub mod value;

pub use builder::{GeneratedKey, InsertValues, ShardingConditionBuilder};
pub use clock::{FixedTimeService, SystemTimeService, TimeService};
pub use column::{Column, ShardingColumnRegistry};
pub use condition::{ShardingCondition, ShardingConditions};
pub use expr::{CompareOp, CurrentTimeKind, Operand, Predicate};
pub use extractor::{Bindings, ConditionExtractor};
pub use value::{ConditionValue, ListValue, RangeValue};

#[cfg(test)]
mod tests;
