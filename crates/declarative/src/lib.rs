//! # Declarative
//!
//! A sync engine for declarative resource configuration.
//!
//! This crate turns a user-authored configuration tree into the request
//! objects a remote management API understands, turns the API's responses
//! back into a normalized tree that can be compared against what the user
//! wrote, and waits for eventually consistent remote operations to settle.
//!
//! ## Core Concepts
//!
//! - **ConfigValue**: A configuration tree of scalars, ordered lists,
//!   unordered sets, string maps and nested blocks
//! - **BlockSpec**: A static field catalog describing one resource kind
//! - **Expand / Flatten**: Config tree to request object, and response
//!   object back to a normalized config tree
//! - **ChangeSet**: Add/replace/remove operations between two trees, equal
//!   regardless of the order they were generated in
//! - **Waiter**: Polls a refresh probe until a target status, a failure,
//!   the deadline, or cancellation
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{BlockSpec, FieldSpec, decode, diff, expand, flatten};
//!
//! static ACCOUNT: BlockSpec = BlockSpec::new(
//!     "account",
//!     &[
//!         FieldSpec::string("name", "name").required(),
//!         FieldSpec::bool("public", "publicNetworkAccess").default_bool(true),
//!     ],
//! );
//!
//! let desired = decode(&ACCOUNT, &serde_json::json!({ "name": "orders" }))?;
//! let request = expand(&ACCOUNT, &desired)?;
//!
//! // ... send `request`, receive `response` ...
//!
//! let observed = flatten(&ACCOUNT, &response)?;
//! for op in &diff(&normalize(&ACCOUNT, &desired)?, &observed) {
//!     println!("{op}");
//! }
//! ```
//!
//! ## Observer Traits
//!
//! - [`WaitObserver`]: Receives one callback per poll of a running waiter
//! - [`ConfirmCallback`]: Handles user confirmations
//!
//! This allows the crate to be used without hard dependencies on a
//! terminal UI or a specific remote API client.

pub mod context;
pub mod diff;
pub mod error;
pub mod expand;
pub mod flatten;
pub mod hash;
pub mod identity;
pub mod normalize;
pub mod patch;
pub mod planner;
pub mod resource;
pub mod schema;
pub mod types;
pub mod value;
pub mod waiter;

#[cfg(test)]
mod fixtures;

// Re-export main types at crate root
pub use context::{AutoConfirm, AutoDecline, ConfirmCallback, NoObserver, WaitObserver};
pub use diff::{DiffSummary, diff, group_by_field};
pub use error::{Error, ErrorCategory, Result};
pub use expand::{Expander, expand};
pub use flatten::{flatten, flatten_with_prior};
pub use hash::{ContentHash, hash, hash_block, hash_element};
pub use identity::{IdSegment, IdTemplate};
pub use normalize::{decode, normalize, with_computed};
pub use patch::{ChangeSet, PatchOp, PatchOperation};
pub use planner::{PlanAction, PlanEntry, plan_resource};
pub use resource::{ResourceSchema, Timeouts};
pub use schema::{
    BlockSpec, DefaultValue, Dependency, ElemSpec, ExclusiveGroup, FieldKind, FieldSpec, Presence,
    ScalarType, Validator, Wire,
};
pub use types::{ApplyOptions, ApplyResult, ApplySummary, DomainObject};
pub use value::{ConfigValue, Path, Scalar, Segment, ValueSet};
pub use waiter::{MISSING, Observed, PRESENT, WaitState, Waiter, WaiterSpec};
