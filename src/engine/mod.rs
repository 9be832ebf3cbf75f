//! Worker Engine Module
//!
//! Executes the leaves a master assigns to this node.
//!
//! ## Execution Path
//! 1. **Accept**: `POST /engine` books the leaf in the node's own pending set and replies
//!    at once with the node's metrics and pending set.
//! 2. **Prepare**: `#id#` placeholders in the payload are replaced with results of
//!    earlier leaves, and the module is checked against the whitelist.
//! 3. **Run**: The module's function is looked up in the `ActionRegistry`. One leaf
//!    runs at a time per node.
//! 4. **Report**: The value (or `{"error": ..}`) is posted to `/result/:flow_id` on the
//!    current master.

pub mod builtin;
pub mod handlers;
pub mod protocol;
pub mod registry;
pub mod substitution;
pub mod worker;
