//! Task Graph Module
//!
//! Data model for client-submitted task flows.
//!
//! ## Model
//! - **TaskSpec**: The nested tree a client submits (`list` / `task` elements).
//! - **Flow**: The same tree flattened into an arena keyed by task id, with parent and
//!   child links stored as ids, plus the per-leaf results map
//!   (absent = unassigned, `"assigned"`, or the returned value).
//! - **FlowRegistry**: Insertion-ordered store of in-flight flows, replicated to every
//!   peer so it survives a master handoff.

pub mod registry;
pub mod types;
