//! Result Aggregation Module
//!
//! Master side of `/result/:id`. Workers post leaf values here; each value is stored
//! in the flow's results map, cleared from every pending-task set and followed by a
//! fresh walk from the flow's root so siblings and ancestors can progress.
//! Clients poll the same endpoint and delete the flow once it is complete.

pub mod handlers;
pub mod protocol;
pub mod service;
