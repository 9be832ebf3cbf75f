//! Dispatcher Module
//!
//! Master-side scheduling of task flows.
//!
//! ## Components
//! - **`engine`**: The tree walk that decides which leaves are ready, worker selection
//!   (least loaded reachable peer) and the unbounded dispatch/retry loop.
//! - **`handlers`**: `POST /jobs`, accepting client submissions and flow relays.
//! - **`protocol`**: Submission DTOs.

pub mod engine;
pub mod handlers;
pub mod protocol;

#[cfg(test)]
mod tests;
