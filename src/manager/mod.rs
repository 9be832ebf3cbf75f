//! Manager Module
//!
//! Master election and handoff. A node's role is never stored; it is read from the
//! candidate ranking each time it matters.
//!
//! ## Submodules
//! - **`failover`**: Startup discovery, the periodic heartbeat and master takeover.
//! - **`handlers`**: `GET /manager/:is_candidate` (probe / registration) and
//!   `POST /manager` (heartbeat push).
//! - **`protocol`**: Snapshot and reply DTOs, out-of-band header names.

pub mod failover;
pub mod handlers;
pub mod protocol;
