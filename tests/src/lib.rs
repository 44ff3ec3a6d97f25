//! # Plugin-Core Test Suite
//!
//! Unified test crate for flows that cross crate boundaries.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── fixtures.rs           # Recording handlers, sample events and schemas
//! └── integration/
//!     ├── event_flows.rs    # Bus pipeline: validate → dedup → compress → route
//!     ├── config_flows.rs   # Middleware, encryption at rest, stores
//!     └── registry_flows.rs # Plugins wired to the bus and config manager
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p plugin-tests
//!
//! # By category
//! cargo test -p plugin-tests integration::event_flows
//!
//! # Benchmarks
//! cargo bench -p plugin-tests
//! ```

pub mod fixtures;
pub mod integration;
