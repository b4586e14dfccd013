//! # Message Bus Test Suite
//!
//! Unified test crate containing:
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── src/integration/    # End-to-end flows over the demo catalog
//! │   ├── flows.rs        # Ordering, fan-out, correlation, fault isolation
//! │   └── lifecycle.rs    # Game loop, deadlines, shutdown
//! └── benches/            # Submit → route throughput
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p bus-tests
//!
//! # Benchmarks
//! cargo bench -p bus-tests
//! ```

pub mod integration;
