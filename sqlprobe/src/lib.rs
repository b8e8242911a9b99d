//! Library module for the sqlprobe binary.
//!
//! Exposes the connection manager so integration tests can drive it; the
//! CLI surface lives in main.rs.

pub mod connection;

pub use connection::{
    ConnectionManager, ConnectionOverrides, ConnectionParams, CursorGuard, ReleaseCursor,
    run_scoped,
};
