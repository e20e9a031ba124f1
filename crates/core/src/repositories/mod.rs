//! Row-level store operations.
//!
//! Functions here take a `&Connection` so they compose inside a unit of work
//! (`Transaction` derefs to `Connection`). Reads skip soft-deleted rows.

pub mod appointments;
pub mod catalog;
pub mod policy;
pub mod profiles;
pub mod users;
