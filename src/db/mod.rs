//! Database module: row models and SQL repositories for the catalog store.
//!
//! This module is split into two submodules:
//! - `model`: raw rows as SQLite returns them, converted into domain types.
//! - `repo`: SQL-only functions used by the publisher, the loops and the CLIs.
//!
//! External modules should import from `tg_catalogbot::db`; the repository API
//! is re-exported here.

pub mod model;
pub mod repo;

pub use repo::*;
