//! DDL for the two databases, applied by `serve --init-schema` and tests.

/// DVD rental tables
pub const SAKILA: &str = include_str!("../../schema/sakila.sql");

/// Music store tables
pub const CHINOOK: &str = include_str!("../../schema/chinook.sql");
