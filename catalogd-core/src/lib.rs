//! Domain logic shared by the catalogd HTTP applications.
//!
//! Nothing in here touches the network or the database driver: the rental
//! late-fee rules, pagination math and SQL filter assembly are plain
//! functions so they can be tested without fixtures.

pub mod config;
pub mod dates;
pub mod error;
pub mod pagination;
pub mod rental;
pub mod sql;
pub mod validation;

pub use config::{CatalogConfig, DatabasesConfig, ServerSettings};
pub use dates::{format_date, format_timestamp, parse_timestamp, Clock};
pub use error::{CoreError, Result};
pub use pagination::{Page, Pagination};
pub use rental::{late_fee, round_cents, RentalStatus, RentalSummary, StatusFilter};
pub use sql::{OrderBy, Params, SortDirection, SqlValue, WhereClause};
pub use validation::ValidationError;
