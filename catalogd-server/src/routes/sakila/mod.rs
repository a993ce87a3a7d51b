//! DVD rental dashboard API, mounted under `/sakila/api`.
//!
//! Organized by resource:
//! - lookups: categories, countries, cities, stores
//! - staff, films, customers
//! - rentals: checkout, return and overdue tracking
//! - inventory, payments, dashboard

pub mod customers;
pub mod dashboard;
pub mod films;
pub mod inventory;
pub mod lookups;
pub mod payments;
pub mod rentals;
pub mod staff;

use axum::routing::{get, put};
use axum::Router;
use catalogd_core::Page;
use serde::Serialize;

use crate::db::Record;
use crate::state::AppState;

/// Paginated list body shared by the film, customer and rental lists.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageBody {
    pub data: Vec<Record>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub page_count: u64,
}

impl From<Page<Record>> for PageBody {
    fn from(page: Page<Record>) -> Self {
        Self {
            page_count: page.total_pages(),
            total: page.total,
            page: page.page,
            page_size: page.page_size,
            data: page.items,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        // Lookups
        .route("/categories", get(lookups::list_categories))
        .route("/countries", get(lookups::list_countries))
        .route("/cities", get(lookups::list_cities))
        .route("/stores", get(lookups::list_stores))
        .route("/staff", get(staff::list_staff))
        // Films
        .route("/films", get(films::list_films))
        .route("/films/{id}", get(films::get_film))
        // Customers
        .route(
            "/customers",
            get(customers::list_customers).post(customers::create_customer),
        )
        .route(
            "/customers/{id}",
            get(customers::get_customer)
                .put(customers::update_customer)
                .delete(customers::deactivate_customer),
        )
        // Rentals
        .route(
            "/rentals",
            get(rentals::list_rentals).post(rentals::create_rental),
        )
        .route("/rentals/{id}", get(rentals::get_rental))
        .route("/rentals/{id}/return", put(rentals::return_rental))
        // Inventory and payments
        .route("/inventory", get(inventory::list_inventory))
        .route(
            "/payments",
            get(payments::list_payments).post(payments::create_payment),
        )
        .route("/payments/stats", get(payments::payment_stats))
        .route("/payments/{id}", get(payments::get_payment))
        // Dashboard
        .route("/dashboard/stats", get(dashboard::dashboard_stats))
        .with_state(state)
}
