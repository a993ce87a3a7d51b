//! Seeded in-memory apps and request helpers for handler tests.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use catalogd_core::Clock;
use chrono::NaiveDate;
use serde_json::Value;
use tower::ServiceExt;

use crate::db::{schema, Database};
use crate::routes::{chinook, sakila};
use crate::state::AppState;

/// Rentals are evaluated as of 2024-06-15 12:00:00.
pub fn fixed_clock() -> Clock {
    let now = NaiveDate::from_ymd_opt(2024, 6, 15)
        .and_then(|d| d.and_hms_opt(12, 0, 0))
        .unwrap();
    Clock::Fixed(now)
}

const SAKILA_SEED: &str = r#"
INSERT INTO country (country_id, country) VALUES (1, 'Canada'), (2, 'Japan');
INSERT INTO city (city_id, city, country_id) VALUES (1, 'Lethbridge', 1), (2, 'Tokyo', 2);
INSERT INTO address (address_id, address, district, city_id, postal_code, phone) VALUES
    (1, '47 MySakila Drive', 'Alberta', 1, NULL, '555-0001'),
    (2, '28 MySQL Boulevard', 'Tokyo-to', 2, NULL, '555-0002'),
    (3, '1913 Hanoi Way', 'Alberta', 1, '35200', '555-0003'),
    (4, '692 Joliet Street', 'Tokyo-to', 2, '83579', '555-0004');
INSERT INTO language (language_id, name) VALUES (1, 'English');
INSERT INTO category (category_id, name) VALUES (1, 'Action'), (2, 'Comedy');
INSERT INTO film (film_id, title, description, release_year, language_id, rental_duration, rental_rate, length, replacement_cost, rating) VALUES
    (1, 'ACADEMY DINOSAUR', 'An epic drama', '2006', 1, 6, 0.99, 86, 20.99, 'PG'),
    (2, 'ALIEN CENTER', 'A brilliant drama', '2006', 1, 5, 2.99, 46, 10.99, 'NC-17'),
    (3, 'BETRAYED REAR', 'An emotional story', '2006', 1, 3, 4.99, 122, 26.99, 'R');
INSERT INTO film_category (film_id, category_id) VALUES (1, 1), (2, 2), (3, 1);
INSERT INTO actor (actor_id, first_name, last_name) VALUES (1, 'PENELOPE', 'GUINESS');
INSERT INTO film_actor (actor_id, film_id) VALUES (1, 1), (1, 3);
INSERT INTO staff (staff_id, first_name, last_name, address_id, email, store_id, active, username) VALUES
    (1, 'Mike', 'Hillyer', 1, 'mike@sakilastaff.com', 1, 1, 'Mike'),
    (2, 'Jon', 'Stephens', 2, 'jon@sakilastaff.com', 2, 1, 'Jon');
INSERT INTO store (store_id, manager_staff_id, address_id) VALUES (1, 1, 1), (2, 2, 2);
INSERT INTO customer (customer_id, store_id, first_name, last_name, email, address_id, active, create_date) VALUES
    (1, 1, 'MARY', 'SMITH', 'mary.smith@example.com', 3, 1, '2006-02-14 22:04:36'),
    (2, 2, 'PATRICIA', 'JOHNSON', 'patricia.johnson@example.com', 4, 1, '2006-02-14 22:04:36'),
    (3, 2, 'LINDA', 'WILLIAMS', 'linda.williams@example.com', 4, 0, '2006-02-14 22:04:36'),
    (4, 1, 'BARBARA', 'JONES', 'barbara.jones@example.com', 3, 1, '2006-02-14 22:04:36');
INSERT INTO inventory (inventory_id, film_id, store_id) VALUES
    (1, 1, 1), (2, 1, 1), (3, 2, 2), (4, 3, 1), (5, 3, 2);
INSERT INTO rental (rental_id, rental_date, inventory_id, customer_id, return_date, staff_id) VALUES
    (1, '2024-06-01 10:00:00', 1, 1, '2024-06-05 10:00:00', 1),
    (2, '2024-06-10 09:00:00', 3, 2, NULL, 2),
    (3, '2024-06-05 08:00:00', 4, 1, NULL, 1),
    (4, '2024-05-01 12:00:00', 5, 4, '2024-05-10 12:00:00', 2);
INSERT INTO payment (payment_id, customer_id, staff_id, rental_id, amount, payment_date) VALUES
    (1, 1, 1, 1, 0.99, '2024-06-01 10:00:00'),
    (2, 2, 2, 2, 2.99, '2024-06-10 09:00:00'),
    (3, 1, 1, 3, 4.99, '2024-06-05 08:00:00'),
    (4, 4, 2, 4, 4.99, '2024-05-01 12:00:00'),
    (5, 2, 1, NULL, 1.00, '2024-06-12 15:30:00');
"#;

const CHINOOK_SEED: &str = r#"
INSERT INTO Artist (ArtistId, Name) VALUES (1, 'AC/DC'), (2, 'Accept'), (3, 'Aerosmith');
INSERT INTO Album (AlbumId, Title, ArtistId) VALUES
    (1, 'For Those About To Rock We Salute You', 1),
    (2, 'Let There Be Rock', 1),
    (3, 'Balls to the Wall', 2);
INSERT INTO Genre (GenreId, Name) VALUES (1, 'Rock'), (2, 'Jazz');
INSERT INTO MediaType (MediaTypeId, Name) VALUES (1, 'MPEG audio file');
INSERT INTO Track (TrackId, Name, AlbumId, MediaTypeId, GenreId, Composer, Milliseconds, Bytes, UnitPrice) VALUES
    (1, 'For Those About To Rock (We Salute You)', 1, 1, 1, 'Angus Young, Malcolm Young, Brian Johnson', 343719, 11170334, 0.99),
    (2, 'Put The Finger On You', 1, 1, 1, 'Angus Young, Malcolm Young, Brian Johnson', 205662, 6713451, 0.99),
    (3, 'Go Down', 2, 1, 1, 'AC/DC', 331180, 10847611, 0.99),
    (4, 'Balls to the Wall', 3, 1, 1, NULL, 342562, 5510424, 0.99);
INSERT INTO Customer (CustomerId, FirstName, LastName, City, Country, Email) VALUES
    (1, 'Luís', 'Gonçalves', 'São José dos Campos', 'Brazil', 'luisg@embraer.com.br');
INSERT INTO Invoice (InvoiceId, CustomerId, InvoiceDate, BillingCity, BillingCountry, Total) VALUES
    (1, 1, '2009-01-01 00:00:00', 'São José dos Campos', 'Brazil', 1.98),
    (2, 1, '2009-01-03 00:00:00', 'São José dos Campos', 'Brazil', 0.99);
INSERT INTO InvoiceLine (InvoiceLineId, InvoiceId, TrackId, UnitPrice, Quantity) VALUES
    (1, 1, 1, 0.99, 1),
    (2, 1, 2, 0.99, 1),
    (3, 2, 3, 0.99, 1);
INSERT INTO Playlist (PlaylistId, Name) VALUES (1, 'Music');
INSERT INTO PlaylistTrack (PlaylistId, TrackId) VALUES (1, 1), (1, 2), (1, 3), (1, 4);
"#;

/// Route handler logs to the test harness; `RUST_LOG` raises the level.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

fn seeded(schema: &str, seed: &str) -> Database {
    init_tracing();
    let db = Database::open_in_memory(schema).unwrap();
    db.apply_schema(seed).unwrap();
    db
}

/// Router with only the rental app mounted, plus its database.
pub fn sakila_app_with_db() -> (Router, Database) {
    let db = seeded(schema::SAKILA, SAKILA_SEED);
    let app = Router::new().nest(
        "/sakila/api",
        sakila::router(AppState::new(db.clone(), fixed_clock())),
    );
    (app, db)
}

pub fn sakila_app() -> Router {
    sakila_app_with_db().0
}

pub fn chinook_app() -> Router {
    let db = seeded(schema::CHINOOK, CHINOOK_SEED);
    Router::new().nest(
        "/chinook/api",
        chinook::router(AppState::new(db, fixed_clock())),
    )
}

async fn read_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, body)
}

pub async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    read_json(app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

pub async fn send_json(app: &Router, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    read_json(app, request).await
}
