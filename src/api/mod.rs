//! API Module
//!
//! HTTP handlers and routing for the cache admin API.
//!
//! # Endpoints
//! - `PUT /set` - Store a key-value pair with an optional cost
//! - `GET /get/:key` - Retrieve a value by key
//! - `DELETE /del/:key` - Remove a key
//! - `DELETE /all` - Remove every entry
//! - `POST /trim` - Trim to a count, cost or age
//! - `POST /signal/memory-warning` - Deliver a memory warning
//! - `POST /signal/background` - Deliver a background notification
//! - `GET /stats` - Get cache statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
