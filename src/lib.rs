//! Location-verified attendance: a geofence evaluator, a per-day check-in/check-out state
//! machine and the admin tooling around it, served over actix-web.

pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod docs;
pub mod error;
pub mod geofence;
pub mod model;
pub mod models;
pub mod routes;
pub mod service;
pub mod store;
pub mod utils;
