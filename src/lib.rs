pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod files;
pub mod models;
pub mod ratelimit;
pub mod routes;
pub mod schema;
pub mod state;
pub mod storage;
