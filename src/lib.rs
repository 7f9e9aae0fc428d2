pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod migrations;
pub mod models;
pub mod pagination;
pub mod permissions;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
pub mod websocket;
