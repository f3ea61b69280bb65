// src/lib.rs

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod utils;

pub use routes::create_router;
