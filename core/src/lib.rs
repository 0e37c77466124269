pub mod auth;
pub mod db;
pub mod error;
pub mod generate;
pub mod grocery;
pub mod models;
pub mod service;
pub mod units;
