pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod registry;
pub mod routes;
pub mod storage;
pub mod ws;
