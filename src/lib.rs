pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod milestones;
pub mod models;
pub mod progress;
pub mod report;
pub mod routes;
pub mod store;

#[cfg(test)]
pub(crate) mod testutil;
