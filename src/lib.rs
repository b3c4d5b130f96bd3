//! Library crate for pool-census-dash: the state and rendering layer that sits
//! between a long-running scan backend and its dashboard.
pub mod backend;
pub mod bridge;
pub mod controller;
pub mod dashboard;
pub mod detail;
pub mod error;
pub mod events;
pub mod render;
pub mod replay;
pub mod server;
pub mod store;
pub mod types;
