pub mod aggregate;
pub mod api;
pub mod clock;
pub mod config;
pub mod counter;
pub mod cycle;
pub mod error;
pub mod estimation;
pub mod source;
pub mod state;
pub mod store;
