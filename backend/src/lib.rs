pub mod config;
pub mod diagnosis;
pub mod error;
pub mod evaluation;
pub mod inference;
pub mod labels;
pub mod routes;
pub mod startup;
pub mod state;
