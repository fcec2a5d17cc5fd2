//! Genetic-algorithm timetabling: slot assignment, fitness scoring, the
//! generational loop and the documents handed to persistence.

pub mod config;
pub mod data;
pub mod fitness;
pub mod genetic;
pub mod publish;
pub mod server;
pub mod slots;
pub mod solver;
