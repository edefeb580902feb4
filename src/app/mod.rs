//! Background import jobs and the HTTP surface over them.

pub mod http;
pub mod model;
pub mod queue;
pub mod registry;
pub mod runner;
pub mod service;
