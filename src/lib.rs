#![forbid(unsafe_code)]

pub mod app;
pub mod batch;
pub mod catalog;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod isbn;
pub mod logging;
pub mod resolver;
pub mod series;
