pub mod catalog;
pub mod cftime;
pub mod config;
pub mod pipeline;
pub mod readers;
pub mod reduce;
pub mod table;
