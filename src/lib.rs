pub mod config;
pub mod descriptor;
pub mod domain;
pub mod error;
pub mod finalize;
pub mod library;
pub mod output;
pub mod pipeline;
pub mod runner;
pub mod stages;
pub mod timelog;
pub mod tool;
pub mod workspace;
