pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod newsapi;
pub mod pipeline;
pub mod scheduler;
pub mod services;
