pub mod backup;
pub mod cleanup;
pub mod core;
pub mod exchange;
pub mod models;
pub mod settings;
