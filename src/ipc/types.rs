use crate::schema::Registry;
use rusqlite::Connection;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub registry: Registry,
}

impl AppState {
    pub fn new(registry: Registry) -> Self {
        Self {
            workspace: None,
            db: None,
            registry,
        }
    }
}
