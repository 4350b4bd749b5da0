use crate::db;
use crate::error::ExchangeError;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

pub const WORKSPACE_ENV: &str = "RECORDSD_WORKSPACE";
pub const EXCHANGE_KEY: &str = "exchange";

/// Per-workspace CSV exchange settings, stored under [`EXCHANGE_KEY`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExchangeSettings {
    pub delimiter: char,
    pub date_formats: Vec<String>,
    pub export_dir: Option<PathBuf>,
    pub preview_limit: usize,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            delimiter: ',',
            // `%Y` also accepts two digits, so the short-year form goes first.
            date_formats: vec![
                "%Y-%m-%d".to_string(),
                "%m/%d/%y".to_string(),
                "%m/%d/%Y".to_string(),
            ],
            export_dir: None,
            preview_limit: 250,
        }
    }
}

impl ExchangeSettings {
    pub fn load(conn: &Connection) -> anyhow::Result<Self> {
        match db::settings_get_json(conn, EXCHANGE_KEY)? {
            Some(saved) => Ok(serde_json::from_value(saved)?),
            None => Ok(Self::default()),
        }
    }

    pub fn save(&self, conn: &Connection) -> anyhow::Result<()> {
        db::settings_set_json(conn, EXCHANGE_KEY, &serde_json::to_value(self)?)
    }

    pub fn delimiter_byte(&self) -> Result<u8, ExchangeError> {
        u8::try_from(self.delimiter)
            .ok()
            .filter(|b| b.is_ascii() && *b != b'"' && *b != b'\n' && *b != b'\r')
            .ok_or_else(|| {
                ExchangeError::Settings(format!("unusable delimiter {:?}", self.delimiter))
            })
    }

    /// Applies a validated partial update; on error `self` is left untouched.
    pub fn apply_patch(&mut self, patch: &Map<String, Value>) -> Result<(), String> {
        let mut next = self.clone();
        for (k, v) in patch {
            match k.as_str() {
                "delimiter" => {
                    let s = v.as_str().ok_or("delimiter must be string")?;
                    let mut chars = s.chars();
                    let (Some(c), None) = (chars.next(), chars.next()) else {
                        return Err("delimiter must be exactly one character".into());
                    };
                    next.delimiter = c;
                    next.delimiter_byte().map_err(|e| e.to_string())?;
                }
                "dateFormats" => {
                    let items = v.as_array().ok_or("dateFormats must be an array")?;
                    let mut formats = Vec::with_capacity(items.len());
                    for item in items {
                        let f = item
                            .as_str()
                            .map(str::trim)
                            .filter(|f| !f.is_empty())
                            .ok_or("dateFormats entries must be non-empty strings")?;
                        formats.push(f.to_string());
                    }
                    if formats.is_empty() {
                        return Err("dateFormats must not be empty".into());
                    }
                    next.date_formats = formats;
                }
                "exportDir" => {
                    next.export_dir = match v {
                        Value::Null => None,
                        Value::String(s) if !s.trim().is_empty() => {
                            Some(PathBuf::from(s.trim()))
                        }
                        _ => return Err("exportDir must be a non-empty string or null".into()),
                    };
                }
                "previewLimit" => {
                    let n = v
                        .as_u64()
                        .filter(|n| (1..=5000).contains(n))
                        .ok_or("previewLimit must be in 1..=5000")?;
                    next.preview_limit = n as usize;
                }
                _ => return Err(format!("unknown exchange setting: {}", k)),
            }
        }
        *self = next;
        Ok(())
    }
}

/// Workspace named by the environment, if any.
pub fn workspace_from_env() -> Option<PathBuf> {
    std::env::var_os(WORKSPACE_ENV)
        .map(PathBuf::from)
        .filter(|p| !p.as_os_str().is_empty())
}
