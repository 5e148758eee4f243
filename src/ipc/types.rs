use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use super::error::HandlerErr;

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
}

impl AppState {
    /// The open result store, or `no_workspace` before `workspace.select`.
    pub fn conn(&self) -> Result<&Connection, HandlerErr> {
        self.db.as_ref().ok_or_else(|| HandlerErr {
            code: "no_workspace",
            message: "select a workspace first".to_string(),
            details: None,
        })
    }
}
