//! Durable persistence for credential cooldown state (§4.E, §6 schema).
//!
//! A single small table, written synchronously on every `release` — unlike
//! the signature store's write-behind queue, credential updates are rare
//! (one per upstream call) and must be visible immediately after a crash,
//! so there is no batching here.

use std::path::Path;

use gateway_types::{Credential, CredentialKind};
use rusqlite::{params, Connection};

use crate::error::CredentialError;
use crate::sqlite_util::open_secure_db;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS credentials (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    disabled INTEGER NOT NULL,
    model_cooldowns TEXT NOT NULL
);
";

pub struct DurableCredentials {
    conn: std::sync::Mutex<Connection>,
}

impl DurableCredentials {
    pub fn open(path: &Path) -> Result<Self, CredentialError> {
        let conn = open_secure_db(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: std::sync::Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self, CredentialError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: std::sync::Mutex::new(conn) })
    }

    /// Loads every persisted credential, namespace `credentials` (§6).
    pub fn load_all(&self) -> Result<Vec<Credential>, CredentialError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id, kind, disabled, model_cooldowns FROM credentials")?;
        let rows = stmt.query_map([], |row| {
            let id: String = row.get(0)?;
            let kind: String = row.get(1)?;
            let disabled: i64 = row.get(2)?;
            let cooldowns_json: String = row.get(3)?;
            Ok((id, kind, disabled != 0, cooldowns_json))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, kind, disabled, cooldowns_json) = row?;
            let model_cooldowns = serde_json::from_str(&cooldowns_json).unwrap_or_default();
            out.push(Credential {
                id,
                kind: parse_kind(&kind),
                disabled,
                model_cooldowns,
            });
        }
        Ok(out)
    }

    /// Upserts one credential's full current state.
    pub fn persist(&self, credential: &Credential) -> Result<(), CredentialError> {
        let cooldowns_json = serde_json::to_string(&credential.model_cooldowns).unwrap_or_default();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO credentials (id, kind, disabled, model_cooldowns) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET disabled = excluded.disabled, model_cooldowns = excluded.model_cooldowns",
            params![credential.id, credential.kind.as_str(), i64::from(credential.disabled), cooldowns_json],
        )?;
        Ok(())
    }
}

fn parse_kind(s: &str) -> CredentialKind {
    match s {
        "geminicli" => CredentialKind::Geminicli,
        _ => CredentialKind::Antigravity,
    }
}
