//! Durable per-user conversation history.
//!
//! The orchestrator keys every conversation by user identifier (a phone number
//! or a CLI role name) and mirrors each one to a JSON document on disk, so a
//! restarted process picks up mid-conversation. One document per user:
//!
//! ```text
//! chat_history/
//!   ├─ technician.json
//!   └─ 491718398683.json
//! ```
//!
//! # Disk Format
//!
//! ```text
//! {"messages":[{"role":"user","text":"[User: Michael, Role: technician]\nboiler fixed"},
//!              {"role":"model","text":"Noted. Sending the job to the office."}],
//!  "updated_at":"2026-08-30T12:00:00Z"}
//! ```
//!
//! A missing document means an empty history; a document that fails to parse
//! is an error so a corrupt store never silently loses turns.

use crate::client_wrapper::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// A single role-tagged turn in a conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub text: String,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// On-disk shape of one user's history document.
#[derive(Serialize, Deserialize)]
struct HistoryDocument {
    messages: Vec<ChatTurn>,
    updated_at: DateTime<Utc>,
}

/// File-backed chat history store, one JSON document per user id.
pub struct HistoryStore {
    dir: PathBuf,
}

impl HistoryStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Load one user's history. A missing document yields an empty vec.
    pub fn load_history(&self, user_id: &str) -> io::Result<Vec<ChatTurn>> {
        let path = self.document_path(user_id)?;
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&path)?;
        let doc: HistoryDocument = serde_json::from_str(&raw)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(doc.messages)
    }

    /// Overwrite one user's history with the given turns.
    pub fn save_history(&self, user_id: &str, turns: &[ChatTurn]) -> io::Result<()> {
        let path = self.document_path(user_id)?;
        let doc = HistoryDocument {
            messages: turns.to_vec(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&doc)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(&path, json)
    }

    /// Append a single turn to one user's document.
    pub fn append_message(&self, user_id: &str, turn: ChatTurn) -> io::Result<()> {
        let mut turns = self.load_history(user_id)?;
        turns.push(turn);
        self.save_history(user_id, &turns)
    }

    /// Delete one user's history document. Deleting an absent document is a
    /// no-op.
    pub fn clear_history(&self, user_id: &str) -> io::Result<()> {
        let path = self.document_path(user_id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Load histories for every user with a document in the store.
    pub fn load_all_histories(&self) -> io::Result<HashMap<String, Vec<ChatTurn>>> {
        let mut all = HashMap::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(user_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let user_id = user_id.to_string();
            // Stray files whose stems would never be valid user ids (extra
            // dots, say) are skipped rather than failing the whole scan.
            let turns = match self.load_history(&user_id) {
                Ok(turns) => turns,
                Err(e) if e.kind() == io::ErrorKind::InvalidInput => {
                    log::warn!("skipping non-history file {}", path.display());
                    continue;
                }
                Err(e) => return Err(e),
            };
            all.insert(user_id, turns);
        }
        Ok(all)
    }

    /// Directory the store writes into.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn document_path(&self, user_id: &str) -> io::Result<PathBuf> {
        if user_id.is_empty()
            || user_id
                .chars()
                .any(|c| c == '/' || c == '\\' || c == '.' || c.is_control())
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid user id for history document: {:?}", user_id),
            ));
        }
        Ok(self.dir.join(format!("{}.json", user_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_document_is_empty_history() {
        let tmp = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(tmp.path()).unwrap();
        assert!(store.load_history("nobody").unwrap().is_empty());
    }

    #[test]
    fn append_then_load_round_trips_roles() {
        let tmp = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(tmp.path()).unwrap();

        store
            .append_message("technician", ChatTurn::user("pump replaced"))
            .unwrap();
        store
            .append_message("technician", ChatTurn::model("thanks, logged"))
            .unwrap();

        let turns = store.load_history("technician").unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[1].role, Role::Assistant);
        assert_eq!(turns[1].text, "thanks, logged");
    }

    #[test]
    fn save_overwrites_previous_document() {
        let tmp = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(tmp.path()).unwrap();

        store
            .save_history("office", &[ChatTurn::user("one")])
            .unwrap();
        store
            .save_history("office", &[ChatTurn::user("two"), ChatTurn::model("ok")])
            .unwrap();

        let turns = store.load_history("office").unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].text, "two");
    }

    #[test]
    fn clear_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(tmp.path()).unwrap();

        store
            .save_history("office", &[ChatTurn::user("hi")])
            .unwrap();
        store.clear_history("office").unwrap();
        store.clear_history("office").unwrap();
        assert!(store.load_history("office").unwrap().is_empty());
    }

    #[test]
    fn load_all_sees_every_user() {
        let tmp = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(tmp.path()).unwrap();

        store
            .save_history("technician", &[ChatTurn::user("a")])
            .unwrap();
        store.save_history("office", &[ChatTurn::user("b")]).unwrap();

        let all = store.load_all_histories().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["technician"][0].text, "a");
        assert_eq!(all["office"][0].text, "b");
    }

    #[test]
    fn load_all_skips_files_with_unusable_stems() {
        let tmp = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(tmp.path()).unwrap();

        store
            .save_history("technician", &[ChatTurn::user("a")])
            .unwrap();
        // A stem containing '.' can never round-trip through document_path;
        // the scan must skip it, not abort.
        fs::write(tmp.path().join("user.1.json"), "{}").unwrap();

        let all = store.load_all_histories().unwrap();
        assert_eq!(all.len(), 1);
        assert!(all.contains_key("technician"));
    }

    #[test]
    fn path_traversal_user_ids_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(tmp.path()).unwrap();

        assert!(store.load_history("../etc/passwd").is_err());
        assert!(store.save_history("a/b", &[]).is_err());
        assert!(store.load_history("").is_err());
    }

    #[test]
    fn corrupt_document_is_an_error_not_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(tmp.path()).unwrap();

        fs::write(tmp.path().join("broken.json"), "{not json").unwrap();
        assert!(store.load_history("broken").is_err());
    }
}
