//! Built-in command handlers: public board and private mail.
//!
//! Both keep plain text files under the data directory, one file per
//! post or letter, named by a monotonic ULID so name order is time order.

pub mod board;
pub mod mail;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use ulid::Generator;

use crate::service::{HandlerError, ServiceHost};

pub use board::BoardHandler;
pub use mail::MailHandler;

const ENTRY_EXT: &str = "txt";

/// Register `board` and `mail` with storage under `data_dir`.
pub fn register_defaults(host: &mut ServiceHost, data_dir: &Path) {
    host.register_handler("board", BoardHandler::new(data_dir.join("board")));
    host.register_handler("mail", MailHandler::new(data_dir.join("mail")));
}

fn id_generator() -> &'static Mutex<Generator> {
    static GENERATOR: OnceLock<Mutex<Generator>> = OnceLock::new();
    GENERATOR.get_or_init(|| Mutex::new(Generator::new()))
}

/// Next file name for a new entry.
fn next_entry_name() -> Result<String, HandlerError> {
    let mut generator = id_generator()
        .lock()
        .map_err(|_| HandlerError::internal("id generator lock poisoned"))?;
    let id = generator
        .generate()
        .map_err(|e| HandlerError::internal(format!("id generation failed: {}", e)))?;
    Ok(format!("{}.{}", id, ENTRY_EXT))
}

/// A thread or user name that is safe to use as one path component.
fn is_safe_component(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(|c: char| c == '/' || c == '\\' || c == '\0')
}

/// Entry files in a directory, oldest first. Missing directory is empty.
fn list_entries(dir: &Path) -> Result<Vec<PathBuf>, HandlerError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().map_or(false, |ext| ext == ENTRY_EXT) {
            entries.push(path);
        }
    }
    entries.sort();
    Ok(entries)
}
