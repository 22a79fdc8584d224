//! Public bulletin board.
//!
//! `board post <thread> <text>` appends a post, `board read <thread>`
//! returns every post in the thread.

use std::fs;
use std::path::PathBuf;

use super::{is_safe_component, list_entries, next_entry_name};
use crate::core::Message;
use crate::service::{Handler, HandlerError};

pub const BOARD_USAGE: &str = "Board commands: post <thread> <text>, read <thread>";

pub struct BoardHandler {
    root: PathBuf,
}

impl BoardHandler {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn thread_dir(&self, thread: &str) -> Result<PathBuf, HandlerError> {
        if !is_safe_component(thread) {
            return Err(HandlerError::rejected("Invalid thread name."));
        }
        Ok(self.root.join(thread))
    }

    fn read_thread(&self, thread: &str) -> Result<String, HandlerError> {
        let posts = list_entries(&self.thread_dir(thread)?)?;
        if posts.is_empty() {
            return Ok("No posts.".to_string());
        }

        let mut lines = Vec::with_capacity(posts.len());
        for path in posts {
            lines.push(fs::read_to_string(path)?);
        }
        Ok(lines.join("\n"))
    }

    fn post(&self, sender: &str, thread: &str, text: &str) -> Result<String, HandlerError> {
        let dir = self.thread_dir(thread)?;
        fs::create_dir_all(&dir)?;

        let path = dir.join(next_entry_name()?);
        fs::write(&path, format!("{}: {}", sender, text))?;

        tracing::debug!("Board post by {} in {}: {}", sender, thread, path.display());
        Ok("Post added.".to_string())
    }
}

impl Handler for BoardHandler {
    fn handle(&self, message: &Message) -> Result<String, HandlerError> {
        let tokens = message.tokens();
        match tokens.as_slice() {
            [_] => Ok(BOARD_USAGE.to_string()),
            [_, "read", thread, ..] => self.read_thread(thread),
            [_, "post", thread, text @ ..] if !text.is_empty() => {
                self.post(&message.sender, thread, &text.join(" "))
            }
            _ => Ok("Invalid board command.".to_string()),
        }
    }
}
