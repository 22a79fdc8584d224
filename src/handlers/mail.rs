//! Private mail between senders.

use std::fs;
use std::path::PathBuf;

use super::{is_safe_component, list_entries, next_entry_name};
use crate::core::Message;
use crate::service::{Handler, HandlerError};

pub const MAIL_USAGE: &str = "Mail commands: list, read <n>, send <user> <text>";

const INVALID_NUMBER: &str = "Invalid message number.";

pub struct MailHandler {
    root: PathBuf,
}

impl MailHandler {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn mailbox(&self, user: &str) -> Result<PathBuf, HandlerError> {
        if !is_safe_component(user) {
            return Err(HandlerError::rejected("Invalid user name."));
        }
        Ok(self.root.join(user))
    }

    fn list(&self, user: &str) -> Result<String, HandlerError> {
        let letters = list_entries(&self.mailbox(user)?)?;
        if letters.is_empty() {
            return Ok("No messages.".to_string());
        }

        let lines: Vec<String> = letters
            .iter()
            .enumerate()
            .map(|(i, path)| {
                let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
                format!("{}: {}", i + 1, name)
            })
            .collect();
        Ok(lines.join("\n"))
    }

    /// Return the n-th letter (1-based) and delete it.
    fn read(&self, user: &str, number: &str) -> Result<String, HandlerError> {
        let letters = list_entries(&self.mailbox(user)?)?;

        let index = match number.parse::<usize>() {
            Ok(n) if n >= 1 && n <= letters.len() => n - 1,
            _ => return Ok(INVALID_NUMBER.to_string()),
        };

        let path = &letters[index];
        let text = fs::read_to_string(path)?;
        fs::remove_file(path)?;
        Ok(text)
    }

    fn send(&self, sender: &str, recipient: &str, text: &str) -> Result<String, HandlerError> {
        let dir = self.mailbox(recipient)?;
        fs::create_dir_all(&dir)?;

        fs::write(dir.join(next_entry_name()?), format!("From {}: {}", sender, text))?;

        tracing::debug!("Mail from {} to {}", sender, recipient);
        Ok("Message sent.".to_string())
    }
}

impl Handler for MailHandler {
    fn handle(&self, message: &Message) -> Result<String, HandlerError> {
        let tokens = message.tokens();
        match tokens.as_slice() {
            [_] => Ok(MAIL_USAGE.to_string()),
            [_, "list", ..] => self.list(&message.sender),
            [_, "read", number, ..] => self.read(&message.sender, number),
            [_, "send", recipient, text @ ..] if !text.is_empty() => {
                self.send(&message.sender, recipient, &text.join(" "))
            }
            _ => Ok("Invalid mail command.".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn mail() -> (TempDir, MailHandler) {
        let temp_dir = TempDir::new().unwrap();
        let handler = MailHandler::new(temp_dir.path().join("mail"));
        (temp_dir, handler)
    }

    fn run(handler: &MailHandler, sender: &str, text: &str) -> String {
        handler.handle(&Message::new(sender, text, 1.0)).unwrap()
    }

    #[test]
    fn test_usage() {
        let (_tmp, handler) = mail();
        assert_eq!(run(&handler, "alice", "mail"), MAIL_USAGE);
    }

    #[test]
    fn test_send_list_read() {
        let (_tmp, handler) = mail();

        assert_eq!(run(&handler, "alice", "mail send bob hi bob"), "Message sent.");
        assert_eq!(run(&handler, "carol", "mail send bob hello"), "Message sent.");

        let listing = run(&handler, "bob", "mail list");
        let lines: Vec<&str> = listing.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("1: "));
        assert!(lines[1].starts_with("2: "));

        assert_eq!(run(&handler, "bob", "mail read 1"), "From alice: hi bob");
        assert_eq!(run(&handler, "bob", "mail read 1"), "From carol: hello");
        assert_eq!(run(&handler, "bob", "mail list"), "No messages.");
    }

    #[test]
    fn test_invalid_message_number() {
        let (_tmp, handler) = mail();
        run(&handler, "alice", "mail send bob hi");

        assert_eq!(run(&handler, "bob", "mail read 0"), INVALID_NUMBER);
        assert_eq!(run(&handler, "bob", "mail read 2"), INVALID_NUMBER);
        assert_eq!(run(&handler, "bob", "mail read x"), INVALID_NUMBER);
    }

    #[test]
    fn test_empty_mailbox() {
        let (_tmp, handler) = mail();
        assert_eq!(run(&handler, "nobody", "mail list"), "No messages.");
        assert_eq!(run(&handler, "nobody", "mail read 1"), INVALID_NUMBER);
    }

    #[test]
    fn test_invalid_commands() {
        let (_tmp, handler) = mail();
        assert_eq!(run(&handler, "alice", "mail send bob"), "Invalid mail command.");
        assert_eq!(run(&handler, "alice", "mail read"), "Invalid mail command.");
        assert_eq!(run(&handler, "alice", "mail burn"), "Invalid mail command.");
    }

    #[test]
    fn test_rejects_unsafe_recipient() {
        let (_tmp, handler) = mail();
        let err = handler
            .handle(&Message::new("alice", "mail send ../x hi", 1.0))
            .unwrap_err();
        assert_eq!(err.user_message(), "Invalid user name.");
    }
}
