//! File-based message queue.
//!
//! Queue structure:
//! - `<dir>/<arrival_time>_<sender>.json` : one pending message per file
//! - `<dir>/quarantine/`                  : records that could not be parsed
//!
//! The sender part of the file name is percent-escaped for every byte outside
//! `[A-Za-z0-9.-]`, so `_` only ever appears as the separator. Escaped senders
//! longer than [`MAX_SENDER_STEM`] bytes are cut to a prefix and suffixed with
//! `~<digest of the full sender>`; the full sender is read from the body.
//! Ordering is numeric on the parsed timestamp, not on the raw file name.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::Notify;

use super::message::Message;
use super::queue::{
    canonical_time, storage_order, validate, MessageHandle, MessageQueue, QueueStats, QueuedMessage,
};
use crate::error::Result;

/// Quarantine directory name.
pub const QUEUE_QUARANTINE: &str = "quarantine";

/// Longest escaped sender kept verbatim in a file name.
pub const MAX_SENDER_STEM: usize = 160;

const MESSAGE_EXT: &str = "json";
const TEMP_EXT: &str = "tmp";

// Bounds the whole name well under the usual 255-byte limit.
const MAX_TIME_STEM: usize = 32;
const SENDER_PREFIX_LEN: usize = 128;
const DIGEST_SEP: char = '~';
const DIGEST_LEN: usize = 16;

/// A message file whose name parsed into a storage key.
#[derive(Debug)]
struct Candidate {
    arrival_time: f64,
    sender_key: Vec<u8>,
    file_name: String,
}

enum Record {
    Valid(Message),
    Missing,
    Corrupt(String),
}

/// Queue persisting each pending message as one JSON file.
pub struct FileMessageQueue {
    dir: PathBuf,
    pushed: Notify,
}

impl FileMessageQueue {
    /// Open (and create if needed) a queue directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
            tracing::debug!("Created queue directory: {}", dir.display());
        }

        let queue = Self {
            dir,
            pushed: Notify::new(),
        };
        queue.remove_stale_temp_files()?;
        Ok(queue)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn quarantine_dir(&self) -> PathBuf {
        self.dir.join(QUEUE_QUARANTINE)
    }

    /// Deterministic file name for a message's storage key.
    pub fn file_name_for(message: &Message) -> String {
        format!(
            "{}_{}.{}",
            time_stem(message.arrival_time),
            sender_stem(&message.sender),
            MESSAGE_EXT
        )
    }

    /// Interrupted pushes leave `.<name>.tmp` files behind; they were never
    /// acknowledged to the caller, so they are dropped.
    fn remove_stale_temp_files(&self) -> Result<()> {
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with('.') && name.ends_with(&format!(".{}", TEMP_EXT)) {
                fs::remove_file(entry.path())?;
                tracing::warn!("Removed interrupted queue write: {}", name);
            }
        }
        Ok(())
    }

    /// List message files, split into parsed candidates and unrecognized paths.
    fn scan(&self) -> Result<(Vec<Candidate>, Vec<PathBuf>)> {
        let mut candidates = Vec::new();
        let mut unrecognized = Vec::new();

        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }

            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != MESSAGE_EXT) {
                continue;
            }

            let parsed = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| parse_file_name(n).map(|key| (n.to_string(), key)));

            match parsed {
                Some((file_name, (arrival_time, sender_key))) => candidates.push(Candidate {
                    arrival_time,
                    sender_key,
                    file_name,
                }),
                None => unrecognized.push(path),
            }
        }

        candidates.sort_by(|a, b| {
            storage_order(
                (a.arrival_time, a.sender_key.as_slice()),
                (b.arrival_time, b.sender_key.as_slice()),
            )
            .then_with(|| a.file_name.cmp(&b.file_name))
        });

        Ok((candidates, unrecognized))
    }

    fn read_record(&self, path: &Path) -> Result<Record> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Record::Missing),
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                return Ok(Record::Corrupt(e.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str::<Message>(&content) {
            Ok(message) => Ok(Record::Valid(message)),
            Err(e) => Ok(Record::Corrupt(e.to_string())),
        }
    }

    /// Move a bad record out of the way so later pops can make progress.
    fn quarantine(&self, path: &Path, reason: &str) -> Result<()> {
        let quarantine_dir = self.quarantine_dir();
        fs::create_dir_all(&quarantine_dir)?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "record".to_string());
        let dst = quarantine_dir.join(format!("{}-{}", ulid::Ulid::new(), name));

        match fs::rename(path, &dst) {
            Ok(()) => {
                tracing::warn!(
                    "Quarantined queue record {} ({}): moved to {}",
                    path.display(),
                    reason,
                    dst.display()
                );
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn quarantined_count(&self) -> Result<usize> {
        let dir = self.quarantine_dir();
        if !dir.exists() {
            return Ok(0);
        }

        let mut count = 0;
        for entry in fs::read_dir(&dir)? {
            if entry?.file_type()?.is_file() {
                count += 1;
            }
        }
        Ok(count)
    }
}

#[async_trait]
impl MessageQueue for FileMessageQueue {
    fn name(&self) -> &str {
        "file"
    }

    fn push(&self, message: &Message) -> Result<()> {
        validate(message)?;

        let file_name = Self::file_name_for(message);
        let path = self.dir.join(&file_name);
        let tmp_path = self.dir.join(format!(".{}.{}", file_name, TEMP_EXT));

        let content = serde_json::to_string_pretty(message)?;
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &path)?;
        sync_dir(&self.dir)?;

        tracing::debug!("Pushed message {} from {}", file_name, message.sender);
        self.pushed.notify_one();
        Ok(())
    }

    fn pop(&self) -> Result<Option<QueuedMessage>> {
        let (candidates, unrecognized) = self.scan()?;

        for path in unrecognized {
            self.quarantine(&path, "unrecognized file name")?;
        }

        for candidate in candidates {
            let path = self.dir.join(&candidate.file_name);
            match self.read_record(&path)? {
                Record::Valid(message) => {
                    let handle = MessageHandle::new(candidate.file_name);
                    return Ok(Some(QueuedMessage::stored(message, handle)));
                }
                Record::Missing => continue,
                Record::Corrupt(reason) => self.quarantine(&path, &reason)?,
            }
        }

        Ok(None)
    }

    fn ack(&self, queued: &QueuedMessage) -> Result<()> {
        let Some(handle) = queued.handle() else {
            return Ok(());
        };

        let key = handle.key();
        if Path::new(key).file_name().and_then(|n| n.to_str()) != Some(key) {
            tracing::warn!("Ignoring ack with foreign handle: {:?}", key);
            return Ok(());
        }

        match fs::remove_file(self.dir.join(key)) {
            Ok(()) => {
                tracing::debug!("Acknowledged and removed message {}", key);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn pending(&self) -> Result<Vec<Message>> {
        let (candidates, _) = self.scan()?;

        let mut messages = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if let Record::Valid(message) = self.read_record(&self.dir.join(&candidate.file_name))? {
                messages.push(message);
            }
        }
        Ok(messages)
    }

    fn stats(&self) -> Result<QueueStats> {
        Ok(QueueStats {
            pending: self.pending()?.len(),
            quarantined: self.quarantined_count()?,
        })
    }

    async fn wait_for_push(&self, timeout: Duration) {
        let _ = tokio::time::timeout(timeout, self.pushed.notified()).await;
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

/// Shortest round-trip form, or exponent form when that would be long
/// (`1e300` prints 301 digits otherwise).
fn time_stem(arrival_time: f64) -> String {
    let arrival_time = canonical_time(arrival_time);
    let plain = arrival_time.to_string();
    if plain.len() <= MAX_TIME_STEM {
        plain
    } else {
        format!("{:e}", arrival_time)
    }
}

fn sender_stem(sender: &str) -> String {
    let escaped = escape_sender(sender);
    if escaped.len() <= MAX_SENDER_STEM {
        return escaped;
    }

    // never cut inside a %XX escape
    let bytes = escaped.as_bytes();
    let mut cut = SENDER_PREFIX_LEN;
    while bytes[cut - 1] == b'%' || bytes[cut - 2] == b'%' {
        cut -= 1;
    }

    let digest = format!("{:x}", Sha256::digest(sender.as_bytes()));
    format!("{}{}{}", &escaped[..cut], DIGEST_SEP, &digest[..DIGEST_LEN])
}

fn escape_sender(sender: &str) -> String {
    let mut out = String::with_capacity(sender.len());
    for byte in sender.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'-') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

fn unescape_sender(escaped: &str) -> Option<Vec<u8>> {
    let bytes = escaped.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = escaped.get(i + 1..i + 3)?;
            if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                return None;
            }
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Some(out)
}

/// Parse a message file name into `(arrival_time, sender sort key)`.
///
/// For a plain name the sort key is the sender's bytes. For a digest name
/// it is the unescaped prefix followed by `~<digest>`.
fn parse_file_name(name: &str) -> Option<(f64, Vec<u8>)> {
    let stem = name.strip_suffix(&format!(".{}", MESSAGE_EXT))?;
    let (time, sender) = stem.split_once('_')?;
    let arrival_time = time.parse::<f64>().ok().filter(|t| t.is_finite())?;

    let sender_key = match sender.split_once(DIGEST_SEP) {
        Some((prefix, digest)) => {
            if digest.len() != DIGEST_LEN || !digest.bytes().all(|b| b.is_ascii_hexdigit()) {
                return None;
            }
            let mut key = unescape_sender(prefix)?;
            key.push(DIGEST_SEP as u8);
            key.extend_from_slice(digest.as_bytes());
            key
        }
        None => unescape_sender(sender)?,
    };

    Some((canonical_time(arrival_time), sender_key))
}
