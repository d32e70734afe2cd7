use chrono::{DateTime, NaiveDate, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::path::Path;
use std::{fs, io};
use thiserror::Error;

lazy_static! {
    /// Per-channel message files in the source tree are named
    /// `channel_<ID>.json` (replies live in `channel-replies_<ID>.json`
    /// and do not match this pattern).
    static ref CHANNEL_FILE: Regex = Regex::new(r"^channel_([A-Z0-9]+)\.json$").unwrap();
}

/// Errors raised while interpreting a single source message record.
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("message record is not a JSON object")]
    NotAnObject,
    #[error("required field 'ts' is missing")]
    MissingTs,
    #[error("timestamp '{0}' is not numeric")]
    InvalidTs(String),
}

/// A source message: the raw record plus its parsed timestamp.
///
/// The record is kept as-is so the mapping table decides which fields
/// survive; only `ts` is interpreted here, for ordering and day
/// partitioning.
#[derive(Debug, Clone)]
pub struct Message {
    content: Map<String, Value>,
    ts: String,
    timestamp: f64,
}

impl Message {
    pub fn from_value(value: Value) -> Result<Message, MessageError> {
        let content = match value {
            Value::Object(map) => map,
            _ => return Err(MessageError::NotAnObject),
        };
        let ts = content
            .get("ts")
            .and_then(Value::as_str)
            .ok_or(MessageError::MissingTs)?
            .to_string();
        let timestamp: f64 = ts.parse().map_err(|_| MessageError::InvalidTs(ts.clone()))?;
        Ok(Message {
            content,
            ts,
            timestamp,
        })
    }

    pub fn content(&self) -> &Map<String, Value> {
        &self.content
    }

    pub fn ts(&self) -> &str {
        &self.ts
    }

    pub fn user(&self) -> Option<&str> {
        self.content.get("user").and_then(Value::as_str)
    }

    /// Whole-second part of the timestamp as a `chrono` datetime. The
    /// fractional part only matters for ordering, not for day partitioning.
    pub fn time(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.timestamp as i64, 0).unwrap_or_default()
    }

    /// Calendar date (UTC) used for day partitioning.
    pub fn day(&self) -> NaiveDate {
        self.time().date_naive()
    }

    pub fn timestamp_micros(&self) -> i64 {
        (self.timestamp * 1_000_000.0) as i64
    }

    /// Record a reply on this (root) message, keeping the reply list sorted
    /// ascending by timestamp.
    pub fn add_reply(&mut self, user: &str, ts: &str) {
        let replies = self
            .content
            .entry("replies".to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(list) = replies {
            list.push(json!({ "user": user, "ts": ts }));
            list.sort_by(|a, b| {
                let key = |v: &Value| {
                    v.get("ts")
                        .and_then(Value::as_str)
                        .and_then(|s| s.parse::<f64>().ok())
                        .unwrap_or(0.0)
                };
                key(a).total_cmp(&key(b))
            });
        }
    }

    /// Append `?t=<token>` to private file URLs so the official import
    /// tooling can download them.
    pub fn sign_file_urls(&mut self, token: &str) {
        let files = match self.content.get_mut("files") {
            Some(Value::Array(files)) => files,
            _ => return,
        };
        for file in files {
            let file = match file.as_object_mut() {
                Some(file) => file,
                None => continue,
            };
            for key in ["url_private", "url_private_download"] {
                if let Some(Value::String(url)) = file.get_mut(key) {
                    url.push_str("?t=");
                    url.push_str(token);
                }
            }
        }
    }
}

/// A source channel with its collected messages.
///
/// The replies files overlap the main channel file, so insertion
/// deduplicates by `ts` (first occurrence wins, as in the source exporter).
#[derive(Debug)]
pub struct Channel {
    pub id: String,
    pub name: String,
    messages: Vec<Message>,
}

impl Channel {
    pub fn new(id: &str, name: &str) -> Channel {
        Channel {
            id: id.to_string(),
            name: name.to_string(),
            messages: Vec::new(),
        }
    }

    pub fn find_message_by_ts(&mut self, ts: &str) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.ts() == ts)
    }

    pub fn add_message(&mut self, message: Message) {
        if self.messages.iter().any(|m| m.ts() == message.ts()) {
            return;
        }
        self.messages.push(message);
    }

    pub fn sort_messages(&mut self) {
        self.messages.sort_by_key(Message::timestamp_micros);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Group messages by calendar date. Call `sort_messages` first; groups
    /// are formed over consecutive runs of the same date.
    pub fn messages_by_day(&self) -> Vec<(NaiveDate, Vec<&Message>)> {
        let mut groups: Vec<(NaiveDate, Vec<&Message>)> = Vec::new();
        for message in &self.messages {
            let day = message.day();
            match groups.last_mut() {
                Some((current, group)) if *current == day => group.push(message),
                _ => groups.push((day, vec![message])),
            }
        }
        groups
    }
}

/// Scan the input directory for `channel_<ID>.json` files whose ID does not
/// appear in `channel_list.json`. Such files are ignored by the conversion,
/// which is worth a warning rather than silence.
pub fn unlisted_channel_files(input_dir: &Path, known: &HashSet<String>) -> io::Result<Vec<String>> {
    let mut unlisted = Vec::new();
    for entry in fs::read_dir(input_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = match name.to_str() {
            Some(name) => name,
            None => continue,
        };
        if let Some(captures) = CHANNEL_FILE.captures(name) {
            let id = &captures[1];
            if !known.contains(id) {
                unlisted.push(id.to_string());
            }
        }
    }
    unlisted.sort();
    Ok(unlisted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn message(user: &str, ts: &str, text: &str) -> Message {
        Message::from_value(json!({ "user": user, "ts": ts, "text": text })).unwrap()
    }

    #[test]
    fn test_ts_to_datetime() {
        let msg = message("tester", "1610000000.000100", "hi");
        assert_eq!(
            msg.time(),
            Utc.with_ymd_and_hms(2021, 1, 7, 6, 13, 20).unwrap()
        );
        assert_eq!(msg.day().to_string(), "2021-01-07");
    }

    #[test]
    fn test_missing_ts_rejected() {
        let result = Message::from_value(json!({ "user": "U01", "text": "hi" }));
        assert!(matches!(result, Err(MessageError::MissingTs)));
    }

    #[test]
    fn test_non_numeric_ts_rejected() {
        let result = Message::from_value(json!({ "ts": "not-a-number" }));
        assert!(matches!(result, Err(MessageError::InvalidTs(_))));
    }

    #[test]
    fn test_non_object_record_rejected() {
        let result = Message::from_value(json!(["ts", "1.0"]));
        assert!(matches!(result, Err(MessageError::NotAnObject)));
    }

    #[test]
    fn test_add_reply_sorted_by_ts() {
        let mut root = message("U01", "100.000000", "root");
        root.add_reply("U03", "300.000000");
        root.add_reply("U02", "200.000000");

        let replies = root.content()["replies"].as_array().unwrap();
        assert_eq!(replies[0]["ts"].as_str().unwrap(), "200.000000");
        assert_eq!(replies[1]["ts"].as_str().unwrap(), "300.000000");
    }

    #[test]
    fn test_sign_file_urls_appends_token_once() {
        let mut msg = Message::from_value(json!({
            "ts": "1.0",
            "files": [{
                "url_private": "https://files.slack.com/a",
                "url_private_download": "https://files.slack.com/a?download=1"
            }]
        }))
        .unwrap();
        msg.sign_file_urls("xoxp-secret");

        let file = &msg.content()["files"][0];
        assert_eq!(
            file["url_private"].as_str().unwrap(),
            "https://files.slack.com/a?t=xoxp-secret"
        );
        assert_eq!(
            file["url_private_download"].as_str().unwrap(),
            "https://files.slack.com/a?download=1?t=xoxp-secret"
        );
    }

    #[test]
    fn test_channel_deduplicates_by_ts() {
        let mut channel = Channel::new("C01", "general");
        channel.add_message(message("U01", "100.000000", "first"));
        channel.add_message(message("U02", "100.000000", "duplicate"));
        assert_eq!(channel.len(), 1);
        let kept = channel.find_message_by_ts("100.000000").unwrap();
        assert_eq!(kept.content()["text"].as_str().unwrap(), "first");
    }

    #[test]
    fn test_messages_by_day_groups_dates() {
        let mut channel = Channel::new("C01", "general");
        // 2021-01-07 and 2021-01-08 (UTC).
        channel.add_message(message("U01", "1610000000.000100", "a"));
        channel.add_message(message("U01", "1610000001.000100", "b"));
        channel.add_message(message("U02", "1610086400.000100", "c"));
        channel.sort_messages();

        let days = channel.messages_by_day();
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].1.len(), 2);
        assert_eq!(days[1].1.len(), 1);
        assert_eq!(days[0].0.to_string(), "2021-01-07");
        assert_eq!(days[1].0.to_string(), "2021-01-08");
    }

    #[test]
    fn test_unlisted_channel_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("channel_C01.json"), "[]").unwrap();
        fs::write(dir.path().join("channel_C02.json"), "[]").unwrap();
        fs::write(dir.path().join("channel-replies_C02.json"), "[]").unwrap();
        fs::write(dir.path().join("user_list.json"), "[]").unwrap();

        let known: HashSet<String> = ["C01".to_string()].into_iter().collect();
        let unlisted = unlisted_channel_files(dir.path(), &known).unwrap();
        assert_eq!(unlisted, vec!["C02".to_string()]);
    }
}
