use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::export::{self, Channel, Message};
use crate::mapping::{self, MappingRule};
use crate::report::ConversionReport;
use crate::resolver::{Resolution, UserResolver};

/// Errors that abort a conversion run. Per-identifier resolution failures
/// are not here: they degrade to warnings on the report.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("I/O error on {0:?}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("malformed JSON in {0:?}: {1}")]
    Parse(PathBuf, #[source] serde_json::Error),

    #[error("schema error in {0:?}: {1}")]
    Schema(PathBuf, String),
}

/// Converts a third-party export tree into the official export layout.
///
/// Single synchronous pass: read metadata, load channels (folding thread
/// replies into their roots), then write the output tree day file by day
/// file. The optional resolver is injected by the caller; `None` means
/// identifiers pass through untouched.
pub struct Converter {
    input_dir: PathBuf,
    output_dir: PathBuf,
    token: Option<String>,
    rules: Vec<MappingRule>,
    report: ConversionReport,
    resolved_ids: HashSet<String>,
    unresolved_ids: HashSet<String>,
}

impl Converter {
    pub fn new(input_dir: &Path, output_dir: &Path, token: Option<String>) -> Converter {
        Converter {
            input_dir: input_dir.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            token,
            rules: mapping::message_mapping_table(),
            report: ConversionReport::new(),
            resolved_ids: HashSet::new(),
            unresolved_ids: HashSet::new(),
        }
    }

    /// Run the conversion. On success the output directory holds
    /// `users.json`, `channels.json` and one subdirectory per channel with
    /// `yyyy-MM-dd.json` day files.
    pub async fn convert<R: UserResolver>(
        mut self,
        mut resolver: Option<&mut R>,
    ) -> Result<ConversionReport, ConvertError> {
        println!("=== Reading Export ===");
        let users_path = self.input_dir.join("user_list.json");
        let user_list = read_json(&users_path)?;
        let channels_path = self.input_dir.join("channel_list.json");
        let channel_list = as_array(read_json(&channels_path)?, &channels_path)?;

        let mut known_ids: HashSet<String> = HashSet::new();
        let mut kept: Vec<(String, String, Value)> = Vec::new();
        for record in channel_list {
            let id = record
                .get("id")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    ConvertError::Schema(channels_path.clone(), "channel record missing 'id'".into())
                })?
                .to_string();
            known_ids.insert(id.clone());

            let is_im = record.get("is_im").and_then(Value::as_bool).unwrap_or(false);
            let is_mpim = record
                .get("is_mpim")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            if is_im || is_mpim {
                self.report.channels_skipped += 1;
                continue;
            }

            let name = record
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    ConvertError::Schema(
                        channels_path.clone(),
                        format!("channel record '{id}' missing 'name'"),
                    )
                })?
                .to_string();
            kept.push((id, name, record));
        }
        println!(
            "  ✓ {} channels listed, {} direct/group conversations skipped",
            kept.len(),
            self.report.channels_skipped
        );

        let unlisted = export::unlisted_channel_files(&self.input_dir, &known_ids)
            .map_err(|e| ConvertError::Io(self.input_dir.clone(), e))?;
        for id in unlisted {
            self.warn(format!(
                "channel file 'channel_{id}.json' has no entry in channel_list.json and was ignored"
            ));
        }

        println!("\n=== Converting Channels ===");
        let mut channels = Vec::with_capacity(kept.len());
        for (id, name, _) in &kept {
            channels.push(self.load_channel(id, name)?);
        }

        println!("\n=== Writing Official Export ===");
        fs::create_dir_all(&self.output_dir)
            .map_err(|e| ConvertError::Io(self.output_dir.clone(), e))?;

        let users_out = match resolver.as_deref_mut() {
            Some(resolver) => self.enrich_users(user_list, resolver).await,
            None => user_list,
        };
        write_json(&self.output_dir.join("users.json"), &users_out)?;

        let channels_out = Value::Array(kept.into_iter().map(|(_, _, record)| record).collect());
        write_json(&self.output_dir.join("channels.json"), &channels_out)?;

        for channel in &channels {
            let channel_dir = self.output_dir.join(&channel.name);
            fs::create_dir_all(&channel_dir)
                .map_err(|e| ConvertError::Io(channel_dir.clone(), e))?;

            let mut day_count = 0;
            for (day, group) in channel.messages_by_day() {
                let mut records = Vec::with_capacity(group.len());
                for message in group {
                    let mut mapped = mapping::apply_rules(message.content(), &self.rules)
                        .map_err(|e| ConvertError::Schema(channel_dir.clone(), e.to_string()))?;
                    if let Some(resolver) = resolver.as_deref_mut() {
                        self.resolve_author(&mut mapped, resolver).await;
                    }
                    records.push(Value::Object(mapped));
                }
                let day_file = channel_dir.join(format!("{}.json", day.format("%Y-%m-%d")));
                write_json(&day_file, &Value::Array(records))?;
                day_count += 1;
                self.report.day_files_written += 1;
            }

            self.report.messages_converted += channel.len();
            self.report.channels_converted += 1;
            println!(
                "  ✓ #{}: {} messages across {} day files",
                channel.name,
                channel.len(),
                day_count
            );
        }

        self.report.users_resolved = self.resolved_ids.len();
        self.report.users_unresolved = self.unresolved_ids.len();
        Ok(self.report)
    }

    /// Load one channel: the main message file plus the replies file, whose
    /// threads fold back into their root messages. Replies are loaded first
    /// so their message versions win deduplication, as in the source
    /// exporter.
    fn load_channel(&self, id: &str, name: &str) -> Result<Channel, ConvertError> {
        let messages_path = self.input_dir.join(format!("channel_{id}.json"));
        let replies_path = self.input_dir.join(format!("channel-replies_{id}.json"));
        let records = as_array(read_json(&messages_path)?, &messages_path)?;
        let threads = as_array(read_json(&replies_path)?, &replies_path)?;

        let mut channel = Channel::new(id, name);
        for thread in threads {
            let thread = as_array(thread, &replies_path)?;
            let mut root: Option<Message> = None;
            for record in thread {
                let message = self.build_message(record, &replies_path)?;
                match root.as_mut() {
                    None => root = Some(message),
                    Some(root) => {
                        if let Some(user) = message.user().map(str::to_string) {
                            root.add_reply(&user, message.ts());
                        }
                        channel.add_message(message);
                    }
                }
            }
            if let Some(root) = root {
                channel.add_message(root);
            }
        }

        for record in records {
            let message = self.build_message(record, &messages_path)?;
            channel.add_message(message);
        }
        channel.sort_messages();
        Ok(channel)
    }

    fn build_message(&self, record: Value, path: &Path) -> Result<Message, ConvertError> {
        let mut message = Message::from_value(record)
            .map_err(|e| ConvertError::Schema(path.to_path_buf(), e.to_string()))?;
        if let Some(token) = &self.token {
            message.sign_file_urls(token);
        }
        Ok(message)
    }

    /// Attach the resolved profile to a mapped record. Lookup failures keep
    /// the identifier verbatim and warn once per unique identifier.
    async fn resolve_author<R: UserResolver>(
        &mut self,
        record: &mut Map<String, Value>,
        resolver: &mut R,
    ) {
        let id = match record.get("user").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => return,
        };
        match resolver.resolve(&id).await {
            Resolution::Resolved(user) => {
                mapping::set_nested(
                    record,
                    "user_profile.real_name",
                    Value::String(user.real_name),
                );
                mapping::set_nested(
                    record,
                    "user_profile.display_name",
                    Value::String(user.display_name),
                );
                self.resolved_ids.insert(id);
            }
            Resolution::Unresolved { reason, .. } => {
                if self.unresolved_ids.insert(id.clone()) {
                    self.warn(format!(
                        "could not resolve user '{id}': {reason} (identifier retained)"
                    ));
                }
            }
        }
    }

    /// Fill missing profile names on the user metadata records. Existing
    /// values always win; the lookup only supplements.
    async fn enrich_users<R: UserResolver>(&mut self, users: Value, resolver: &mut R) -> Value {
        let list = match users {
            Value::Array(list) => list,
            other => return other,
        };
        let mut enriched = Vec::with_capacity(list.len());
        for user in list {
            let mut record = match user {
                Value::Object(record) => record,
                other => {
                    enriched.push(other);
                    continue;
                }
            };
            let id = record.get("id").and_then(Value::as_str).map(str::to_string);
            if let Some(id) = id {
                match resolver.resolve(&id).await {
                    Resolution::Resolved(user) => {
                        let profile = record
                            .entry("profile".to_string())
                            .or_insert_with(|| Value::Object(Map::new()));
                        if let Value::Object(profile) = profile {
                            profile
                                .entry("real_name".to_string())
                                .or_insert_with(|| Value::String(user.real_name.clone()));
                            profile
                                .entry("display_name".to_string())
                                .or_insert_with(|| Value::String(user.display_name.clone()));
                        }
                        self.resolved_ids.insert(id);
                    }
                    Resolution::Unresolved { reason, .. } => {
                        if self.unresolved_ids.insert(id.clone()) {
                            self.warn(format!(
                                "could not resolve user '{id}': {reason} (identifier retained)"
                            ));
                        }
                    }
                }
            }
            enriched.push(Value::Object(record));
        }
        Value::Array(enriched)
    }

    fn warn(&mut self, warning: String) {
        println!("  ⚠ WARNING: {}", warning);
        self.report.add_warning(warning);
    }
}

fn read_json(path: &Path) -> Result<Value, ConvertError> {
    let raw = fs::read_to_string(path).map_err(|e| ConvertError::Io(path.to_path_buf(), e))?;
    serde_json::from_str(&raw).map_err(|e| ConvertError::Parse(path.to_path_buf(), e))
}

fn write_json(path: &Path, value: &Value) -> Result<(), ConvertError> {
    let raw = serde_json::to_string_pretty(value)
        .map_err(|e| ConvertError::Parse(path.to_path_buf(), e))?;
    fs::write(path, raw).map_err(|e| ConvertError::Io(path.to_path_buf(), e))
}

fn as_array(value: Value, path: &Path) -> Result<Vec<Value>, ConvertError> {
    match value {
        Value::Array(list) => Ok(list),
        _ => Err(ConvertError::Schema(
            path.to_path_buf(),
            "expected a JSON array".to_string(),
        )),
    }
}
