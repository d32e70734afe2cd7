use serde_json::{json, Map, Value};
use thiserror::Error;

/// A single field-mapping rule between the source exporter's message schema
/// and the official export schema.
///
/// The full mapping is an ordered list of these rules (see
/// [`message_mapping_table`]) so the conversion contract stays declarative
/// and auditable instead of being spread over conditional branches.
#[derive(Debug, Clone)]
pub struct MappingRule {
    pub source_key: &'static str,
    /// Destination path in dot notation, e.g. `user_profile.real_name`.
    pub destination_path: &'static str,
    /// Value used when the source field is absent. `None` means the field
    /// is simply omitted, unless the rule is marked required.
    pub default: Option<Value>,
    pub required: bool,
}

/// Errors raised while applying the mapping table to a single record.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("required field '{0}' is missing and has no default")]
    MissingRequired(&'static str),
}

impl MappingRule {
    pub fn new(source_key: &'static str, destination_path: &'static str) -> Self {
        Self {
            source_key,
            destination_path,
            default: None,
            required: false,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// The static mapping table for message records.
///
/// Source fields without a rule are dropped from the output; this is
/// documented behavior, not a defect. `ts` is the only field with no
/// possible default: without it a record cannot be partitioned by day.
pub fn message_mapping_table() -> Vec<MappingRule> {
    vec![
        MappingRule::new("type", "type").with_default(json!("message")),
        MappingRule::new("subtype", "subtype"),
        MappingRule::new("ts", "ts").required(),
        MappingRule::new("user", "user"),
        MappingRule::new("text", "text").with_default(json!("")),
        MappingRule::new("team", "team"),
        MappingRule::new("client_msg_id", "client_msg_id"),
        MappingRule::new("edited", "edited"),
        MappingRule::new("thread_ts", "thread_ts"),
        MappingRule::new("parent_user_id", "parent_user_id"),
        MappingRule::new("replies", "replies"),
        MappingRule::new("reply_count", "reply_count"),
        MappingRule::new("reply_users", "reply_users"),
        MappingRule::new("reply_users_count", "reply_users_count"),
        MappingRule::new("latest_reply", "latest_reply"),
        MappingRule::new("reactions", "reactions"),
        MappingRule::new("attachments", "attachments"),
        MappingRule::new("blocks", "blocks"),
        MappingRule::new("files", "files"),
    ]
}

/// Apply an ordered rule list to a source record, producing the destination
/// record. Only fields named by a rule are carried over.
pub fn apply_rules(
    record: &Map<String, Value>,
    rules: &[MappingRule],
) -> Result<Map<String, Value>, MappingError> {
    let mut mapped = Map::new();
    for rule in rules {
        match record.get(rule.source_key) {
            Some(value) => set_nested(&mut mapped, rule.destination_path, value.clone()),
            None => match &rule.default {
                Some(default) => set_nested(&mut mapped, rule.destination_path, default.clone()),
                None if rule.required => {
                    return Err(MappingError::MissingRequired(rule.source_key))
                }
                None => {}
            },
        }
    }
    Ok(mapped)
}

/// Insert a value at a dot-notation path, creating intermediate objects as
/// needed. A non-object value sitting on an intermediate segment is replaced.
pub fn set_nested(map: &mut Map<String, Value>, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            map.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(child) = entry {
                set_nested(child, rest, value);
            }
        }
    }
}

/// Read a value at a dot-notation path.
pub fn get_nested<'a>(map: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut current = map;
    let mut parts = path.split('.').peekable();
    while let Some(part) = parts.next() {
        let value = current.get(part)?;
        if parts.peek().is_none() {
            return Some(value);
        }
        current = value.as_object()?;
    }
    None
}
