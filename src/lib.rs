pub mod convert;
pub mod export;
pub mod mapping;
pub mod report;
pub mod resolver;

// Re-export core types for convenience
pub use convert::{ConvertError, Converter};
pub use export::{Channel, Message};
pub use mapping::{message_mapping_table, MappingError, MappingRule};
pub use report::ConversionReport;
pub use resolver::{Resolution, ResolvedUser, SlackUserResolver, UserLookup, UserResolver};
