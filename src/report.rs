use serde::Serialize;

/// Aggregated outcome of one conversion run.
///
/// Warnings collected here are non-fatal by definition; anything fatal is
/// surfaced as a `ConvertError` instead and never reaches the report.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversionReport {
    pub channels_converted: usize,
    pub channels_skipped: usize,
    pub day_files_written: usize,
    pub messages_converted: usize,
    pub users_resolved: usize,
    pub users_unresolved: usize,
    pub warnings: Vec<String>,
}

impl ConversionReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Format the report for console output.
    pub fn format_console(&self) -> String {
        let mut output = String::new();

        output.push_str("=== Conversion Report ===\n\n");
        output.push_str(&format!(
            "Channels converted: {} ({} direct/group conversations skipped)\n",
            self.channels_converted, self.channels_skipped
        ));
        output.push_str(&format!("Messages converted: {}\n", self.messages_converted));
        output.push_str(&format!("Day files written:  {}\n", self.day_files_written));
        if self.users_resolved > 0 || self.users_unresolved > 0 {
            output.push_str(&format!(
                "Users resolved:     {} ({} unresolved)\n",
                self.users_resolved, self.users_unresolved
            ));
        }

        if self.has_warnings() {
            output.push_str(&format!("\nWarnings ({}):\n", self.warnings.len()));
            for warning in &self.warnings {
                output.push_str(&format!("  ⚠ {}\n", warning));
            }
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_starts_clean() {
        let report = ConversionReport::new();
        assert!(!report.has_warnings());
        assert_eq!(report.channels_converted, 0);
    }

    #[test]
    fn test_format_console_includes_counts_and_warnings() {
        let mut report = ConversionReport::new();
        report.channels_converted = 2;
        report.messages_converted = 40;
        report.day_files_written = 5;
        report.users_resolved = 3;
        report.users_unresolved = 1;
        report.add_warning("could not resolve user 'U99'".to_string());

        let formatted = report.format_console();
        assert!(formatted.contains("Conversion Report"));
        assert!(formatted.contains("Messages converted: 40"));
        assert!(formatted.contains("3 (1 unresolved)"));
        assert!(formatted.contains("could not resolve user 'U99'"));
    }

    #[test]
    fn test_resolution_line_omitted_without_lookups() {
        let report = ConversionReport::new();
        assert!(!report.format_console().contains("Users resolved"));
    }
}
