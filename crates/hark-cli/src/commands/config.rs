use std::path::Path;

use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use hark::config::Config;
use serde_json::Value;

use crate::error::CliResult;
use crate::output::OutputFormat;

#[derive(Parser)]
pub struct ConfigCommand {
    #[clap(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Parser)]
pub enum ConfigSubcommand {
    #[clap(about = "Show current configuration")]
    Show,
}

impl ConfigCommand {
    pub async fn execute(&self, config_path: Option<&Path>, format: OutputFormat) -> CliResult<()> {
        match &self.command {
            ConfigSubcommand::Show => Self::show(config_path, format),
        }
    }

    fn show(config_path: Option<&Path>, format: OutputFormat) -> CliResult<()> {
        let config = Config::load(config_path)?;
        let sections = serde_json::to_value(&config)?;

        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&sections)?);
            }
            OutputFormat::Table => {
                match config_path {
                    Some(path) => println!("Configuration from: {}", path.display()),
                    None => println!("Configuration: (default search path)"),
                }
                println!("==============================\n");

                for (section, table) in section_tables(&sections) {
                    println!("[{section}]");
                    println!("{table}\n");
                }
            }
        }

        Ok(())
    }
}

/// One settings table per top-level config section
pub fn section_tables(sections: &Value) -> Vec<(String, Table)> {
    let Some(sections) = sections.as_object() else {
        return Vec::new();
    };

    sections
        .iter()
        .map(|(name, settings)| {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL_CONDENSED)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(["Setting", "Value"]);

            if let Some(settings) = settings.as_object() {
                for (key, value) in settings {
                    table.add_row([key.clone(), display_value(value)]);
                }
            }
            (name.clone(), table)
        })
        .collect()
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "(not set)".to_string(),
        Value::String(s) if s.is_empty() => "(not set)".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_tables_cover_every_section() {
        let sections = serde_json::to_value(Config::default()).unwrap();
        let names: Vec<String> = section_tables(&sections)
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        for expected in ["geofence", "queue", "scoring", "tracker", "remote"] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}");
        }
    }

    #[test]
    fn test_display_value() {
        assert_eq!(display_value(&Value::Null), "(not set)");
        assert_eq!(display_value(&Value::String(String::new())), "(not set)");
        assert_eq!(display_value(&serde_json::json!(5000)), "5000");
        assert_eq!(display_value(&serde_json::json!(true)), "true");
    }
}
