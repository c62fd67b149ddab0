//! Output formatting

use anyhow::Result;
use clap::ValueEnum;
use serde::Serialize;
use serde_json::Value;
use tabled::{Table, Tabled};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Yaml,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Self as ValueEnum>::from_str(s, true)
    }
}

#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "FIELD")]
    field: String,
    #[tabled(rename = "VALUE")]
    value: String,
}

impl OutputFormat {
    pub fn render<T: Serialize>(&self, data: &T) -> Result<String> {
        Ok(match self {
            OutputFormat::Json => serde_json::to_string_pretty(data)?,
            OutputFormat::Yaml => serde_yaml::to_string(data)?,
            OutputFormat::Table => table(serde_json::to_value(data)?),
        })
    }

    pub fn print<T: Serialize>(&self, data: &T) -> Result<()> {
        println!("{}", self.render(data)?);
        Ok(())
    }
}

/// Objects become FIELD/VALUE rows; nested values are shown as compact JSON
fn table(value: Value) -> String {
    match value {
        Value::Object(map) => {
            let rows = map.into_iter().map(|(field, value)| FieldRow {
                field,
                value: cell(value),
            });
            Table::new(rows).to_string()
        }
        other => cell(other),
    }
}

fn cell(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}
