use crate::pipeline::Report;
use anyhow::Result;

pub mod text;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "txt" => Ok(Format::Text),
            "json" => Ok(Format::Json),
            other => Err(format!("unknown report format '{}'", other)),
        }
    }
}

pub fn generate(report: &Report, format: Format) -> Result<String> {
    match format {
        Format::Text => text::render(report),
        Format::Json => Ok(serde_json::to_string_pretty(report)?),
    }
}
