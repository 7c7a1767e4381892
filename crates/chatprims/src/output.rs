use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use chatprims_frame::Message;
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    origin: &'a str,
    size: usize,
    message: String,
    timestamp: String,
}

/// Print one received message to stdout. `origin` says where it came from.
pub fn print_message(message: &Message, origin: &str, format: OutputFormat) {
    println!("{}", render_message(message, origin, format));
    let _ = std::io::stdout().flush();
}

fn render_message(message: &Message, origin: &str, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                origin,
                size: message.len(),
                message: message.to_string(),
                timestamp: now_unix_seconds(),
            };
            serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FROM", "SIZE", "MESSAGE"])
                .add_row(vec![
                    origin.to_string(),
                    message.len().to_string(),
                    message.to_string(),
                ]);
            table.to_string()
        }
        OutputFormat::Pretty => format!("[{origin}] {message}"),
        OutputFormat::Raw => message.to_string(),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
