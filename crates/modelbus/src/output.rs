use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use modelbus_serialize::{FormatSpec, Value};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    channel: &'a str,
    format: &'a str,
    values: &'a [Value],
    timestamp: String,
}

/// Print one decoded message received on `channel`.
pub fn print_message(channel: &str, spec: &FormatSpec, values: &[Value], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                channel,
                format: spec.as_str(),
                values,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CHANNEL", "FIELD", "KIND", "VALUE"]);
            for (index, value) in values.iter().enumerate() {
                table.add_row(vec![
                    channel.to_string(),
                    index.to_string(),
                    value.kind().to_string(),
                    value.to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let rendered: Vec<String> = values.iter().map(Value::to_string).collect();
            println!("channel={channel} values=[{}]", rendered.join(", "));
        }
        OutputFormat::Raw => match spec.encode(values) {
            Ok(bytes) => print_raw(&bytes),
            Err(err) => eprintln!("warning: cannot re-encode message: {err}"),
        },
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
