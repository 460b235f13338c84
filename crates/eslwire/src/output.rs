use std::collections::BTreeMap;
use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use eslwire_frame::{Event, EventName, EventType};
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
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct EventOutput<'a> {
    event_type: EventType,
    name: Option<EventName>,
    unique_id: Option<&'a str>,
    application: Option<&'a str>,
    application_data: Option<&'a str>,
    timestamp: Option<i64>,
    headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<String>,
}

/// Print one notification.
pub fn print_event(event: &Event, format: OutputFormat) {
    let body = event.text_body().map(|b| b.into_owned());
    match format {
        OutputFormat::Json => {
            let out = EventOutput {
                event_type: event.event_type(),
                name: event.name(),
                unique_id: non_empty(event.unique_id()),
                application: non_empty(event.application()),
                application_data: non_empty(event.application_data()),
                timestamp: event.timestamp(),
                headers: event_headers(event),
                body,
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["EVENT", "UNIQUE-ID", "TIMESTAMP", "APPLICATION"])
                .add_row(vec![
                    event_name(event),
                    event.unique_id().unwrap_or_default().to_string(),
                    event
                        .timestamp()
                        .map(|t| t.to_string())
                        .unwrap_or_default(),
                    event.application().unwrap_or_default().to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "event={} uuid={} timestamp={} app={}",
                event_name(event),
                event.unique_id().unwrap_or("-"),
                event.timestamp().unwrap_or_default(),
                non_empty(event.application()).unwrap_or("-"),
            );
            if let Some(body) = body {
                println!("{}", body.trim_end());
            }
        }
        OutputFormat::Raw => {
            let nested = event.notification().map(|n| n.headers.to_string());
            print_raw(nested.unwrap_or_else(|| event.headers().to_string()).as_bytes());
            print_raw(b"\n\n");
        }
    }
}

#[derive(Serialize)]
struct ReplyOutput<'a> {
    command: &'a str,
    reply: &'a str,
}

/// Print the text answer of a command, query or background job.
pub fn print_reply(command: &str, reply: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&ReplyOutput { command, reply }),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["COMMAND", "REPLY"])
                .add_row(vec![command, reply.trim_end()]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{}", reply.trim_end()),
        OutputFormat::Raw => print_raw(reply.as_bytes()),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

/// Nested notification headers, decoded; repeated names are comma-joined.
fn event_headers(event: &Event) -> BTreeMap<String, String> {
    let headers = match event.notification() {
        Some(notification) => &notification.headers,
        None => event.headers(),
    };
    let mut out: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers.iter() {
        out.entry(name.to_string())
            .and_modify(|joined| {
                joined.push(',');
                joined.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    out
}

fn event_name(event: &Event) -> String {
    match event.name() {
        Some(EventName::Unknown) | None => event
            .get("Event-Name")
            .map(|n| n.into_owned())
            .unwrap_or_else(|| event.event_type().to_string()),
        Some(name) => name.to_string(),
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
