use eslwire_frame::EventName;

use crate::cmd::{ConnectArgs, EventSink, ListenArgs, Session};
use crate::exit::{client_error, CliError, CliResult, INTERNAL, SUCCESS, USAGE};
use crate::output::{print_event, OutputFormat};

pub async fn run(args: ListenArgs, conn: &ConnectArgs, format: OutputFormat) -> CliResult<i32> {
    let names = parse_event_names(args.events.as_deref().unwrap_or_default())?;
    let (sink, mut events) = EventSink::channel();
    let session = Session::open(conn, sink).await?;

    if let Err(err) = session.conn.subscribe_events(&names).await {
        session.finish().await?;
        return Err(client_error("subscribe failed", err));
    }

    let mut printed = 0usize;
    loop {
        if args.count.is_some_and(|count| printed >= count) {
            break;
        }
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                print_event(&event, format);
                printed = printed.saturating_add(1);
            }
            signal = tokio::signal::ctrl_c() => {
                signal.map_err(|err| {
                    CliError::new(INTERNAL, format!("signal handler setup failed: {err}"))
                })?;
                break;
            }
        }
    }

    session.finish().await?;
    Ok(SUCCESS)
}

fn parse_event_names(raw: &[String]) -> CliResult<Vec<EventName>> {
    raw.iter()
        .map(|name| name.trim().to_ascii_uppercase())
        .filter(|name| !name.is_empty())
        .map(|name| match EventName::from_wire(&name) {
            EventName::Unknown => Err(CliError::new(USAGE, format!("unknown event name: {name}"))),
            known => Ok(known),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_are_case_insensitive() {
        let names = parse_event_names(&["channel_answer".into(), " HEARTBEAT ".into()]).unwrap();
        assert_eq!(names, vec![EventName::ChannelAnswer, EventName::Heartbeat]);
    }

    #[test]
    fn empty_list_means_all() {
        assert!(parse_event_names(&[]).unwrap().is_empty());
    }

    #[test]
    fn unknown_name_is_usage_error() {
        let err = parse_event_names(&["NOT_AN_EVENT".into()]).unwrap_err();
        assert_eq!(err.code, USAGE);
    }
}
