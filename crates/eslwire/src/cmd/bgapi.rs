use std::time::Duration;

use eslwire_frame::event::HEADER_JOB_UUID;
use eslwire_frame::{Event, EventName};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::debug;

use crate::cmd::{parse_duration, BgapiArgs, ConnectArgs, EventSink, Session};
use crate::exit::{client_error, CliError, CliResult, SUCCESS, TIMEOUT, TRANSPORT_ERROR};
use crate::output::{print_reply, OutputFormat};

pub async fn run(args: BgapiArgs, conn: &ConnectArgs, format: OutputFormat) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let (sink, mut events) = EventSink::channel();
    let session = Session::open(conn, sink).await?;

    let result = submit(&session, &args, &mut events, wait_timeout).await;
    session.finish().await?;

    let (command, reply) = result?;
    print_reply(&command, &reply, format);
    Ok(SUCCESS)
}

async fn submit(
    session: &Session,
    args: &BgapiArgs,
    events: &mut UnboundedReceiver<Event>,
    wait_timeout: Duration,
) -> CliResult<(String, String)> {
    if args.wait {
        session
            .conn
            .subscribe_events(&[EventName::BackgroundJob])
            .await
            .map_err(|err| client_error("subscribe failed", err))?;
    }

    let job_id = session
        .conn
        .bgapi(&args.command, args.args.as_slice())
        .await
        .map_err(|err| client_error("bgapi failed", err))?;
    if !args.wait {
        return Ok((args.command.clone(), job_id));
    }

    debug!(job_id = %job_id, "waiting for background job");
    let event = tokio::time::timeout(wait_timeout, wait_for_job(events, &job_id))
        .await
        .map_err(|_| {
            CliError::new(
                TIMEOUT,
                format!("job {job_id} did not finish within {wait_timeout:?}"),
            )
        })??;
    let result = event.text_body().unwrap_or_default().into_owned();
    Ok((format!("{} ({job_id})", args.command), result))
}

/// Notifications for other jobs may arrive first; skip them.
async fn wait_for_job(events: &mut UnboundedReceiver<Event>, job_id: &str) -> CliResult<Event> {
    while let Some(event) = events.recv().await {
        if is_job_result(&event, job_id) {
            return Ok(event);
        }
    }
    Err(CliError::new(
        TRANSPORT_ERROR,
        "connection closed before the job finished",
    ))
}

fn is_job_result(event: &Event, job_id: &str) -> bool {
    event.name() == Some(EventName::BackgroundJob)
        && event.get(HEADER_JOB_UUID).as_deref() == Some(job_id)
}
