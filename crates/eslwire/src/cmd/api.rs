use eslwire_client::NoopHandler;

use crate::cmd::{ApiArgs, ConnectArgs, Session};
use crate::exit::{client_error, CliResult, SUCCESS};
use crate::output::{print_reply, OutputFormat};

pub async fn run(args: ApiArgs, conn: &ConnectArgs, format: OutputFormat) -> CliResult<i32> {
    let session = Session::open(conn, NoopHandler).await?;

    let result = session.conn.api(&args.command, args.args.as_slice()).await;
    session.finish().await?;

    let body = result.map_err(|err| client_error("api failed", err))?;
    print_reply(&command_line(&args), &body, format);
    Ok(SUCCESS)
}

fn command_line(args: &ApiArgs) -> String {
    std::iter::once(args.command.as_str())
        .chain(args.args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}
