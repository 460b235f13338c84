use eslwire_client::NoopHandler;

use crate::cmd::{ConnectArgs, ExecuteArgs, Session};
use crate::exit::{client_error, CliResult, SUCCESS};
use crate::output::{print_reply, OutputFormat};

pub async fn run(args: ExecuteArgs, conn: &ConnectArgs, format: OutputFormat) -> CliResult<i32> {
    let session = Session::open(conn, NoopHandler).await?;

    let result = if args.sync {
        session
            .conn
            .execute_sync(&args.app, &args.uuid, args.args.as_slice())
            .await
    } else {
        session.conn.execute(&args.app, &args.uuid, args.args.as_slice()).await
    };
    session.finish().await?;

    let reply = result.map_err(|err| client_error("execute failed", err))?;
    let text = reply.reply_text().unwrap_or_default();
    print_reply(&format!("{} {}", args.app, args.uuid), &text, format);
    Ok(SUCCESS)
}
