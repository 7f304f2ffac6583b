use sockframe_conn::{Connection, Listener};
use tokio::sync::oneshot;

use crate::cmd::ListenArgs;
use crate::exit::{transport_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_message, OutputFormat};

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::new(INTERNAL, format!("runtime setup failed: {err}")))?;

    runtime.block_on(async move {
        let listener = Listener::bind(&args.bind, args.port)
            .await
            .map_err(|err| transport_error("bind failed", err))?;

        let mut printed = 0usize;
        let mut next_peer = 0u64;

        loop {
            let transport = tokio::select! {
                accepted = listener.accept() => {
                    accepted.map_err(|err| transport_error("accept failed", err))?
                }
                _ = tokio::signal::ctrl_c() => return Ok(SUCCESS),
            };

            next_peer += 1;
            let peer = format!("peer-{next_peer}");
            let conn = Connection::new(transport);
            conn.open();

            loop {
                let (tx, rx) = oneshot::channel();
                conn.receive(move |result| {
                    let _ = tx.send(result);
                });

                let received = tokio::select! {
                    received = rx => received,
                    _ = tokio::signal::ctrl_c() => return Ok(SUCCESS),
                };
                let message = match received {
                    Ok(Ok(message)) => message,
                    // Peer went away; go back to accepting.
                    Ok(Err(_)) | Err(_) => break,
                };

                print_message(message.as_ref(), &peer, format);
                printed = printed.saturating_add(1);

                if args.echo {
                    conn.send(message, |_| {});
                }

                if let Some(count) = args.count {
                    if printed >= count {
                        return Ok(SUCCESS);
                    }
                }
            }
        }
    })
}
