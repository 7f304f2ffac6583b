use std::fs;
use std::time::Duration;

use bytes::Bytes;
use sockframe_conn::Connection;
use tokio::sync::oneshot;

use crate::cmd::SendArgs;
use crate::exit::{connection_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS, TIMEOUT, USAGE};
use crate::output::{print_message, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let payload = resolve_payload(&args)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::new(INTERNAL, format!("runtime setup failed: {err}")))?;

    runtime.block_on(async move {
        let conn = Connection::remote(args.host.as_str(), args.port)
            .map_err(|err| transport_error("connect failed", err))?;
        conn.open();

        let (done_tx, done_rx) = oneshot::channel();
        conn.send(Bytes::from(payload), move |result| {
            let _ = done_tx.send(result);
        });
        await_completion(done_rx, wait_timeout, "send")
            .await?
            .map_err(|err| connection_error("send failed", err))?;

        if args.wait {
            let (reply_tx, reply_rx) = oneshot::channel();
            conn.receive(move |result| {
                let _ = reply_tx.send(result);
            });
            let reply = await_completion(reply_rx, wait_timeout, "receive")
                .await?
                .map_err(|err| connection_error("receive failed", err))?;
            let peer = format!("{}:{}", args.host, args.port);
            print_message(reply.as_ref(), &peer, format);
        }

        conn.close_write();
        Ok(SUCCESS)
    })
}

async fn await_completion<T>(
    rx: oneshot::Receiver<T>,
    limit: Duration,
    what: &str,
) -> CliResult<T> {
    match tokio::time::timeout(limit, rx).await {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(_)) => Err(CliError::new(
            INTERNAL,
            format!("connection went away before {what} completed"),
        )),
        Err(_) => Err(CliError::new(TIMEOUT, format!("{what} timed out"))),
    }
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path).map_err(|err| {
            crate::exit::io_error(&format!("failed reading {}", path.display()), err)
        });
    }
    Ok(Vec::new())
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        _ => Err(CliError::new(
            USAGE,
            format!("unsupported duration unit: {unit}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn payload_defaults_to_empty() {
        let args = SendArgs {
            host: "localhost".into(),
            port: 9000,
            data: None,
            file: None,
            wait: false,
            wait_timeout: "5s".into(),
        };
        assert!(resolve_payload(&args).unwrap().is_empty());
    }

    #[test]
    fn payload_from_data_flag() {
        let args = SendArgs {
            host: "localhost".into(),
            port: 9000,
            data: Some("hello".into()),
            file: None,
            wait: false,
            wait_timeout: "5s".into(),
        };
        assert_eq!(resolve_payload(&args).unwrap(), b"hello");
    }
}
