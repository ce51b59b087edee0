use std::io::{self, BufRead};

use modelbus_comm::{Channel, ChannelConfig, Direction};
use modelbus_serialize::FormatCodec;
use tracing::info;

use crate::cmd::{open_registry, unescape, SendArgs};
use crate::exit::{channel_error, io_error, CliError, CliResult, SUCCESS, USAGE};

pub fn run(args: SendArgs) -> CliResult<i32> {
    let message_format = unescape(&args.fmt);
    let registry = open_registry(&args.channel, ChannelConfig::default())?;
    let mut channel = registry
        .open_format_channel(&args.channel.name, &message_format, Direction::Output)
        .map_err(|err| channel_error("open failed", err))?;

    let mut sent = 0usize;
    if args.stdin {
        for line in io::stdin().lock().lines() {
            let line = line.map_err(|err| io_error("failed reading stdin", err))?;
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.is_empty() {
                continue;
            }
            send_fields(&mut channel, &fields)?;
            sent += 1;
        }
    } else {
        let fields: Vec<&str> = args.values.iter().map(String::as_str).collect();
        send_fields(&mut channel, &fields)?;
        sent = 1;
    }

    channel.close();
    info!(channel = %args.channel.name, sent, "send finished");
    Ok(SUCCESS)
}

fn send_fields(channel: &mut Channel<FormatCodec>, fields: &[&str]) -> CliResult<usize> {
    let values = channel
        .format()
        .parse_args(fields)
        .map_err(|err| CliError::new(USAGE, format!("invalid message: {err}")))?;
    channel
        .send(&values)
        .map_err(|err| channel_error("send failed", err))
}
