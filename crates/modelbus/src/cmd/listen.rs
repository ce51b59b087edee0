use std::sync::atomic::Ordering;

use modelbus_comm::{ChannelConfig, Direction, ErrorKind};
use tracing::{info, warn};

use crate::cmd::{close_on_interrupt, open_registry, unescape, ListenArgs};
use crate::exit::{channel_error, CliResult, SUCCESS};
use crate::output::{print_message, OutputFormat};

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let message_format = unescape(&args.fmt);
    let config = ChannelConfig::default().with_recv_timeout(args.timeout);
    let registry = open_registry(&args.channel, config)?;
    let mut channel = registry
        .open_format_channel(&args.channel.name, &message_format, Direction::Input)
        .map_err(|err| channel_error("open failed", err))?;
    let interrupted = close_on_interrupt(channel.close_handle())?;

    let mut printed = 0usize;
    loop {
        let values = match channel.recv() {
            Ok(values) => values,
            Err(err) if err.is_end_of_input() => {
                info!(channel = %args.channel.name, printed, "end of input");
                break;
            }
            Err(_) if interrupted.load(Ordering::SeqCst) => break,
            Err(err) if is_message_error(err.kind()) => {
                warn!(channel = %args.channel.name, error = %err, "skipping undecodable message");
                continue;
            }
            Err(err) => return Err(channel_error("receive failed", err)),
        };

        print_message(&args.channel.name, channel.format(), &values, format);
        printed = printed.saturating_add(1);

        if args.count.is_some_and(|count| printed >= count) {
            break;
        }
    }

    Ok(SUCCESS)
}

fn is_message_error(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::ArityMismatch | ErrorKind::TypeMismatch | ErrorKind::ParseError
    )
}
