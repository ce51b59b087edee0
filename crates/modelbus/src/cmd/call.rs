use modelbus_comm::ChannelConfig;

use crate::cmd::{open_registry, unescape, CallArgs};
use crate::exit::{channel_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_message, OutputFormat};

pub fn run(args: CallArgs, format: OutputFormat) -> CliResult<i32> {
    let registry = open_registry(&args.channel, ChannelConfig::default())?;
    let mut client = registry
        .open_rpc_client(
            &args.channel.name,
            &unescape(&args.request_fmt),
            &unescape(&args.response_fmt),
        )
        .map_err(|err| channel_error("open failed", err))?;

    let fields: Vec<&str> = args.values.iter().map(String::as_str).collect();
    let request = client
        .request_format()
        .parse_args(&fields)
        .map_err(|err| CliError::new(USAGE, format!("invalid request: {err}")))?;

    let response = match args.timeout {
        Some(timeout) => client.call_timeout(&request, timeout),
        None => client.call(&request),
    }
    .map_err(|err| channel_error("call failed", err))?;

    print_message(
        &args.channel.name,
        client.response_format(),
        &response,
        format,
    );
    Ok(SUCCESS)
}
