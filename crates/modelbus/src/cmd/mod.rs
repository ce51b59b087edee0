use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand};
use modelbus_comm::{ChannelConfig, ChannelDirectory, Registry};
use modelbus_transport::{Address, CloseHandle};

use crate::exit::{channel_error, CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod call;
pub mod listen;
pub mod send;
pub mod serve_fib;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send one message, or one per stdin line, then end the stream.
    Send(SendArgs),
    /// Print messages received on a channel.
    Listen(ListenArgs),
    /// Make one RPC call and print the response.
    Call(CallArgs),
    /// Answer Fibonacci requests on an RPC endpoint.
    ServeFib(ServeFibArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Send(args) => send::run(args),
        Command::Listen(args) => listen::run(args, format),
        Command::Call(args) => call::run(args, format),
        Command::ServeFib(args) => serve_fib::run(args),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ChannelArgs {
    /// Channel or endpoint name.
    pub name: String,
    /// Address for NAME (mem:KEY, unix:PATH, unix-listen:PATH). Overrides the directory.
    #[arg(long, short = 'a', value_name = "ADDRESS")]
    pub address: Option<Address>,
    /// Channel directory JSON file. Default: the MODELBUS_CHANNELS variable.
    #[arg(long, value_name = "FILE")]
    pub channels: Option<PathBuf>,
    /// How long to wait for a socket peer (e.g. 5s, 500ms).
    #[arg(long, value_parser = parse_duration, default_value = "30s")]
    pub connect_timeout: Duration,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub channel: ChannelArgs,
    /// Message format string; \n, \t and \\ escapes are expanded.
    #[arg(long = "fmt", value_name = "FORMAT")]
    pub fmt: String,
    /// Read messages from stdin, one per line.
    #[arg(long, conflicts_with = "values")]
    pub stdin: bool,
    /// Field values of a single message.
    #[arg(allow_hyphen_values = true)]
    pub values: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    #[command(flatten)]
    pub channel: ChannelArgs,
    /// Message format string; \n, \t and \\ escapes are expanded.
    #[arg(long = "fmt", value_name = "FORMAT")]
    pub fmt: String,
    /// Exit after receiving N messages.
    #[arg(long)]
    pub count: Option<usize>,
    /// Give up when no message arrives within this bound (e.g. 5s, 500ms).
    #[arg(long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,
}

#[derive(Args, Debug)]
pub struct CallArgs {
    #[command(flatten)]
    pub channel: ChannelArgs,
    /// Request format string.
    #[arg(long, value_name = "FORMAT")]
    pub request_fmt: String,
    /// Response format string.
    #[arg(long, value_name = "FORMAT")]
    pub response_fmt: String,
    /// Maximum time to wait for the response (e.g. 5s, 500ms).
    #[arg(long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,
    /// Request field values.
    #[arg(allow_hyphen_values = true)]
    pub values: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ServeFibArgs {
    #[command(flatten)]
    pub channel: ChannelArgs,
    /// Exit after answering N requests.
    #[arg(long)]
    pub count: Option<u64>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Build a registry for the channel named on the command line.
pub fn open_registry(args: &ChannelArgs, config: ChannelConfig) -> CliResult<Registry> {
    let mut directory = match &args.channels {
        Some(path) => ChannelDirectory::from_path(path),
        None => ChannelDirectory::from_env(),
    }
    .map_err(|err| channel_error("channel directory", err))?;

    if let Some(address) = &args.address {
        directory.insert(args.name.clone(), address.clone());
    }
    Ok(Registry::with_config(
        directory,
        config.with_connect_timeout(args.connect_timeout),
    ))
}

/// Close `handle` on Ctrl-C and record that it happened.
pub fn close_on_interrupt(handle: CloseHandle) -> CliResult<Arc<AtomicBool>> {
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
        handle.close();
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))?;
    Ok(interrupted)
}

/// Expand the backslash escapes a shell leaves in a format argument.
pub fn unescape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
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
    fn unescape_expands_shell_escapes() {
        assert_eq!(unescape(r"%6s\t%d\t%f\n"), "%6s\t%d\t%f\n");
        assert_eq!(unescape(r"a\\b"), "a\\b");
        assert_eq!(unescape(r"%d\q"), "%d\\q");
        assert_eq!(unescape("trailing\\"), "trailing\\");
    }
}
