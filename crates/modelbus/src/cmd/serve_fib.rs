use std::sync::atomic::Ordering;

use modelbus_comm::{ChannelConfig, Result, RpcServer};
use modelbus_serialize::Value;
use tracing::info;

use crate::cmd::{close_on_interrupt, open_registry, ServeFibArgs};
use crate::exit::{channel_error, CliResult, SUCCESS};

pub const REQUEST_FORMAT: &str = "%d\n";
pub const RESPONSE_FORMAT: &str = "%d %d\n";

pub fn run(args: ServeFibArgs) -> CliResult<i32> {
    let registry = open_registry(&args.channel, ChannelConfig::default())?;
    let mut server = registry
        .open_rpc_server(&args.channel.name, REQUEST_FORMAT, RESPONSE_FORMAT)
        .map_err(|err| channel_error("open failed", err))?;
    let interrupted = close_on_interrupt(server.close_handle())?;

    let served = match args.count {
        Some(limit) => serve_limited(&mut server, limit),
        None => server.serve(fib_response),
    };

    match served {
        Ok(served) => {
            info!(endpoint = %args.channel.name, served, "serving finished");
            Ok(SUCCESS)
        }
        Err(_) if interrupted.load(Ordering::SeqCst) => Ok(SUCCESS),
        Err(err) => Err(channel_error("serve failed", err)),
    }
}

fn serve_limited(server: &mut RpcServer, limit: u64) -> Result<u64> {
    let mut served = 0;
    while served < limit {
        let request = match server.recv(None) {
            Ok(request) => request,
            Err(err) if err.is_end_of_input() => break,
            Err(err) => return Err(err),
        };
        server.send(&fib_response(request))?;
        served += 1;
    }
    Ok(served)
}

/// Response `(n, fib(n))` for request `(n)`.
pub fn fib_response(request: Vec<Value>) -> Vec<Value> {
    let n = request.first().and_then(Value::as_int).unwrap_or_default();
    vec![Value::Int(n), Value::Int(fib(n))]
}

/// Fibonacci number with fib(1) = fib(2) = 1. Inputs below 1 give 1;
/// results saturate at `i64::MAX`.
pub fn fib(n: i64) -> i64 {
    let (mut prev, mut prevprev) = (1i64, 0i64);
    let mut result = 1;
    for _ in 1..n {
        result = prev.saturating_add(prevprev);
        prevprev = prev;
        prev = result;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fib_values() {
        let values: Vec<i64> = (1..=10).map(fib).collect();
        assert_eq!(values, vec![1, 1, 2, 3, 5, 8, 13, 21, 34, 55]);
        assert_eq!(fib(0), 1);
        assert_eq!(fib(200), i64::MAX);
    }

    #[test]
    fn response_echoes_input() {
        assert_eq!(
            fib_response(vec![Value::Int(5)]),
            vec![Value::Int(5), Value::Int(5)]
        );
    }
}
