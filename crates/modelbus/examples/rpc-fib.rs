//! Fibonacci RPC between a server thread and a client.
//!
//! Run with:
//!   cargo run --example rpc-fib
//!
//! The same exchange across processes, using the CLI:
//!   cargo run --features cli -- serve-fib fib_server --address unix-listen:/tmp/fib.sock
//!   cargo run --features cli -- call fib_client --address unix:/tmp/fib.sock \
//!     --request-fmt '%d\n' --response-fmt '%d %d\n' 5

use std::thread;

use modelbus::transport::Address;
use modelbus::{ChannelDirectory, Registry, Value};

fn fib(n: i64) -> i64 {
    let (mut prev, mut prevprev, mut result) = (1i64, 0i64, 1i64);
    for _ in 1..n {
        result = prev + prevprev;
        prevprev = prev;
        prev = result;
    }
    result
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let registry = Registry::new(
        ChannelDirectory::new()
            .with("fib_server", Address::memory("fib"))
            .with("fib_client", Address::memory("fib")),
    );

    let mut server = registry.open_rpc_server("fib_server", "%d\n", "%d %d\n")?;
    let mut client = registry.open_rpc_client("fib_client", "%d\n", "%d %d\n")?;

    let worker = thread::spawn(move || {
        server.serve(|request| {
            let n = request.first().and_then(Value::as_int).unwrap_or_default();
            vec![Value::Int(n), Value::Int(fib(n))]
        })
    });

    for n in 1..=10i64 {
        let (input, output): (i64, i64) = client.call_tuple((n,))?;
        eprintln!("fib({input}) = {output}");
    }
    drop(client);

    let served = worker.join().map_err(|_| "server panicked")??;
    eprintln!("server answered {served} requests");
    Ok(())
}
