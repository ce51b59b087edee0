//! Two models in one process exchanging tab-separated tuples.
//!
//! Run with:
//!   cargo run --example formatted-io

use std::thread;

use modelbus::transport::Address;
use modelbus::{ChannelDirectory, Direction, Registry, Value};

const FORMAT: &str = "%6s\t%d\t%f\n";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let registry = Registry::new(
        ChannelDirectory::new()
            .with("outputA", Address::memory("a"))
            .with("inputA", Address::memory("a")),
    );

    let mut output = registry.open_format_channel("outputA", FORMAT, Direction::Output)?;
    let mut input = registry.open_format_channel("inputA", FORMAT, Direction::Input)?;

    let producer = thread::spawn(move || -> modelbus::Result<()> {
        for (step, word) in ["abcdef", "ghijkl", "mnopqr"].into_iter().enumerate() {
            output.send_tuple((word, step as i64, 3.14 * step as f64))?;
        }
        // Dropping the channel ends the stream.
        Ok(())
    });

    for message in input.incoming() {
        let values: Vec<String> = message?.iter().map(Value::to_string).collect();
        eprintln!("received {}", values.join(" | "));
    }

    producer.join().map_err(|_| "producer panicked")??;
    Ok(())
}
