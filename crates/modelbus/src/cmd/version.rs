use modelbus_frame::DEFAULT_MAX_PAYLOAD;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("modelbus {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: modelbus");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "build_target: {}",
        option_env!("MODELBUS_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "transports: memory{}",
        if cfg!(unix) { ", unix-domain-socket" } else { "" }
    );
    println!("max_message_size: {DEFAULT_MAX_PAYLOAD}");

    Ok(SUCCESS)
}
