use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("chatprims {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: chatprims");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "build_target: {}",
        option_env!("CHATPRIMS_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("features: peer={}, cli=true", cfg!(feature = "peer"));
    println!(
        "defaults: max_peers={}, max_buffer={}, read_chunk={}",
        chatprims_peer::DEFAULT_MAX_PEERS,
        chatprims_frame::DEFAULT_MAX_BUFFER_SIZE,
        chatprims_peer::READ_CHUNK_SIZE
    );

    Ok(SUCCESS)
}
