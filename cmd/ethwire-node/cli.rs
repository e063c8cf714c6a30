use clap::{Arg, ArgAction, Command};
use tracing::Level;

pub fn cli() -> Command {
    Command::new("ethwire-node")
        .about("Minimal devp2p RLPx peer: dials or accepts one session and speaks eth/68")
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .default_value(Level::INFO.as_str())
                .value_name("LOG_LEVEL")
                .action(ArgAction::Set),
        )
        .subcommand(
            Command::new("listen")
                .about("Accept one incoming RLPx connection")
                .arg(
                    Arg::new("addr")
                        .long("addr")
                        .default_value("0.0.0.0:30303")
                        .value_name("ADDRESS")
                        .action(ArgAction::Set),
                ),
        )
        .subcommand(
            Command::new("connect")
                .about("Dial a peer and run the RLPx handshake")
                .arg(
                    Arg::new("addr")
                        .long("addr")
                        .required(true)
                        .value_name("ADDRESS")
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("node-id")
                        .long("node-id")
                        .required(true)
                        .value_name("HEX_PUBKEY")
                        .help("the peer's 64-byte uncompressed public key, hex encoded")
                        .action(ArgAction::Set),
                ),
        )
}
