use std::net::SocketAddr;
use std::str::FromStr as _;

use ethwire_rlpx::p2p::Capability;
use ethwire_rlpx::session::Session;
use ethwire_rlpx::{DisconnectReason, Message, SessionState};
use k256::{PublicKey, SecretKey};
use tracing::{info, warn};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli::cli().get_matches();

    let log_level = matches
        .get_one::<String>("log-level")
        .expect("log-level has a default value");
    let log_filter = EnvFilter::builder()
        .with_default_directive(Directive::from_str(log_level).expect("unsupported log level"))
        .from_env_lossy();
    let subscriber = FmtSubscriber::builder().with_env_filter(log_filter).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    // A real node persists its static identity across restarts; that's out
    // of scope here, so every run speaks with a freshly generated key.
    let signer = SecretKey::random(&mut rand::thread_rng());
    let capabilities = vec![Capability::eth(ethwire_rlpx::eth::ETH_VERSION as u8)];

    match matches.subcommand() {
        Some(("listen", sub_matches)) => {
            let addr = sub_matches.get_one::<String>("addr").expect("addr is required");
            run_listener(addr, signer, capabilities).await
        }
        Some(("connect", sub_matches)) => {
            let addr = sub_matches.get_one::<String>("addr").expect("addr is required");
            let node_id_hex = sub_matches.get_one::<String>("node-id").expect("node-id is required");
            run_connect(addr, node_id_hex, signer, capabilities).await
        }
        _ => {
            warn!("no subcommand given; run with `listen` or `connect`");
            Ok(())
        }
    }
}

async fn run_listener(addr: &str, signer: SecretKey, capabilities: Vec<Capability>) -> anyhow::Result<()> {
    let addr: SocketAddr = addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {addr}");

    let (stream, peer_addr) = tokio::select! {
        accepted = listener.accept() => accepted?,
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down before any peer connected");
            return Ok(());
        }
    };
    info!("accepted connection from {peer_addr}");

    let session = Session::accept(stream, signer, capabilities).await?;
    run_session(session).await
}

async fn run_connect(
    addr: &str,
    node_id_hex: &str,
    signer: SecretKey,
    capabilities: Vec<Capability>,
) -> anyhow::Result<()> {
    let addr: SocketAddr = addr.parse()?;
    let node_id_bytes = hex::decode(node_id_hex.trim_start_matches("0x"))?;
    let remote_node_id = decode_uncompressed_pubkey(&node_id_bytes)?;

    info!("dialing {addr}");
    let session = Session::connect(addr, signer, remote_node_id, capabilities).await?;
    info!("handshake complete, session is active");
    run_session(session).await
}

/// Parses a bare 64-byte node id (uncompressed pubkey with the leading
/// `0x04` tag stripped, as used in enode URLs) into a [`PublicKey`].
fn decode_uncompressed_pubkey(node_id: &[u8]) -> anyhow::Result<PublicKey> {
    let mut tagged = Vec::with_capacity(65);
    tagged.push(0x04);
    tagged.extend_from_slice(node_id);
    Ok(PublicKey::from_sec1_bytes(&tagged)?)
}

/// Drives one active session until it disconnects or the process is asked
/// to shut down, logging every capability-level message it receives.
async fn run_session(session: Session) -> anyhow::Result<()> {
    loop {
        tokio::select! {
            message = session.receive_message() => {
                match message {
                    Ok(message) => info!("received {message}"),
                    Err(err) => {
                        warn!("session ended: {err}");
                        return Ok(());
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down, disconnecting peer");
                session.disconnect(DisconnectReason::ClientQuitting).await?;
                return Ok(());
            }
        }

        if session.state().await != SessionState::Active {
            break;
        }
    }
    Ok(())
}
