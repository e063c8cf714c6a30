//! The RLPx session state machine: drives the auth handshake, the Hello
//! capability exchange, and the established message loop over one TCP
//! connection. A [`Session`] is the handle a caller holds; the actual
//! socket I/O happens on a background task reachable only through the
//! `post_message`/`receive_message` queues, so a slow consumer can never
//! block the frame cipher's rolling MAC state out of sync with the wire.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use ethereum_types::H256;
use ethwire_rlp::decode::RLPDecode;
use k256::{PublicKey, SecretKey};
use tokio::io::{split, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::crypto::{generate_ephemeral_keypair, id2pubkey};
use crate::error::RLPxError;
use crate::frame::{FrameCipher, FrameReader, FrameWriter};
use crate::handshake::{decode_ack_message, decode_auth_message, encode_ack_message, encode_auth_message, FrameSecrets};
use crate::message::Message;
use crate::p2p::{Capability, DisconnectMessage, DisconnectReason, HelloMessage, PongMessage};

/// A connection attempt gives up after this long if the peer never accepts
/// the TCP handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// The lifecycle of one RLPx session. `Error` is terminal and distinct from
/// `Closed`: it marks a session that broke because of a protocol or
/// transport fault, as opposed to one torn down cleanly by either side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Connecting,
    Authenticating,
    Handshaking,
    Active,
    Disconnecting,
    Closed,
    Error,
}

/// What the peer advertised in its Hello message.
#[derive(Debug, Clone)]
pub struct PeerInfo {
    pub node_id: PublicKey,
    pub capabilities: Vec<Capability>,
}

/// A live (or recently live) RLPx session. The background driver task keeps
/// running until the peer disconnects or a protocol fault occurs; dropping
/// every `Session` handle aborts it.
pub struct Session {
    state: Arc<Mutex<SessionState>>,
    peer_info: Arc<Mutex<Option<PeerInfo>>>,
    outbound_tx: mpsc::Sender<Message>,
    inbound_rx: Arc<Mutex<mpsc::Receiver<Message>>>,
    driver: Arc<tokio::task::JoinHandle<()>>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}

impl Session {
    /// Dials `addr` and runs the initiator side of the handshake. The
    /// peer's static node id must already be known (from discovery or a
    /// static peer list), since RLPx authenticates against it before either
    /// side learns anything else about the other.
    pub async fn connect(
        addr: SocketAddr,
        signer: SecretKey,
        remote_node_id: PublicKey,
        capabilities: Vec<Capability>,
    ) -> Result<Self, RLPxError> {
        let mut stream = timeout(DEFAULT_CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| RLPxError::Timeout)?
            .map_err(|e| RLPxError::ConnectionFailed(e.to_string()))?;

        let local_nonce = H256::random();
        let local_ephemeral = generate_ephemeral_keypair();

        let auth_bytes = encode_auth_message(&signer, local_nonce, &remote_node_id, &local_ephemeral)?;
        send_handshake_msg(&mut stream, &auth_bytes).await?;
        let ack_bytes = receive_handshake_msg(&mut stream).await?;
        let ack = decode_ack_message(&signer, &ack_bytes[2..], &ack_bytes[..2])?;
        let remote_ephemeral_pubkey = ack.ephemeral_pubkey()?;

        let secrets = FrameSecrets::derive(
            &local_ephemeral,
            &remote_ephemeral_pubkey,
            local_nonce,
            ack.nonce,
            true,
            &auth_bytes,
            &ack_bytes,
        )?;

        Self::finish_handshake(stream, FrameCipher::new(secrets), signer, capabilities).await
    }

    /// Accepts an already-connected socket and runs the receiver side of
    /// the handshake (the peer is whoever dialed us; its node id is learned
    /// from the Auth message itself).
    pub async fn accept(
        mut stream: TcpStream,
        signer: SecretKey,
        capabilities: Vec<Capability>,
    ) -> Result<Self, RLPxError> {
        let local_nonce = H256::random();
        let local_ephemeral = generate_ephemeral_keypair();

        let auth_bytes = receive_handshake_msg(&mut stream).await?;
        let (auth, remote_ephemeral_pubkey) = decode_auth_message(&signer, &auth_bytes[2..], &auth_bytes[..2])?;
        let remote_static_pubkey =
            id2pubkey(auth.node_id).map_err(|_| RLPxError::HandshakeFailed("invalid peer node id".into()))?;

        let ack_bytes = encode_ack_message(&local_ephemeral, local_nonce, &remote_static_pubkey)?;
        send_handshake_msg(&mut stream, &ack_bytes).await?;

        let secrets = FrameSecrets::derive(
            &local_ephemeral,
            &remote_ephemeral_pubkey,
            local_nonce,
            auth.nonce,
            false,
            &ack_bytes,
            &auth_bytes,
        )?;

        Self::finish_handshake(stream, FrameCipher::new(secrets), signer, capabilities).await
    }

    async fn finish_handshake(
        stream: TcpStream,
        cipher: FrameCipher,
        signer: SecretKey,
        capabilities: Vec<Capability>,
    ) -> Result<Self, RLPxError> {
        let (mut read_half, mut write_half) = split(stream);
        let (mut writer, mut reader) = cipher.split();

        let hello = Message::Hello(HelloMessage::new(capabilities.clone(), signer.public_key()));
        let mut hello_buf = Vec::new();
        hello.encode(&mut hello_buf)?;
        writer.write(hello_buf, &mut write_half).await?;

        let frame_data = reader.read(&mut read_half).await?;
        let (msg_id, msg_data): (u8, _) = RLPDecode::decode_unfinished(&frame_data)?;
        let remote_hello = match Message::decode(msg_id, msg_data)? {
            Message::Hello(hello) => hello,
            _ => return Err(RLPxError::HandshakeFailed("expected Hello message".into())),
        };

        let shared: Vec<Capability> = capabilities
            .iter()
            .filter(|local| remote_hello.capabilities.iter().any(|remote| remote.name == local.name))
            .cloned()
            .collect();
        if shared.is_empty() {
            let mut buf = Vec::new();
            let _ = Message::Disconnect(DisconnectMessage::new(DisconnectReason::UselessPeer)).encode(&mut buf);
            let _ = writer.write(buf, &mut write_half).await;
            return Err(RLPxError::HandshakeFailed("no shared capabilities".into()));
        }

        let peer_info = PeerInfo {
            node_id: remote_hello.node_id,
            capabilities: remote_hello.capabilities,
        };

        let state = Arc::new(Mutex::new(SessionState::Active));
        let peer_info = Arc::new(Mutex::new(Some(peer_info)));
        let (outbound_tx, outbound_rx) = mpsc::channel(256);
        let (inbound_tx, inbound_rx) = mpsc::channel(256);

        let driver = tokio::spawn(run_driver(
            writer,
            write_half,
            reader,
            read_half,
            outbound_rx,
            inbound_tx,
            state.clone(),
        ));

        Ok(Self {
            state,
            peer_info,
            outbound_tx,
            inbound_rx: Arc::new(Mutex::new(inbound_rx)),
            driver: Arc::new(driver),
        })
    }

    /// Queues `message` for the background driver to send. Returns
    /// [`RLPxError::NotConnected`] once the session is no longer active.
    pub async fn post_message(&self, message: Message) -> Result<(), RLPxError> {
        if *self.state.lock().await != SessionState::Active {
            return Err(RLPxError::NotConnected);
        }
        self.outbound_tx.send(message).await.map_err(|_| RLPxError::NotConnected)
    }

    /// Waits for the next capability-level message. Base protocol messages
    /// (Ping, Pong, Hello, Disconnect) are handled by the driver and never
    /// reach this queue.
    pub async fn receive_message(&self) -> Result<Message, RLPxError> {
        self.inbound_rx.lock().await.recv().await.ok_or(RLPxError::NotConnected)
    }

    /// Sends a Disconnect with `reason`. The driver notices the outbound
    /// Disconnect, flushes it, and tears the session down afterward.
    pub async fn disconnect(&self, reason: DisconnectReason) -> Result<(), RLPxError> {
        *self.state.lock().await = SessionState::Disconnecting;
        let _ = self.outbound_tx.send(Message::Disconnect(DisconnectMessage::new(reason))).await;
        Ok(())
    }

    pub async fn state(&self) -> SessionState {
        *self.state.lock().await
    }

    pub async fn is_active(&self) -> bool {
        *self.state.lock().await == SessionState::Active
    }

    pub async fn peer_info(&self) -> Option<PeerInfo> {
        self.peer_info.lock().await.clone()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if Arc::strong_count(&self.driver) == 1 {
            self.driver.abort();
        }
    }
}

async fn send_handshake_msg(stream: &mut TcpStream, msg: &[u8]) -> Result<(), RLPxError> {
    stream.write_all(msg).await.map_err(RLPxError::NetworkFailure)
}

async fn receive_handshake_msg(stream: &mut TcpStream) -> Result<Vec<u8>, RLPxError> {
    use tokio::io::AsyncReadExt;
    let mut size_buf = [0u8; 2];
    stream.read_exact(&mut size_buf).await.map_err(RLPxError::NetworkFailure)?;
    let msg_size = u16::from_be_bytes(size_buf) as usize;
    let mut payload = vec![0u8; msg_size];
    stream.read_exact(&mut payload).await.map_err(RLPxError::NetworkFailure)?;

    let mut full = Vec::with_capacity(2 + msg_size);
    full.extend_from_slice(&size_buf);
    full.extend_from_slice(&payload);
    Ok(full)
}

/// Owns the session's I/O after the handshake completes: multiplexes
/// outbound user messages onto the wire, and dispatches inbound base
/// protocol messages (Ping auto-answered with Pong, Pong dropped,
/// Disconnect and a post-handshake Hello both end the session) before
/// forwarding everything else to the caller's inbound queue.
async fn run_driver(
    mut writer: FrameWriter,
    mut write_half: WriteHalf<TcpStream>,
    mut reader: FrameReader,
    mut read_half: ReadHalf<TcpStream>,
    mut outbound_rx: mpsc::Receiver<Message>,
    inbound_tx: mpsc::Sender<Message>,
    state: Arc<Mutex<SessionState>>,
) {
    loop {
        tokio::select! {
            frame = reader.read(&mut read_half) => {
                let frame_data = match frame {
                    Ok(data) => data,
                    Err(e) => {
                        warn!("frame read failed: {e}");
                        *state.lock().await = SessionState::Error;
                        break;
                    }
                };
                let decoded: Result<(u8, &[u8]), _> = RLPDecode::decode_unfinished(&frame_data);
                let (msg_id, msg_data) = match decoded {
                    Ok(v) => v,
                    Err(e) => {
                        warn!("malformed frame: {e}");
                        *state.lock().await = SessionState::Error;
                        break;
                    }
                };
                match Message::decode(msg_id, msg_data) {
                    Ok(Message::Ping(_)) => {
                        let mut buf = Vec::new();
                        if Message::Pong(PongMessage).encode(&mut buf).is_ok() {
                            let _ = writer.write(buf, &mut write_half).await;
                        }
                    }
                    Ok(Message::Pong(_)) => {}
                    Ok(Message::Disconnect(msg)) => {
                        debug!("peer sent Disconnect: {:?}", msg.reason);
                        *state.lock().await = SessionState::Closed;
                        break;
                    }
                    Ok(Message::Hello(_)) => {
                        warn!("received Hello after the session was already active");
                        let mut buf = Vec::new();
                        let _ = Message::Disconnect(DisconnectMessage::new(DisconnectReason::ProtocolError)).encode(&mut buf);
                        let _ = writer.write(buf, &mut write_half).await;
                        *state.lock().await = SessionState::Closed;
                        break;
                    }
                    Ok(other) => {
                        if inbound_tx.send(other).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("undecodable message: {e}");
                        *state.lock().await = SessionState::Error;
                        break;
                    }
                }
            }
            maybe_msg = outbound_rx.recv() => {
                let Some(msg) = maybe_msg else { break };
                let is_disconnect = matches!(msg, Message::Disconnect(_));
                let mut buf = Vec::new();
                if let Err(e) = msg.encode(&mut buf) {
                    warn!("failed to encode outgoing message: {e}");
                    continue;
                }
                if writer.write(buf, &mut write_half).await.is_err() {
                    *state.lock().await = SessionState::Error;
                    break;
                }
                if is_disconnect {
                    *state.lock().await = SessionState::Closed;
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eth::blocks::{GetBlockHeaders, HashOrNumber};
    use tokio::net::TcpListener;

    async fn connected_pair(caps: Vec<Capability>) -> (Session, Session) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client_key = SecretKey::random(&mut rand::thread_rng());
        let server_key = SecretKey::random(&mut rand::thread_rng());
        let server_pubkey = server_key.public_key();

        let client_fut = Session::connect(addr, client_key, server_pubkey, caps.clone());
        let server_fut = async {
            let (stream, _) = listener.accept().await.unwrap();
            Session::accept(stream, server_key, caps).await
        };

        let (client, server) = tokio::join!(client_fut, server_fut);
        (client.unwrap(), server.unwrap())
    }

    #[tokio::test]
    async fn handshake_and_hello_exchange_establish_an_active_session() {
        let (client, server) = connected_pair(vec![Capability::eth(68)]).await;

        assert!(client.is_active().await);
        assert!(server.is_active().await);

        let client_peer = client.peer_info().await.unwrap();
        assert_eq!(client_peer.capabilities, vec![Capability::eth(68)]);
    }

    #[tokio::test]
    async fn post_message_delivers_capability_messages_to_the_peer() {
        let (client, server) = connected_pair(vec![Capability::eth(68)]).await;

        let request = GetBlockHeaders::new(1, HashOrNumber::Number(1), 1, 0, false);
        client.post_message(Message::GetBlockHeaders(request)).await.unwrap();

        let received = server.receive_message().await.unwrap();
        assert!(matches!(received, Message::GetBlockHeaders(_)));
    }

    #[tokio::test]
    async fn disconnect_closes_the_session_on_both_sides() {
        let (client, server) = connected_pair(vec![Capability::eth(68)]).await;

        client.disconnect(DisconnectReason::Requested).await.unwrap();
        let _ = server.receive_message().await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(server.state().await, SessionState::Closed);
    }
}
