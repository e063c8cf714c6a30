//! The RLPx frame cipher (C6): wraps every post-handshake message in an
//! AES-256-CTR-encrypted frame guarded by a rolling Keccak256 MAC, per the
//! devp2p RLPx framing spec. Both directions share one AES key but keep
//! independent rolling MAC states, since the MAC folds in everything sent
//! or received on that side.

use aes::{
    cipher::{BlockEncrypt, KeyInit, StreamCipher},
    Aes256Enc,
};
use ethereum_types::H128;
use ethwire_rlp::encode::{encode, RLPEncode};
use sha3::{Digest, Keccak256};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{crypto::Aes256Ctr64BE, error::FramingError, handshake::FrameSecrets};

/// Frames larger than this are rejected outright; devp2p peers never send
/// anything close to this in practice, it exists to bound an attacker's
/// ability to make us allocate an unbounded buffer from a forged header.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Holds the cipher and MAC state for one established RLPx session. Built
/// once from [`FrameSecrets`] and then mutated in place by every
/// `write`/`read` call, since both the AES keystream position and the MAC
/// digests are rolling state.
pub struct FrameCipher {
    writer: FrameWriter,
    reader: FrameReader,
}

impl FrameCipher {
    pub fn new(secrets: FrameSecrets) -> Self {
        use aes::cipher::KeyIvInit;
        let egress_aes = Aes256Ctr64BE::new(&secrets.aes_key.0.into(), &[0u8; 16].into());
        let ingress_aes = egress_aes.clone();
        Self {
            writer: FrameWriter {
                mac_key: secrets.mac_key,
                egress_mac: secrets.egress_mac,
                egress_aes,
            },
            reader: FrameReader {
                mac_key: secrets.mac_key,
                ingress_mac: secrets.ingress_mac,
                ingress_aes,
            },
        }
    }

    /// Splits the cipher into independent write/read halves so a session
    /// can drive them from separate tasks without contending for one
    /// `&mut self`. Egress and ingress state never interact, so this is
    /// always safe.
    pub fn split(self) -> (FrameWriter, FrameReader) {
        (self.writer, self.reader)
    }

    pub async fn write<S: AsyncWrite + Unpin>(
        &mut self,
        frame_data: Vec<u8>,
        stream: &mut S,
    ) -> Result<(), FramingError> {
        self.writer.write(frame_data, stream).await
    }

    pub async fn read<S: AsyncRead + Unpin>(&mut self, stream: &mut S) -> Result<Vec<u8>, FramingError> {
        self.reader.read(stream).await
    }
}

/// The egress half of an established session: encrypts and MACs outgoing
/// frames. Independent of [`FrameReader`] since the two directions keep
/// separate rolling MAC state.
pub struct FrameWriter {
    mac_key: ethereum_types::H256,
    egress_mac: Keccak256,
    egress_aes: Aes256Ctr64BE,
}

impl FrameWriter {
    /// Encrypts and writes `frame_data` (a complete, already RLP-encoded
    /// message) as one RLPx frame: a 16-byte header (3-byte size + 2-byte
    /// zero capability/context-id tuple, padded) plus its MAC, then the
    /// encrypted body (exactly `frame_data.len()` bytes, unpadded — CTR
    /// mode has no block-alignment requirement) plus its MAC.
    pub async fn write<S: AsyncWrite + Unpin>(
        &mut self,
        mut frame_data: Vec<u8>,
        stream: &mut S,
    ) -> Result<(), FramingError> {
        if frame_data.is_empty() || frame_data.len() > MAX_FRAME_SIZE {
            return Err(FramingError::InvalidFrameSize);
        }
        let mac_aes = Aes256Enc::new_from_slice(self.mac_key.as_bytes()).map_err(|_| FramingError::InvalidHeader)?;

        let mut header = Vec::with_capacity(32);
        let frame_size = frame_data.len().to_be_bytes();
        header.extend_from_slice(&frame_size[5..8]);
        (0u8, 0u8).encode(&mut header);
        header.resize(16, 0);
        self.egress_aes.apply_keystream(&mut header[..16]);

        let header_mac_seed = mac_seed(&mac_aes, &self.egress_mac, &header[..16]);
        self.egress_mac.update(header_mac_seed);
        let header_mac = mac_digest(&self.egress_mac);
        header.extend_from_slice(&header_mac);

        stream.write_all(&header).await.map_err(|_| FramingError::InvalidHeader)?;

        self.egress_aes.apply_keystream(&mut frame_data);
        stream.write_all(&frame_data).await.map_err(|_| FramingError::InvalidHeader)?;

        self.egress_mac.update(&frame_data);
        let frame_mac_seed = mac_seed(&mac_aes, &self.egress_mac, &mac_digest(&self.egress_mac));
        self.egress_mac.update(frame_mac_seed);
        let frame_mac = mac_digest(&self.egress_mac);
        stream.write_all(&frame_mac).await.map_err(|_| FramingError::InvalidHeader)?;

        Ok(())
    }
}

/// The ingress half of an established session: decrypts and verifies
/// incoming frames.
pub struct FrameReader {
    mac_key: ethereum_types::H256,
    ingress_mac: Keccak256,
    ingress_aes: Aes256Ctr64BE,
}

impl FrameReader {
    /// Reads and decrypts one RLPx frame, returning its decrypted,
    /// unpadded body.
    pub async fn read<S: AsyncRead + Unpin>(&mut self, stream: &mut S) -> Result<Vec<u8>, FramingError> {
        let mac_aes = Aes256Enc::new_from_slice(self.mac_key.as_bytes()).map_err(|_| FramingError::InvalidHeader)?;

        let mut frame_header = [0u8; 32];
        stream
            .read_exact(&mut frame_header)
            .await
            .map_err(|_| FramingError::InvalidHeader)?;
        let (header_ciphertext, header_mac) = frame_header.split_at_mut(16);

        let header_mac_seed = mac_seed(&mac_aes, &self.ingress_mac, header_ciphertext);
        self.ingress_mac.update(header_mac_seed);
        let expected_header_mac = mac_digest(&self.ingress_mac);
        if header_mac != expected_header_mac {
            return Err(FramingError::MacMismatch);
        }

        self.ingress_aes.apply_keystream(header_ciphertext);
        let header_text = header_ciphertext;
        if header_text[3..6] != encode(&(0u8, 0u8))[..] {
            return Err(FramingError::InvalidHeader);
        }

        let frame_size =
            u32::from_be_bytes([0, header_text[0], header_text[1], header_text[2]]) as usize;
        if frame_size == 0 || frame_size > MAX_FRAME_SIZE {
            return Err(FramingError::InvalidFrameSize);
        }

        let mut frame_data = vec![0u8; frame_size + 16];
        stream
            .read_exact(&mut frame_data)
            .await
            .map_err(|_| FramingError::BufferTooSmall)?;
        let (frame_ciphertext, frame_mac) = frame_data.split_at_mut(frame_size);

        self.ingress_mac.update(&frame_ciphertext[..]);
        let frame_mac_seed = mac_seed(&mac_aes, &self.ingress_mac, &mac_digest(&self.ingress_mac));
        self.ingress_mac.update(frame_mac_seed);
        let expected_frame_mac = mac_digest(&self.ingress_mac);
        if frame_mac != expected_frame_mac {
            return Err(FramingError::MacMismatch);
        }

        self.ingress_aes.apply_keystream(frame_ciphertext);
        Ok(frame_ciphertext.to_vec())
    }
}

/// `aes(mac-secret, keccak256.digest(mac-state)[:16]) ^ data`, the seed
/// folded into the rolling MAC before each digest it produces is trusted.
fn mac_seed(mac_aes: &Aes256Enc, mac_state: &Keccak256, data: &[u8]) -> [u8; 16] {
    let digest = mac_digest(mac_state);
    let mut block = digest.into();
    mac_aes.encrypt_block(&mut block);
    (H128(block.into()) ^ H128(data.try_into().expect("16-byte input"))).0
}

fn mac_digest(mac_state: &Keccak256) -> [u8; 16] {
    mac_state.clone().finalize()[..16].try_into().expect("keccak256 digest is 32 bytes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethereum_types::H256;
    use k256::SecretKey;

    fn paired_ciphers() -> (FrameCipher, FrameCipher) {
        let local_ephemeral = SecretKey::random(&mut rand::thread_rng());
        let remote_ephemeral = SecretKey::random(&mut rand::thread_rng());
        let local_nonce = H256::random();
        let remote_nonce = H256::random();
        let local_init = b"local-init".to_vec();
        let remote_init = b"remote-init".to_vec();

        let initiator_secrets = FrameSecrets::derive(
            &local_ephemeral,
            &remote_ephemeral.public_key(),
            local_nonce,
            remote_nonce,
            true,
            &local_init,
            &remote_init,
        )
        .unwrap();
        let receiver_secrets = FrameSecrets::derive(
            &remote_ephemeral,
            &local_ephemeral.public_key(),
            remote_nonce,
            local_nonce,
            false,
            &remote_init,
            &local_init,
        )
        .unwrap();

        (FrameCipher::new(initiator_secrets), FrameCipher::new(receiver_secrets))
    }

    #[tokio::test]
    async fn frame_roundtrips_through_an_in_memory_pipe() {
        let (mut initiator, mut receiver) = paired_ciphers();
        let (mut client, mut server) = tokio::io::duplex(4096);

        let payload = b"hello rlpx frame".to_vec();
        initiator.write(payload.clone(), &mut client).await.unwrap();
        let received = receiver.read(&mut server).await.unwrap();
        assert_eq!(received, payload);
    }

    fn known_secrets(egress_seed: [u8; 32], ingress_seed: [u8; 32]) -> FrameSecrets {
        FrameSecrets {
            aes_key: H256::from([0x42; 32]),
            mac_key: H256::from([0x55; 32]),
            egress_mac: Keccak256::new().chain_update(egress_seed),
            ingress_mac: Keccak256::new().chain_update(ingress_seed),
        }
    }

    #[tokio::test]
    async fn known_vector_frame_is_53_bytes_and_swapped_seeds_decrypt() {
        let egress_seed = [0xaa; 32];
        let ingress_seed = [0xbb; 32];

        let mut initiator = FrameCipher::new(known_secrets(egress_seed, ingress_seed));
        // The peer's egress is our ingress and vice versa.
        let mut receiver = FrameCipher::new(known_secrets(ingress_seed, egress_seed));

        let (mut client, mut server) = tokio::io::duplex(4096);
        let payload = vec![0x48, 0x65, 0x6c, 0x6c, 0x6f];
        initiator.write(payload.clone(), &mut client).await.unwrap();
        drop(client);

        let mut raw = Vec::new();
        server.read_to_end(&mut raw).await.unwrap();
        assert_eq!(raw.len(), 16 + 16 + 5 + 16);

        let (mut client2, mut server2) = tokio::io::duplex(4096);
        client2.write_all(&raw).await.unwrap();
        drop(client2);
        let received = receiver.read(&mut server2).await.unwrap();
        assert_eq!(received, payload);
    }

    #[tokio::test]
    async fn known_vector_mac_region_tamper_is_detected() {
        let egress_seed = [0xaa; 32];
        let ingress_seed = [0xbb; 32];

        for tamper_index in [16usize, 36, 48] {
            let mut initiator = FrameCipher::new(known_secrets(egress_seed, ingress_seed));
            let mut receiver = FrameCipher::new(known_secrets(ingress_seed, egress_seed));

            let (mut client, mut server) = tokio::io::duplex(4096);
            initiator
                .write(vec![0x48, 0x65, 0x6c, 0x6c, 0x6f], &mut client)
                .await
                .unwrap();
            drop(client);
            let mut raw = Vec::new();
            server.read_to_end(&mut raw).await.unwrap();
            raw[tamper_index] ^= 0xff;

            let (mut client2, mut server2) = tokio::io::duplex(4096);
            client2.write_all(&raw).await.unwrap();
            drop(client2);
            let result = receiver.read(&mut server2).await;
            assert!(matches!(result, Err(FramingError::MacMismatch)));
        }
    }

    #[tokio::test]
    async fn tampered_frame_fails_mac_check() {
        let (mut initiator, mut receiver) = paired_ciphers();
        let (mut client, mut server) = tokio::io::duplex(4096);

        initiator.write(b"message one".to_vec(), &mut client).await.unwrap();
        drop(client);
        let mut raw = Vec::new();
        server.read_to_end(&mut raw).await.unwrap();
        raw[20] ^= 0xff;

        let (mut client2, mut server2) = tokio::io::duplex(4096);
        client2.write_all(&raw).await.unwrap();
        drop(client2);

        let result = receiver.read(&mut server2).await;
        assert!(matches!(result, Err(FramingError::MacMismatch)));
    }
}
