//! The RLPx auth handshake (EIP-8): a two-message exchange that agrees on an
//! ephemeral key pair and authenticates both peers' static identities,
//! producing the frame secrets the session uses from then on.

use ethereum_types::{H256, H512};
use ethwire_rlp::{
    decode::RLPDecode,
    encode::{encode, RLPEncode},
    error::RLPDecodeError,
    structs::{Decoder, Encoder},
};
use k256::{PublicKey, SecretKey};
use sha3::{Digest, Keccak256};

use crate::{
    crypto::{ecdh_xchng, ecies_decrypt, ecies_encrypt, id2pubkey, pubkey2id, recover_ephemeral_key, sign_shared_secret},
    error::{AuthError, RLPxError},
};

const RLPX_VERSION: u8 = 5;

#[derive(Debug)]
pub struct AuthMessage {
    pub signature: [u8; 65],
    pub node_id: H512,
    pub nonce: H256,
    pub version: u8,
}

impl AuthMessage {
    fn new(signature: [u8; 65], node_id: H512, nonce: H256) -> Self {
        Self {
            signature,
            node_id,
            nonce,
            version: RLPX_VERSION,
        }
    }
}

impl RLPEncode for AuthMessage {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        Encoder::new(buf)
            .encode_field(&self.signature)
            .encode_field(&self.node_id)
            .encode_field(&self.nonce)
            .encode_field(&self.version)
            .finish()
    }
}

impl RLPDecode for AuthMessage {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (decoder, remainder) = Decoder::new(rlp)?;
        let (signature, decoder) = decoder.decode_field("signature")?;
        let (node_id, decoder) = decoder.decode_field("node_id")?;
        let (nonce, decoder) = decoder.decode_field("nonce")?;
        let (version, decoder) = decoder.decode_field("version")?;
        decoder.finish_unchecked();

        Ok((
            AuthMessage {
                signature,
                node_id,
                nonce,
                version,
            },
            remainder,
        ))
    }
}

#[derive(Debug, Clone)]
pub struct AckMessage {
    pub ephemeral_pubkey: H512,
    pub nonce: H256,
    pub version: u8,
}

impl AckMessage {
    fn new(ephemeral_pubkey: H512, nonce: H256) -> Self {
        Self {
            ephemeral_pubkey,
            nonce,
            version: RLPX_VERSION,
        }
    }

    pub fn ephemeral_pubkey(&self) -> Result<PublicKey, AuthError> {
        id2pubkey(self.ephemeral_pubkey).map_err(|_| AuthError::InvalidPublicKey)
    }
}

impl RLPEncode for AckMessage {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        Encoder::new(buf)
            .encode_field(&self.ephemeral_pubkey)
            .encode_field(&self.nonce)
            .encode_field(&self.version)
            .finish()
    }
}

impl RLPDecode for AckMessage {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (decoder, remainder) = Decoder::new(rlp)?;
        let (ephemeral_pubkey, decoder) = decoder.decode_field("ephemeral_pubkey")?;
        let (nonce, decoder) = decoder.decode_field("nonce")?;
        let (version, decoder) = decoder.decode_field("version")?;
        decoder.finish_unchecked();
        Ok((
            AckMessage {
                ephemeral_pubkey,
                nonce,
                version,
            },
            remainder,
        ))
    }
}

/// Builds and ECIES-encrypts an Auth message for the initiator side of the
/// handshake.
pub fn encode_auth_message(
    static_key: &SecretKey,
    local_nonce: H256,
    remote_static_pubkey: &PublicKey,
    local_ephemeral_key: &SecretKey,
) -> Result<Vec<u8>, RLPxError> {
    let node_id = pubkey2id(&static_key.public_key());
    let static_shared_secret = ecdh_xchng(static_key, remote_static_pubkey)?;
    let signature = sign_shared_secret(static_shared_secret.into(), local_nonce, local_ephemeral_key)?;

    let auth = AuthMessage::new(signature, node_id, local_nonce);
    let encoded = encode(&auth);
    Ok(ecies_encrypt(remote_static_pubkey, encoded)?)
}

/// Decrypts and decodes an incoming Auth message, recovering the remote
/// peer's ephemeral public key along the way.
pub fn decode_auth_message(
    static_key: &SecretKey,
    msg: &[u8],
    auth_data: &[u8],
) -> Result<(AuthMessage, PublicKey), RLPxError> {
    let payload = ecies_decrypt(static_key, msg, auth_data)?;
    let (auth, _padding) = AuthMessage::decode_unfinished(&payload)?;

    let peer_pk = id2pubkey(auth.node_id).map_err(|_| AuthError::InvalidPublicKey)?;
    let static_shared_secret = ecdh_xchng(static_key, &peer_pk)?;
    let remote_ephemeral_key =
        recover_ephemeral_key(static_shared_secret.into(), auth.nonce, &auth.signature)
            .map_err(|_| AuthError::SignatureInvalid)?;
    Ok((auth, remote_ephemeral_key))
}

/// Builds and ECIES-encrypts an Ack message for the receiver side of the
/// handshake.
pub fn encode_ack_message(
    local_ephemeral_key: &SecretKey,
    local_nonce: H256,
    remote_static_pubkey: &PublicKey,
) -> Result<Vec<u8>, RLPxError> {
    let ack = AckMessage::new(pubkey2id(&local_ephemeral_key.public_key()), local_nonce);
    let encoded = encode(&ack);
    Ok(ecies_encrypt(remote_static_pubkey, encoded)?)
}

/// Decrypts and decodes an incoming Ack message.
pub fn decode_ack_message(
    static_key: &SecretKey,
    msg: &[u8],
    auth_data: &[u8],
) -> Result<AckMessage, RLPxError> {
    let payload = ecies_decrypt(static_key, msg, auth_data)?;
    let (ack, _padding) = AckMessage::decode_unfinished(&payload)?;
    Ok(ack)
}

/// The four secrets the frame cipher derives from a completed handshake.
/// `init_message`/`remote_init_message` are the raw (still-encrypted) auth
/// and ack bytes exchanged over the wire, folded into the MAC seeds so a
/// tampered handshake desyncs the very first frame.
pub struct FrameSecrets {
    pub aes_key: H256,
    pub mac_key: H256,
    pub egress_mac: Keccak256,
    pub ingress_mac: Keccak256,
}

impl FrameSecrets {
    #[allow(clippy::too_many_arguments)]
    pub fn derive(
        local_ephemeral_key: &SecretKey,
        remote_ephemeral_key: &PublicKey,
        local_nonce: H256,
        remote_nonce: H256,
        local_is_initiator: bool,
        local_init_message: &[u8],
        remote_init_message: &[u8],
    ) -> Result<Self, RLPxError> {
        let ephemeral_secret = ecdh_xchng(local_ephemeral_key, remote_ephemeral_key)?;

        let hashed_nonces: [u8; 32] = if local_is_initiator {
            Keccak256::digest([remote_nonce.as_bytes(), local_nonce.as_bytes()].concat()).into()
        } else {
            Keccak256::digest([local_nonce.as_bytes(), remote_nonce.as_bytes()].concat()).into()
        };

        let shared_secret: [u8; 32] =
            Keccak256::digest([ephemeral_secret.as_slice(), &hashed_nonces].concat()).into();
        let aes_key = H256::from(
            <[u8; 32]>::from(Keccak256::digest(
                [ephemeral_secret.as_slice(), &shared_secret].concat(),
            )),
        );
        let mac_key = H256::from(
            <[u8; 32]>::from(Keccak256::digest(
                [ephemeral_secret.as_slice(), aes_key.as_bytes()].concat(),
            )),
        );

        let egress_mac = Keccak256::new()
            .chain_update((mac_key ^ remote_nonce).as_bytes())
            .chain_update(local_init_message);
        let ingress_mac = Keccak256::new()
            .chain_update((mac_key ^ local_nonce).as_bytes())
            .chain_update(remote_init_message);

        Ok(Self {
            aes_key,
            mac_key,
            egress_mac,
            ingress_mac,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use k256::elliptic_curve::sec1::ToEncodedPoint;
    use std::str::FromStr;

    #[test]
    fn ack_message_decodes_eip8_vector() {
        // Ack2 from the EIP-8 test vectors.
        let msg = hex!("01ea0451958701280a56482929d3b0757da8f7fbe5286784beead59d95089c217c9b917788989470b0e330cc6e4fb383c0340ed85fab836ec9fb8a49672712aeabbdfd1e837c1ff4cace34311cd7f4de05d59279e3524ab26ef753a0095637ac88f2b499b9914b5f64e143eae548a1066e14cd2f4bd7f814c4652f11b254f8a2d0191e2f5546fae6055694aed14d906df79ad3b407d94692694e259191cde171ad542fc588fa2b7333313d82a9f887332f1dfc36cea03f831cb9a23fea05b33deb999e85489e645f6aab1872475d488d7bd6c7c120caf28dbfc5d6833888155ed69d34dbdc39c1f299be1057810f34fbe754d021bfca14dc989753d61c413d261934e1a9c67ee060a25eefb54e81a4d14baff922180c395d3f998d70f46f6b58306f969627ae364497e73fc27f6d17ae45a413d322cb8814276be6ddd13b885b201b943213656cde498fa0e9ddc8e0b8f8a53824fbd82254f3e2c17e8eaea009c38b4aa0a3f306e8797db43c25d68e86f262e564086f59a2fc60511c42abfb3057c247a8a8fe4fb3ccbadde17514b7ac8000cdb6a912778426260c47f38919a91f25f4b5ffb455d6aaaf150f7e5529c100ce62d6d92826a71778d809bdf60232ae21ce8a437eca8223f45ac37f6487452ce626f549b3b5fdee26afd2072e4bc75833c2464c805246155289f4");
        let static_key_a = SecretKey::from_slice(&hex!(
            "49a7b37aa6f6645917e7b807e9d1c00d4fa71f18343b0d4122a4d2df64dd6fee"
        )[..32])
        .unwrap();

        let expected_nonce_b =
            H256::from_str("559aead08264d5795d3909718cdd05abd49572e84fe55590eef31a88a08fdffd").unwrap();

        let ack = decode_ack_message(&static_key_a, &msg[2..], &msg[..2]).unwrap();
        assert_eq!(ack.version, 4u8);
        assert_eq!(ack.nonce, expected_nonce_b);
    }

    #[test]
    fn auth_message_roundtrip() {
        let static_key = SecretKey::random(&mut rand::thread_rng());
        let remote_static_key = SecretKey::random(&mut rand::thread_rng());
        let ephemeral_key = SecretKey::random(&mut rand::thread_rng());
        let nonce = H256::random();

        let auth_bytes = encode_auth_message(
            &static_key,
            nonce,
            &remote_static_key.public_key(),
            &ephemeral_key,
        )
        .unwrap();

        let size = (auth_bytes.len() - 2) as u16;
        assert_eq!(size.to_be_bytes(), auth_bytes[..2]);

        let (auth, remote_ephemeral) =
            decode_auth_message(&remote_static_key, &auth_bytes[2..], &auth_bytes[..2]).unwrap();

        assert_eq!(auth.node_id, pubkey2id(&static_key.public_key()));
        assert_eq!(
            remote_ephemeral.to_encoded_point(false),
            ephemeral_key.public_key().to_encoded_point(false)
        );
    }

    #[test]
    fn ack_message_roundtrip() {
        let ephemeral_key = SecretKey::random(&mut rand::thread_rng());
        let remote_static_key = SecretKey::random(&mut rand::thread_rng());
        let nonce = H256::random();

        let ack_bytes =
            encode_ack_message(&ephemeral_key, nonce, &remote_static_key.public_key()).unwrap();
        let ack = decode_ack_message(&remote_static_key, &ack_bytes[2..], &ack_bytes[..2]).unwrap();

        assert_eq!(ack.nonce, nonce);
        assert_eq!(
            ack.ephemeral_pubkey().unwrap().to_encoded_point(false),
            ephemeral_key.public_key().to_encoded_point(false)
        );
    }
}
