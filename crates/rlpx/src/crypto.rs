//! Low-level cryptographic primitives shared by the auth handshake and the
//! frame cipher: ECDH key agreement, the concat-KDF used to derive AES/MAC
//! keys, HMAC-SHA256, the ECIES envelope used to wrap handshake messages,
//! and the AES-CTR stream ciphers used everywhere else.

use aes::cipher::{KeyIvInit, StreamCipher};
use ethereum_types::{H256, H512};
use hmac::Mac;
use k256::{
    ecdh::diffie_hellman,
    ecdsa::{self, RecoveryId, SigningKey, VerifyingKey},
    elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint},
    sha2::{Digest as _, Sha256},
    EncodedPoint, PublicKey, SecretKey,
};
use rand::Rng;

use crate::error::CryptoError;

pub type Aes128Ctr64BE = ctr::Ctr64BE<aes::Aes128>;
pub type Aes256Ctr64BE = ctr::Ctr64BE<aes::Aes256>;

/// ECIES envelope overhead: a 65-byte uncompressed pubkey, a 16-byte IV and
/// a 32-byte MAC footer wrap every encrypted handshake message.
const ECIES_OVERHEAD: usize = 65 + 16 + 32;

pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

pub fn sha256_hmac(key: &[u8], inputs: &[&[u8]], auth_data: &[u8]) -> Result<[u8; 32], CryptoError> {
    let mut hasher = hmac::Hmac::<Sha256>::new_from_slice(key).map_err(|_| CryptoError::Hmac)?;
    for input in inputs {
        hasher.update(input);
    }
    hasher.update(auth_data);
    Ok(hasher.finalize().into_bytes().into())
}

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    use sha3::Digest;
    sha3::Keccak256::digest(data).into()
}

/// Diffie-Hellman key agreement over secp256k1, truncated to the first 32
/// bytes of the shared point's x-coordinate.
pub fn ecdh_xchng(secret_key: &SecretKey, public_key: &PublicKey) -> Result<[u8; 32], CryptoError> {
    diffie_hellman(secret_key.to_nonzero_scalar(), public_key.as_affine())
        .raw_secret_bytes()[..32]
        .try_into()
        .map_err(|_| CryptoError::Ecdh)
}

/// NIST SP 800-56C concat-KDF over SHA-256, with an empty `other_info`.
pub fn kdf(secret: &[u8], output: &mut [u8]) -> Result<(), CryptoError> {
    concat_kdf::derive_key_into::<Sha256>(secret, &[], output).map_err(|_| CryptoError::Kdf)
}

/// Derives a node id (the uncompressed public key with the leading `0x04`
/// tag byte stripped) from a public key.
pub fn pubkey2id(pk: &PublicKey) -> H512 {
    let encoded = pk.to_encoded_point(false);
    H512::from_slice(&encoded.as_bytes()[1..])
}

/// Recovers a public key from a node id.
pub fn id2pubkey(id: H512) -> Result<PublicKey, CryptoError> {
    let point = EncodedPoint::from_untagged_bytes(id.as_fixed_bytes().into());
    Option::from(PublicKey::from_encoded_point(&point)).ok_or(CryptoError::InvalidPublicKey)
}

pub fn generate_ephemeral_keypair() -> SecretKey {
    SecretKey::random(&mut rand::thread_rng())
}

/// Recoverable ECDSA signature over `shared_secret ^ nonce`, used to prove
/// possession of both the static and ephemeral private keys during the auth
/// handshake.
pub fn sign_shared_secret(
    shared_secret: H256,
    nonce: H256,
    ephemeral_key: &SecretKey,
) -> Result<[u8; 65], CryptoError> {
    let prehash = shared_secret ^ nonce;
    let (signature, rid) = SigningKey::from(ephemeral_key)
        .sign_prehash_recoverable(prehash.as_bytes())
        .map_err(|_| CryptoError::InvalidSignature)?;
    let mut out = [0u8; 65];
    out[..64].copy_from_slice(signature.to_bytes().as_slice());
    out[64] = rid.to_byte();
    Ok(out)
}

/// Recovers the signer's ephemeral public key from a signature produced by
/// [`sign_shared_secret`].
pub fn recover_ephemeral_key(
    shared_secret: H256,
    nonce: H256,
    signature: &[u8; 65],
) -> Result<PublicKey, CryptoError> {
    let prehash = shared_secret ^ nonce;
    let sig = ecdsa::Signature::from_slice(&signature[..64]).map_err(|_| CryptoError::InvalidSignature)?;
    let rid = RecoveryId::from_byte(signature[64]).ok_or(CryptoError::InvalidSignature)?;
    let verifying_key = VerifyingKey::recover_from_prehash(prehash.as_bytes(), &sig, rid)
        .map_err(|_| CryptoError::RecoveryFailed)?;
    Ok(verifying_key.into())
}

/// Encrypts `plaintext` under `recipient_pubkey` using the ECIES envelope
/// layout the RLPx auth handshake relies on: `ephemeral-pubkey(65) ||
/// iv(16) || ciphertext || mac(32)`, prefixed on the wire by a 2-byte
/// big-endian size used as the HMAC's associated data.
///
/// `plaintext` is padded with 100-300 random trailing bytes so that the
/// resulting message cannot be distinguished from a pre-EIP-8 handshake by
/// size alone.
pub fn ecies_encrypt(recipient_pubkey: &PublicKey, mut plaintext: Vec<u8>) -> Result<Vec<u8>, CryptoError> {
    let mut rng = rand::thread_rng();
    let padding_len = rng.gen_range(100..=300);
    plaintext.resize(plaintext.len() + padding_len, 0);

    let size: u16 = (plaintext.len() + ECIES_OVERHEAD)
        .try_into()
        .map_err(|_| CryptoError::InvalidKey)?;
    let size_bytes = size.to_be_bytes();

    let ephemeral_key = SecretKey::random(&mut rng);
    let shared_secret = ecdh_xchng(&ephemeral_key, recipient_pubkey)?;

    let mut secrets = [0u8; 32];
    kdf(&shared_secret, &mut secrets)?;
    let aes_key = &secrets[..16];
    let mac_key = sha256(&secrets[16..]);

    let iv: [u8; 16] = rand::random();
    let mut cipher =
        Aes128Ctr64BE::new_from_slices(aes_key, &iv).map_err(|_| CryptoError::Aes)?;
    cipher.try_apply_keystream(&mut plaintext).map_err(|_| CryptoError::Aes)?;
    let ciphertext = plaintext;

    let ephemeral_pubkey = ephemeral_key.public_key().to_encoded_point(false);
    let mac = sha256_hmac(&mac_key, &[&iv, &ciphertext], &size_bytes)?;

    Ok([&size_bytes[..], ephemeral_pubkey.as_bytes(), &iv, &ciphertext, &mac].concat())
}

/// Decrypts an ECIES envelope produced by [`ecies_encrypt`]. `msg` excludes
/// the 2-byte size prefix, which is passed separately as `size_data` since
/// it doubles as the HMAC's associated data.
pub fn ecies_decrypt(
    recipient_key: &SecretKey,
    msg: &[u8],
    size_data: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if msg.len() < ECIES_OVERHEAD {
        return Err(CryptoError::InvalidKey);
    }
    let (pubkey_bytes, rest) = msg.split_at(65);
    let (iv, rest) = rest.split_at(16);
    let (ciphertext, mac) = rest.split_at(rest.len() - 32);

    let sender_pubkey = PublicKey::from_sec1_bytes(pubkey_bytes).map_err(|_| CryptoError::InvalidPublicKey)?;
    let shared_secret = ecdh_xchng(recipient_key, &sender_pubkey)?;

    let mut secrets = [0u8; 32];
    kdf(&shared_secret, &mut secrets)?;
    let aes_key = &secrets[..16];
    let mac_key = sha256(&secrets[16..]);

    let expected_mac = sha256_hmac(&mac_key, &[iv, ciphertext], size_data)?;
    if expected_mac != mac {
        return Err(CryptoError::InvalidSignature);
    }

    let mut plaintext = ciphertext.to_vec();
    let mut cipher = Aes128Ctr64BE::new_from_slices(aes_key, iv).map_err(|_| CryptoError::Aes)?;
    cipher.try_apply_keystream(&mut plaintext).map_err(|_| CryptoError::Aes)?;
    Ok(plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn ecdh_is_symmetric() {
        let a = SecretKey::random(&mut OsRng);
        let b = SecretKey::random(&mut OsRng);
        let shared_ab = ecdh_xchng(&a, &b.public_key()).unwrap();
        let shared_ba = ecdh_xchng(&b, &a.public_key()).unwrap();
        assert_eq!(shared_ab, shared_ba);
    }

    #[test]
    fn pubkey_id_roundtrip() {
        let sk = SecretKey::random(&mut OsRng);
        let id = pubkey2id(&sk.public_key());
        assert_eq!(id2pubkey(id).unwrap().to_encoded_point(false), sk.public_key().to_encoded_point(false));
    }

    #[test]
    fn ecies_roundtrip() {
        let recipient = SecretKey::random(&mut OsRng);
        let plaintext = b"hello rlpx".to_vec();
        let encoded = ecies_encrypt(&recipient.public_key(), plaintext.clone()).unwrap();
        let size = (encoded.len() - 2) as u16;
        assert_eq!(size.to_be_bytes(), encoded[..2]);
        let decrypted = ecies_decrypt(&recipient, &encoded[2..], &encoded[..2]).unwrap();
        assert_eq!(&decrypted[..plaintext.len()], plaintext.as_slice());
    }

    #[test]
    fn shared_secret_signature_roundtrip() {
        let ephemeral = SecretKey::random(&mut OsRng);
        let shared_secret = H256::random();
        let nonce = H256::random();
        let signature = sign_shared_secret(shared_secret, nonce, &ephemeral).unwrap();
        let recovered = recover_ephemeral_key(shared_secret, nonce, &signature).unwrap();
        assert_eq!(
            recovered.to_encoded_point(false),
            ephemeral.public_key().to_encoded_point(false)
        );
    }
}
