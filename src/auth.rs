//! Ed448 challenge/response authentication.
//!
//! Grounded in `sdk/auth/challenge.go` and `sdk/pouchkey/pouchkey.go`: a
//! fresh 64-byte challenge per connection, signed as its ASCII hex
//! representation (pure Ed448, no prehash), verified against a client
//! registry keyed by client id.

use std::collections::HashMap;

use rand::RngCore;

use crate::errors::StoreError;

const CHALLENGE_LEN: usize = 64;

/// Abstracts the Ed448 primitives so the handshake logic doesn't depend
/// directly on a particular curve crate.
pub trait Ed448Keys: Send + Sync {
    fn verify(&self, hex_public_key: &str, message: &[u8], hex_signature: &str) -> bool;
}

/// Concrete Ed448 backend, pure (no prehash) signatures per RFC 8032,
/// matching the reference SDK's `crypto.Hash(0)` signing mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ed448RustKeys;

impl Ed448Keys for Ed448RustKeys {
    fn verify(&self, hex_public_key: &str, message: &[u8], hex_signature: &str) -> bool {
        let Ok(pub_bytes) = hex::decode(hex_public_key) else {
            return false;
        };
        let Ok(sig_bytes) = hex::decode(hex_signature) else {
            return false;
        };
        let Ok(public_key) = ed448_rust::PublicKey::try_from(pub_bytes.as_slice()) else {
            return false;
        };
        public_key.verify(message, &sig_bytes, None).is_ok()
    }
}

/// Signs with a hex-encoded seed. Used by the `pouch-cli` companion binary,
/// not by the server (the server only ever verifies).
pub fn sign_with_seed_as_hex(hex_seed: &str, message: &[u8]) -> Result<String, String> {
    let seed = hex::decode(hex_seed).map_err(|e| e.to_string())?;
    let private_key =
        ed448_rust::PrivateKey::try_from(seed.as_slice()).map_err(|e| format!("{e:?}"))?;
    let signature = private_key.sign(message, None).map_err(|e| format!("{e:?}"))?;
    Ok(hex::encode(signature))
}

/// Generates a fresh hex-encoded Ed448 seed.
pub fn new_seed_hex() -> String {
    let mut seed = [0u8; 57];
    rand::thread_rng().fill_bytes(&mut seed);
    hex::encode(seed)
}

/// Derives the hex-encoded public key for a hex-encoded seed.
pub fn public_key_hex_from_seed(hex_seed: &str) -> Result<String, String> {
    let seed = hex::decode(hex_seed).map_err(|e| e.to_string())?;
    let private_key =
        ed448_rust::PrivateKey::try_from(seed.as_slice()).map_err(|e| format!("{e:?}"))?;
    let public_key =
        ed448_rust::PublicKey::try_from(&private_key).map_err(|e| format!("{e:?}"))?;
    Ok(hex::encode(public_key.as_byte()))
}

/// The configured set of client ids allowed to authenticate, each bound to
/// a hex-encoded Ed448 public key.
#[derive(Debug, Clone, Default)]
pub struct ClientRegistry {
    clients: HashMap<String, String>,
}

impl ClientRegistry {
    pub fn new(clients: HashMap<String, String>) -> Self {
        ClientRegistry { clients }
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn public_key_for(&self, client_id: &str) -> Option<&str> {
        self.clients.get(client_id).map(|s| s.as_str())
    }
}

pub struct Authenticator<K: Ed448Keys> {
    keys: K,
    registry: ClientRegistry,
}

impl<K: Ed448Keys> Authenticator<K> {
    pub fn new(keys: K, registry: ClientRegistry) -> Self {
        Authenticator { keys, registry }
    }

    /// Generates a fresh challenge, hex-encoded, to send as
    /// `AUTH.CHALLENGE.REQ <hex>\n`.
    pub fn generate_challenge_hex(&self) -> String {
        let mut bytes = [0u8; CHALLENGE_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    /// Verifies a client's `AUTH.CHALLENGE.RES` reply against the
    /// challenge that was sent. Error variants mirror §4.6 exactly.
    pub fn verify(
        &self,
        challenge_hex: &str,
        client_id: &str,
        signature_hex: &str,
    ) -> Result<(), StoreError> {
        if self.registry.is_empty() {
            return Err(StoreError::NoRegisteredClients);
        }
        let Some(public_key) = self.registry.public_key_for(client_id) else {
            return Err(StoreError::UnknownClient);
        };
        if self
            .keys
            .verify(public_key, challenge_hex.as_bytes(), signature_hex)
        {
            Ok(())
        } else {
            Err(StoreError::InvalidSignature)
        }
    }
}
