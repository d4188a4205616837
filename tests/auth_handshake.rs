//! Exercises the real Ed448 challenge/response handshake end to end,
//! through the actual signing/verification crate rather than a stub,
//! covering the soundness property that a signature over the wrong
//! challenge (or from the wrong key) is rejected.

use std::collections::HashMap;

use pouchd::auth::{
    new_seed_hex, public_key_hex_from_seed, sign_with_seed_as_hex, Authenticator, ClientRegistry,
    Ed448RustKeys,
};
use pouchd::errors::StoreError;

fn authenticator_with(client_id: &str, pubkey_hex: &str) -> Authenticator<Ed448RustKeys> {
    let mut clients = HashMap::new();
    clients.insert(client_id.to_string(), pubkey_hex.to_string());
    Authenticator::new(Ed448RustKeys, ClientRegistry::new(clients))
}

#[test]
fn a_correctly_signed_challenge_is_accepted() {
    let seed = new_seed_hex();
    let pubkey = public_key_hex_from_seed(&seed).unwrap();
    let auth = authenticator_with("client-1", &pubkey);

    let challenge = auth.generate_challenge_hex();
    let signature = sign_with_seed_as_hex(&seed, challenge.as_bytes()).unwrap();

    assert!(auth.verify(&challenge, "client-1", &signature).is_ok());
}

#[test]
fn a_signature_over_a_different_challenge_is_rejected() {
    let seed = new_seed_hex();
    let pubkey = public_key_hex_from_seed(&seed).unwrap();
    let auth = authenticator_with("client-1", &pubkey);

    let real_challenge = auth.generate_challenge_hex();
    let forged_challenge = "00".repeat(64);
    let signature = sign_with_seed_as_hex(&seed, forged_challenge.as_bytes()).unwrap();

    assert_eq!(
        auth.verify(&real_challenge, "client-1", &signature).unwrap_err(),
        StoreError::InvalidSignature
    );
}

#[test]
fn a_signature_from_an_unregistered_key_is_rejected() {
    let victim_seed = new_seed_hex();
    let victim_pubkey = public_key_hex_from_seed(&victim_seed).unwrap();
    let auth = authenticator_with("client-1", &victim_pubkey);

    let attacker_seed = new_seed_hex();
    let challenge = auth.generate_challenge_hex();
    let forged_signature = sign_with_seed_as_hex(&attacker_seed, challenge.as_bytes()).unwrap();

    assert_eq!(
        auth.verify(&challenge, "client-1", &forged_signature).unwrap_err(),
        StoreError::InvalidSignature
    );
}

#[test]
fn an_unknown_client_id_is_rejected_before_checking_the_signature() {
    let seed = new_seed_hex();
    let pubkey = public_key_hex_from_seed(&seed).unwrap();
    let auth = authenticator_with("registered-client", &pubkey);

    let challenge = auth.generate_challenge_hex();
    let signature = sign_with_seed_as_hex(&seed, challenge.as_bytes()).unwrap();

    assert_eq!(
        auth.verify(&challenge, "someone-else", &signature).unwrap_err(),
        StoreError::UnknownClient
    );
}

#[test]
fn an_empty_registry_rejects_every_client() {
    let auth = Authenticator::new(Ed448RustKeys, ClientRegistry::new(HashMap::new()));
    assert_eq!(
        auth.verify("ab", "anyone", "00").unwrap_err(),
        StoreError::NoRegisteredClients
    );
}
