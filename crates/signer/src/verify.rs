//! Detached OpenPGP signature verification.

use crate::error::{SignerError, SignerResult};
use pgp::composed::{Deserializable, SignedPublicKey, StandaloneSignature};
use std::io::Cursor;

/// Verify an ASCII-armored detached signature over `message` against an
/// ASCII-armored keyring.
///
/// The keyring may carry several certificates; verification succeeds if any
/// primary key or signing subkey validates the signature.
pub fn verify_detached(message: &[u8], signature: &[u8], keyring: &[u8]) -> SignerResult<()> {
    let (signature, _) = StandaloneSignature::from_armor_single(Cursor::new(signature))
        .map_err(|err| SignerError::InvalidSignature(err.to_string()))?;

    let (keys, _) = SignedPublicKey::from_armor_many(Cursor::new(keyring))
        .map_err(|err| SignerError::InvalidKeyring(err.to_string()))?;

    let mut any_key = false;
    for key in keys {
        let key = key.map_err(|err| SignerError::InvalidKeyring(err.to_string()))?;
        any_key = true;

        if signature.verify(&key, message).is_ok() {
            return Ok(());
        }
        for subkey in &key.public_subkeys {
            if signature.verify(subkey, message).is_ok() {
                return Ok(());
            }
        }
    }

    if !any_key {
        return Err(SignerError::InvalidKeyring("keyring is empty".to_string()));
    }
    Err(SignerError::VerificationFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MESSAGE: &[u8] = include_bytes!("../testdata/metadata.xml");
    const SIGNATURE: &[u8] = include_bytes!("../testdata/metadata.xml.asc");
    const SIGNING_KEY: &[u8] = include_bytes!("../testdata/signing.key");
    const OTHER_KEY: &[u8] = include_bytes!("../testdata/other.key");

    #[test]
    fn test_valid_signature_verifies() {
        verify_detached(MESSAGE, SIGNATURE, SIGNING_KEY).unwrap();
    }

    #[test]
    fn test_wrong_key_fails() {
        match verify_detached(MESSAGE, SIGNATURE, OTHER_KEY) {
            Err(SignerError::VerificationFailed) => {}
            other => panic!("expected VerificationFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_tampered_message_fails() {
        let mut tampered = MESSAGE.to_vec();
        tampered.push(b'x');
        match verify_detached(&tampered, SIGNATURE, SIGNING_KEY) {
            Err(SignerError::VerificationFailed) => {}
            other => panic!("expected VerificationFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_garbage_signature_is_invalid() {
        match verify_detached(MESSAGE, b"not armored at all", SIGNING_KEY) {
            Err(SignerError::InvalidSignature(_)) => {}
            other => panic!("expected InvalidSignature, got {other:?}"),
        }
    }

    #[test]
    fn test_garbage_keyring_is_invalid() {
        match verify_detached(MESSAGE, SIGNATURE, b"not a keyring") {
            Err(SignerError::InvalidKeyring(_)) => {}
            other => panic!("expected InvalidKeyring, got {other:?}"),
        }
    }
}
