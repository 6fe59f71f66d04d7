//! RSA-PSS (SHA-256, MGF1-SHA-256) request signatures.
//!
//! Verification uses the maximum salt length the modulus allows, matching
//! what clients produce when signing with `PSS.MAX_LENGTH`-style settings.
//! [`verify_signature`] never returns an error: a malformed key, a malformed
//! signature and a digest mismatch all look the same to the caller.

use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{Pss, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};

const SHA256_OUTPUT_LEN: usize = 32;

/// Errors from the client-side signer.
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Signing failed: {0}")]
    Rsa(#[from] rsa::Error),
}

/// Largest PSS salt for a modulus of `modulus_bits` with a SHA-256 digest.
///
/// `emLen = ceil((modBits - 1) / 8)`, `sLen = emLen - hLen - 2`.
pub fn max_pss_salt_len(modulus_bits: usize) -> Option<usize> {
    let em_len = (modulus_bits + 6) / 8;
    em_len.checked_sub(SHA256_OUTPUT_LEN + 2)
}

/// Parse a public key from SubjectPublicKeyInfo DER, or PEM text.
pub fn parse_public_key(bytes: &[u8]) -> Option<RsaPublicKey> {
    if bytes.starts_with(b"-----BEGIN") {
        let pem = std::str::from_utf8(bytes).ok()?;
        return RsaPublicKey::from_public_key_pem(pem).ok();
    }
    RsaPublicKey::from_public_key_der(bytes).ok()
}

/// Verify an RSA-PSS/SHA-256 signature over `message`.
///
/// # Arguments
/// * `public_key` - SPKI DER (or PEM) encoded RSA public key
/// * `signature` - raw signature bytes
/// * `message` - the canonical request bytes
///
/// # Returns
/// `true` only if the signature is valid for this key and message.
pub fn verify_signature(public_key: &[u8], signature: &[u8], message: &[u8]) -> bool {
    match try_verify(public_key, signature, message) {
        Ok(()) => true,
        Err(reason) => {
            tracing::debug!(reason, "Signature verification failed");
            false
        }
    }
}

fn try_verify(public_key: &[u8], signature: &[u8], message: &[u8]) -> Result<(), &'static str> {
    let key = parse_public_key(public_key).ok_or("malformed public key")?;
    let salt_len = max_pss_salt_len(key.n().bits()).ok_or("modulus too small for PSS")?;
    let hashed = Sha256::digest(message);
    key.verify(Pss::new_with_salt::<Sha256>(salt_len), &hashed, signature)
        .map_err(|_| "signature mismatch")
}

/// Sign `message` with a PKCS#8 DER private key.
///
/// This is the client half of the protocol; the server never holds private
/// keys after provisioning.
pub fn sign_canonical(private_key_der: &[u8], message: &[u8]) -> Result<Vec<u8>, SigningError> {
    let key = RsaPrivateKey::from_pkcs8_der(private_key_der)
        .map_err(|e| SigningError::InvalidPrivateKey(e.to_string()))?;
    let salt_len = max_pss_salt_len(key.n().bits())
        .ok_or_else(|| SigningError::InvalidPrivateKey("modulus too small for PSS".to_string()))?;
    let hashed = Sha256::digest(message);
    let signature =
        key.sign_with_rng(&mut OsRng, Pss::new_with_salt::<Sha256>(salt_len), &hashed)?;
    Ok(signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
    use std::sync::OnceLock;

    struct Fixture {
        private_der: Vec<u8>,
        public_der: Vec<u8>,
        public_pem: String,
    }

    fn fixture(bits: usize) -> Fixture {
        let key = RsaPrivateKey::new(&mut OsRng, bits).unwrap();
        let public = RsaPublicKey::from(&key);
        Fixture {
            private_der: key.to_pkcs8_der().unwrap().as_bytes().to_vec(),
            public_der: public.to_public_key_der().unwrap().as_bytes().to_vec(),
            public_pem: public.to_public_key_pem(LineEnding::LF).unwrap(),
        }
    }

    fn key_2048() -> &'static Fixture {
        static KEY: OnceLock<Fixture> = OnceLock::new();
        KEY.get_or_init(|| fixture(2048))
    }

    #[test]
    fn test_max_salt_len() {
        assert_eq!(max_pss_salt_len(2048), Some(222));
        assert_eq!(max_pss_salt_len(4096), Some(478));
        assert_eq!(max_pss_salt_len(2047), Some(221));
        assert_eq!(max_pss_salt_len(256), None);
    }

    #[test]
    fn test_round_trip_2048() {
        let k = key_2048();
        let msg = b"POST/api/v1/upload1700000000";
        let sig = sign_canonical(&k.private_der, msg).unwrap();
        assert_eq!(sig.len(), 256);
        assert!(verify_signature(&k.public_der, &sig, msg));
    }

    #[test]
    fn test_round_trip_4096() {
        let k = fixture(4096);
        let msg = b"GET/api/v1/keys1700000000";
        let sig = sign_canonical(&k.private_der, msg).unwrap();
        assert_eq!(sig.len(), 512);
        assert!(verify_signature(&k.public_der, &sig, msg));
    }

    #[test]
    fn test_pem_public_key_accepted() {
        let k = key_2048();
        let msg = b"PUT/a1{}";
        let sig = sign_canonical(&k.private_der, msg).unwrap();
        assert!(verify_signature(k.public_pem.as_bytes(), &sig, msg));
    }

    #[test]
    fn test_signatures_are_randomized() {
        let k = key_2048();
        let msg = b"same message";
        let a = sign_canonical(&k.private_der, msg).unwrap();
        let b = sign_canonical(&k.private_der, msg).unwrap();
        assert_ne!(a, b);
        assert!(verify_signature(&k.public_der, &a, msg));
        assert!(verify_signature(&k.public_der, &b, msg));
    }

    #[test]
    fn test_message_tamper_detected() {
        let k = key_2048();
        let msg = b"POST/api/v1/upload1700000000{\"filename\":\"a.mp4\"}".to_vec();
        let sig = sign_canonical(&k.private_der, &msg).unwrap();
        for i in 0..msg.len() {
            let mut tampered = msg.clone();
            tampered[i] ^= 0x01;
            assert!(!verify_signature(&k.public_der, &sig, &tampered), "byte {}", i);
        }
    }

    #[test]
    fn test_signature_tamper_detected() {
        let k = key_2048();
        let msg = b"POST/api/v1/upload1700000000";
        let sig = sign_canonical(&k.private_der, msg).unwrap();
        for i in 0..sig.len() {
            let mut tampered = sig.clone();
            tampered[i] ^= 0x80;
            assert!(!verify_signature(&k.public_der, &tampered, msg), "signature byte {}", i);
        }
        for i in 0..msg.len() {
            let mut tampered = msg.to_vec();
            tampered[i] ^= 0x01;
            assert!(!verify_signature(&k.public_der, &sig, &tampered), "message byte {}", i);
        }
    }

    #[test]
    fn test_wrong_key_rejected() {
        let signer = key_2048();
        let other = fixture(2048);
        let msg = b"hello";
        let sig = sign_canonical(&signer.private_der, msg).unwrap();
        assert!(!verify_signature(&other.public_der, &sig, msg));
    }

    #[test]
    fn test_malformed_inputs_return_false() {
        let k = key_2048();
        assert!(!verify_signature(b"not a key", &[0u8; 256], b"msg"));
        assert!(!verify_signature(b"-----BEGIN garbage", &[0u8; 256], b"msg"));
        assert!(!verify_signature(&k.public_der, b"short", b"msg"));
        assert!(!verify_signature(&k.public_der, &[], b"msg"));
        assert!(!verify_signature(&[], &[], &[]));
    }

    #[test]
    fn test_sign_with_invalid_private_key() {
        let result = sign_canonical(b"garbage", b"msg");
        assert!(matches!(result, Err(SigningError::InvalidPrivateKey(_))));
    }
}
