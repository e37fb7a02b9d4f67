//! HMAC-SHA256 webhook signatures, hex-encoded. Shared by all provider
//! adapters; comparison goes through `Mac::verify_slice`, which is
//! constant-time.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub fn sign_hex(secret: &str, payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

pub fn verify_hex(secret: &str, payload: &[u8], signature_hex: &str) -> bool {
    let Ok(signature) = hex::decode(signature_hex) else {
        return false;
    };
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload);
    mac.verify_slice(&signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_verifies() {
        let sig = sign_hex("whsec_test", b"payload-bytes");
        assert!(verify_hex("whsec_test", b"payload-bytes", &sig));
    }

    #[test]
    fn wrong_secret_rejected() {
        let sig = sign_hex("whsec_test", b"payload-bytes");
        assert!(!verify_hex("whsec_other", b"payload-bytes", &sig));
    }

    #[test]
    fn tampered_payload_rejected() {
        let sig = sign_hex("whsec_test", b"payload-bytes");
        assert!(!verify_hex("whsec_test", b"payload-bytez", &sig));
    }

    #[test]
    fn non_hex_signature_rejected() {
        assert!(!verify_hex("whsec_test", b"payload", "not hex at all"));
    }
}
