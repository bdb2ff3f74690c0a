//! ed25519 signature verification over the canonical JobSpec payload.
//! Treated as an external collaborator: the orchestrator calls out to this
//! helper but does not own authentication policy beyond invoking it.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};

use crate::error::{OrchestratorError, Result};
use crate::ports::SignatureVerifier;

pub struct Ed25519Verifier;

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, canonical_payload: &[u8], signature: &str, public_key: &str) -> Result<()> {
        let key_bytes = hex_decode(public_key)
            .map_err(|e| OrchestratorError::SignatureInvalid(format!("bad public key: {e}")))?;
        let key_array: [u8; 32] = key_bytes
            .try_into()
            .map_err(|_| OrchestratorError::SignatureInvalid("public key must be 32 bytes".into()))?;
        let verifying_key = VerifyingKey::from_bytes(&key_array)
            .map_err(|e| OrchestratorError::SignatureInvalid(format!("bad public key: {e}")))?;

        let sig_bytes = hex_decode(signature)
            .map_err(|e| OrchestratorError::SignatureInvalid(format!("bad signature: {e}")))?;
        let sig_array: [u8; 64] = sig_bytes
            .try_into()
            .map_err(|_| OrchestratorError::SignatureInvalid("signature must be 64 bytes".into()))?;
        let sig = Signature::from_bytes(&sig_array);

        verifying_key
            .verify(canonical_payload, &sig)
            .map_err(|e| OrchestratorError::SignatureInvalid(format!("verification failed: {e}")))
    }
}

fn hex_decode(s: &str) -> std::result::Result<Vec<u8>, String> {
    if s.len() % 2 != 0 {
        return Err("odd-length hex string".into());
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|e| e.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};
    use rand::rngs::OsRng;

    fn hex_encode(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    #[test]
    fn verifies_valid_signature() {
        let mut csprng = OsRng;
        let signing_key = SigningKey::generate(&mut csprng);
        let payload = b"canonical payload bytes";
        let signature = signing_key.sign(payload);

        let verifier = Ed25519Verifier;
        let result = verifier.verify(
            payload,
            &hex_encode(&signature.to_bytes()),
            &hex_encode(signing_key.verifying_key().as_bytes()),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn rejects_tampered_payload() {
        let mut csprng = OsRng;
        let signing_key = SigningKey::generate(&mut csprng);
        let signature = signing_key.sign(b"original");

        let verifier = Ed25519Verifier;
        let result = verifier.verify(
            b"tampered",
            &hex_encode(&signature.to_bytes()),
            &hex_encode(signing_key.verifying_key().as_bytes()),
        );
        assert!(result.is_err());
    }
}
