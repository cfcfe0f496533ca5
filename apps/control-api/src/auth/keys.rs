use ed25519_dalek::{SigningKey, VerifyingKey};
use jsonwebtoken::{DecodingKey, EncodingKey};
use sha2::{Digest, Sha256};

/// An Ed25519 keypair with the derived `jsonwebtoken` encoding/decoding keys.
///
/// Keys are derived deterministically from a seed so that restarts keep
/// previously issued credentials valid. Access and refresh credentials use
/// separate seeds, so one kind can never be presented as the other.
#[derive(Clone)]
pub struct SigningKeys {
    /// Key ID written into the JWT header.
    pub kid: String,
    /// The `jsonwebtoken` encoding key (private).
    pub encoding: EncodingKey,
    /// The `jsonwebtoken` decoding key (public).
    pub decoding: DecodingKey,
}

impl SigningKeys {
    /// Derive an Ed25519 keypair from a seed string.
    ///
    /// The seed is hashed via SHA-256 to produce exactly 32 bytes. `label`
    /// prefixes the key ID (`acc`, `ref`).
    pub fn from_seed(seed: &str, label: &str) -> Self {
        let hash = Sha256::digest(seed.as_bytes());
        let mut secret_bytes = [0u8; 32];
        secret_bytes.copy_from_slice(&hash);

        let signing_key = SigningKey::from_bytes(&secret_bytes);
        let verifying_key: VerifyingKey = (&signing_key).into();
        let public_bytes = verifying_key.to_bytes();

        // jsonwebtoken expects PKCS8 DER for the private key (encoding)
        // but raw 32-byte public key bytes for the public key (decoding).
        let pkcs8_der = wrap_ed25519_private_pkcs8(&signing_key.to_bytes());

        let kid_hash = Sha256::digest(public_bytes);
        Self {
            kid: format!("{label}-{}", hex_prefix(&kid_hash, 8)),
            encoding: EncodingKey::from_ed_der(&pkcs8_der),
            decoding: DecodingKey::from_ed_der(&public_bytes),
        }
    }
}

fn hex_prefix(bytes: &[u8], chars: usize) -> String {
    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    hex[..chars.min(hex.len())].to_string()
}

/// Wrap a raw 32-byte Ed25519 private key in PKCS8 DER encoding.
///
/// Structure: SEQUENCE { INTEGER 0, SEQUENCE { OID 1.3.101.112 }, OCTET STRING { OCTET STRING { key } } }
fn wrap_ed25519_private_pkcs8(secret: &[u8; 32]) -> Vec<u8> {
    let mut der = Vec::with_capacity(48);
    der.extend_from_slice(&[0x30, 0x2e]);
    der.extend_from_slice(&[0x02, 0x01, 0x00]);
    der.extend_from_slice(&[0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70]);
    der.extend_from_slice(&[0x04, 0x22, 0x04, 0x20]);
    der.extend_from_slice(secret);
    der
}

impl std::fmt::Debug for SigningKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeys")
            .field("kid", &self.kid)
            .finish_non_exhaustive()
    }
}
