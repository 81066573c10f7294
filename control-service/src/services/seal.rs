use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use crypto_box::aead::OsRng;

use crate::platform::{SealedSecret, SecretPublicKey};

use super::error::ControlError;

/// Seal `value` for upload under the repository's public encryption key.
///
/// Sealed-box encryption: only the platform's private key can open the
/// result, so the plaintext never travels beyond this process.
pub fn seal_secret(public_key: &SecretPublicKey, value: &str) -> Result<SealedSecret, ControlError> {
    let raw = BASE64
        .decode(&public_key.key)
        .map_err(|e| ControlError::Encryption(format!("public key is not valid base64: {e}")))?;
    let raw: [u8; 32] = raw
        .try_into()
        .map_err(|_| ControlError::Encryption("public key must be 32 bytes".to_string()))?;
    let key = crypto_box::PublicKey::from(raw);

    let sealed = key
        .seal(&mut OsRng, value.as_bytes())
        .map_err(|e| ControlError::Encryption(format!("sealed-box encryption failed: {e}")))?;

    Ok(SealedSecret {
        key_id: public_key.key_id.clone(),
        encrypted_value: BASE64.encode(sealed),
    })
}
