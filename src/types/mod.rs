mod x25519;
pub use x25519::*;

use crate::Error;
use rand::TryRngCore;
use rand::rngs::OsRng;

/// Fills `N` bytes from the operating system RNG.
pub(crate) fn random_bytes<const N: usize>() -> Result<[u8; N], Error> {
    let mut bytes = [0u8; N];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|err| Error::KeyGeneration(err.to_string()))?;
    Ok(bytes)
}

/// Generates a cryptographically secure random 32-byte seed.
pub(crate) fn random_seed() -> Result<[u8; 32], Error> {
    random_bytes()
}

/// Generates a random identifier, base64 encoded.
pub(crate) fn random_id() -> Result<String, Error> {
    use base64::Engine;

    let bytes = random_bytes::<16>()?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}
