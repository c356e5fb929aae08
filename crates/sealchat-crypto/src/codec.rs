//! Binary to text codec.
//!
//! Every binary field that leaves the client (public keys, ciphertext,
//! nonces, signatures) is encoded as unpadded URL-safe base64. Decoding also
//! accepts the standard alphabet and canonical `=` padding, normalizing both
//! to the URL-safe form before decoding, so keys exported by older clients
//! still import.

use std::borrow::Cow;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use crate::error::CryptoError;

/// Encode bytes as unpadded URL-safe base64.
pub fn encode(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode URL-safe (or standard) base64 text.
///
/// Fails with [`CryptoError::MalformedEncoding`] on characters outside the
/// alphabet, inconsistent padding, or non-canonical trailing bits.
pub fn decode(text: &str) -> Result<Vec<u8>, CryptoError> {
    let unpadded = strip_padding(text)?;
    let normalized: Cow<'_, str> = if unpadded.contains(['+', '/']) {
        Cow::Owned(unpadded.replace('+', "-").replace('/', "_"))
    } else {
        Cow::Borrowed(unpadded)
    };
    URL_SAFE_NO_PAD
        .decode(normalized.as_bytes())
        .map_err(|e| match e {
            base64::DecodeError::InvalidByte(..) => {
                CryptoError::MalformedEncoding("character outside base64 alphabet")
            }
            base64::DecodeError::InvalidLastSymbol(..) => {
                CryptoError::MalformedEncoding("non-canonical trailing bits")
            }
            base64::DecodeError::InvalidPadding => CryptoError::MalformedEncoding("invalid padding"),
            _ => CryptoError::MalformedEncoding("invalid encoded length"),
        })
}

/// Decode into a fixed-size array, rejecting any other length.
pub fn decode_array<const N: usize>(text: &str) -> Result<[u8; N], CryptoError> {
    let bytes = decode(text)?;
    <[u8; N]>::try_from(bytes.as_slice()).map_err(|_| CryptoError::InvalidKeyLength {
        expected: N,
        actual: bytes.len(),
    })
}

/// Strip trailing `=` padding after checking it is consistent with the
/// unpadded length.
fn strip_padding(text: &str) -> Result<&str, CryptoError> {
    let unpadded = text.trim_end_matches('=');
    let pad = text.len() - unpadded.len();
    if pad == 0 {
        return Ok(unpadded);
    }
    let expected_pad = match unpadded.len() % 4 {
        2 => 2,
        3 => 1,
        _ => 0,
    };
    if pad != expected_pad {
        return Err(CryptoError::MalformedEncoding("inconsistent padding"));
    }
    Ok(unpadded)
}
