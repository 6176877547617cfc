use base64::Engine;
use sha2::{Digest, Sha256};

use super::session::random_bytes;
use crate::error::AppResult;

pub const VERIFIER_LEN: usize = 128;

/// RFC 3986 unreserved characters.
const UNRESERVED: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pkce {
    pub verifier: String,
    pub challenge: String,
}

impl Pkce {
    pub fn generate() -> AppResult<Self> {
        let verifier = random_string(VERIFIER_LEN)?;
        let challenge = code_challenge(&verifier);
        Ok(Self { verifier, challenge })
    }
}

/// Uniform random string over the unreserved alphabet.
pub fn random_string(len: usize) -> AppResult<String> {
    // Largest multiple of the alphabet size below 256; bytes above it are redrawn.
    let limit = 256 - (256 % UNRESERVED.len());
    let mut out = String::with_capacity(len);
    while out.len() < len {
        for b in random_bytes(len)? {
            if (b as usize) < limit {
                out.push(UNRESERVED[b as usize % UNRESERVED.len()] as char);
                if out.len() == len { break; }
            }
        }
    }
    Ok(out)
}

/// S256 challenge: base64url(SHA-256(verifier)) without padding.
pub fn code_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest)
}
