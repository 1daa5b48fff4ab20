//! Derives hashed sandbox directory names and download URLs.
//!
//! Pure functions only: no filesystem or network access. See
//! `config::hash_path`/`hash_file` in the teacher codebase this is grown
//! from for the pattern this generalizes.

use sha2::{Digest, Sha256};

/// Length in hex characters of a hashed-id. SHA-256 is 32 bytes = 64 hex chars.
pub const HASHED_ID_LEN: usize = 64;

/// Compute the hashed-id for a conversation: hex(SHA-256(conversation_id || secret)).
///
/// No separator between the two inputs — see SPEC_FULL.md §4.1 for why this
/// is safe despite the lack of a length prefix.
pub fn hashed_id(conversation_id: &str, file_secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(conversation_id.as_bytes());
    hasher.update(file_secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// True iff `s` is a syntactically valid hashed-id: exactly 64 lowercase hex chars.
pub fn is_valid_hashed_id(s: &str) -> bool {
    s.len() == HASHED_ID_LEN && s.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
}

/// Build the public download URL for a file in a conversation's sandbox.
pub fn file_url(public_base_url: &str, conversation_id: &str, file_secret: &str, filename: &str) -> String {
    let base = public_base_url.trim_end_matches('/');
    let id = hashed_id(conversation_id, file_secret);
    format!("{base}/files/{id}/{}", path_escape(filename))
}

/// Escape a filename for safe inclusion as a single URL path segment.
///
/// Percent-encodes everything except unreserved characters (RFC 3986
/// `ALPHA / DIGIT / "-" / "." / "_" / "~"`); in particular `/` is encoded so
/// a filename can never introduce an extra path segment.
pub fn path_escape(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for byte in name.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Derive the `FILE_BASE_URL` value injected into every execution's environment.
pub fn file_base_url(public_base_url: &str, conversation_id: &str, file_secret: &str) -> String {
    let base = public_base_url.trim_end_matches('/');
    let id = hashed_id(conversation_id, file_secret);
    format!("{base}/files/{id}")
}
