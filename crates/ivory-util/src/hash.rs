use md5::Md5;
use sha1::{Digest, Sha1};

/// Compute the SHA-1 hash of a byte slice, returning a lowercase hex string.
pub fn sha1_bytes(data: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Compute the MD5 hash of a byte slice, returning a lowercase hex string.
pub fn md5_bytes(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
