use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use md5::{Digest, Md5};

/// Base64-encoded MD5 digest, the form object stores expect in `Content-MD5`.
pub fn b64_md5(data: &[u8]) -> String {
    STANDARD.encode(Md5::digest(data))
}
