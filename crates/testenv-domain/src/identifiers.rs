use sha2::{Digest, Sha256};

/// Six-hex-character resource prefix derived from a test identifier, used
/// by providers to avoid name collisions across parallel environments.
/// Deterministic: the same id always yields the same prefix.
pub fn resource_prefix(id: &str) -> String {
    if id.is_empty() {
        return String::new();
    }
    let digest = Sha256::digest(id.as_bytes());
    let hex = format!("{:x}", digest);
    hex[0..6].to_string()
}

/// Subnet octet in [20, 219] derived from a test identifier, used to carve
/// out a non-overlapping /24 per environment.
pub fn subnet_octet(id: &str) -> u8 {
    if id.is_empty() {
        return 100;
    }
    let crc = crc32fast::hash(id.as_bytes());
    ((crc % 200) + 20) as u8
}
