use blake2::{Blake2b512, Digest};

const CHECKSUM_PREFIX: &[u8] = b"SS58PRE";
const CHECKSUM_LEN: usize = 2;

/// SS58 address of a 32-byte account id under `prefix`.
#[allow(clippy::cast_possible_truncation)]
pub fn encode(prefix: u16, account: &[u8; 32]) -> String {
    let mut payload = Vec::with_capacity(2 + account.len() + CHECKSUM_LEN);

    if prefix < 64 {
        payload.push(prefix as u8);
    } else {
        // Two-byte form: lower six bits of the first byte carry bits 2..8,
        // the second byte carries bits 0..2 and 8..14.
        payload.push((((prefix & 0b0000_0000_1111_1100) >> 2) as u8) | 0b0100_0000);
        payload.push(((prefix >> 8) as u8) | (((prefix & 0b0000_0000_0000_0011) << 6) as u8));
    }
    payload.extend_from_slice(account);

    let mut hasher = Blake2b512::new();
    hasher.update(CHECKSUM_PREFIX);
    hasher.update(&payload);
    let checksum = hasher.finalize();
    payload.extend_from_slice(&checksum[..CHECKSUM_LEN]);

    bs58::encode(payload).into_string()
}
