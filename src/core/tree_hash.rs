use sha2::{Digest, Sha256};

const LEAF_SIZE: usize = 1024 * 1024;

/// SHA-256 tree hash as computed by the vault service: digest every 1 MiB
/// leaf, then hash adjacent pairs level by level until one digest is left.
/// An odd digest at the end of a level is carried up unchanged.
pub(crate) fn tree_hash(data: &[u8]) -> [u8; 32] {
    if data.is_empty() {
        return Sha256::digest(data).into();
    }

    let mut level: Vec<[u8; 32]> = data
        .chunks(LEAF_SIZE)
        .map(|chunk| Sha256::digest(chunk).into())
        .collect();

    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => {
                    let mut hasher = Sha256::new();
                    hasher.update(left);
                    hasher.update(right);
                    hasher.finalize().into()
                }
                [single] => *single,
                _ => unreachable!("chunks(2) yields one or two digests"),
            })
            .collect();
    }

    level[0]
}

pub(crate) fn tree_hash_hex(data: &[u8]) -> String {
    tree_hash(data)
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect()
}
