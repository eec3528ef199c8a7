//! Identifying the binary being mapped.

use std::{fs::File, io, path::Path};

use rosetta::constants::CHECKSUM_SIZE;
use sha2::{Digest, Sha256};

/// The first `CHECKSUM_SIZE` bytes of the SHA-256 digest of the file at `path`.
pub fn jar_checksum(path: &Path) -> io::Result<[u8; CHECKSUM_SIZE]> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    let digest = hasher.finalize();

    let mut checksum = [0; CHECKSUM_SIZE];
    checksum.copy_from_slice(&digest[..CHECKSUM_SIZE]);
    Ok(checksum)
}

/// The checksum of `path`, or all zeros without a file.
pub fn checksum_or_default(path: Option<&Path>) -> io::Result<[u8; CHECKSUM_SIZE]> {
    match path {
        Some(path) => {
            let checksum = jar_checksum(path)?;
            tracing::info!("Checksum of {}: {}", path.display(), hex::encode(checksum));
            Ok(checksum)
        }
        None => {
            tracing::warn!("No binary given, using an all-zero checksum");
            Ok([0; CHECKSUM_SIZE])
        }
    }
}
