//! Non-cryptographic content checksums.
//!
//! Checksums identify identical documents; they are rendered as 16 lowercase
//! hex digits of the xxh3 64-bit hash.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use xxhash_rust::xxh3::Xxh3;

use trdpsim_shared::{SimError, SimResult};

const READ_CHUNK: usize = 64 * 1024;

/// Checksum of an in-memory buffer
pub fn checksum_bytes(bytes: &[u8]) -> String {
    format!("{:016x}", xxhash_rust::xxh3::xxh3_64(bytes))
}

/// Stream a file through the hasher
pub fn checksum_file(path: &Path) -> SimResult<String> {
    let file = File::open(path).map_err(|e| SimError::io(path, e))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Xxh3::new();
    let mut buffer = vec![0u8; READ_CHUNK];

    loop {
        let read = reader
            .read(&mut buffer)
            .map_err(|e| SimError::io(path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:016x}", hasher.digest()))
}
