use sha2::{Digest, Sha256};
use std::fmt;
use std::io::{self, Read};

const READ_CHUNK_BYTES: usize = 64 * 1024;

/// Hex SHA-256 of a file's full contents. Used to name uploaded objects so
/// identical bytes land on the same remote id; not a security token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn content_hash(bytes: &[u8]) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    finish(hasher)
}

pub fn hash_reader<R: Read>(mut reader: R) -> io::Result<ContentHash> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0_u8; READ_CHUNK_BYTES];
    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(finish(hasher))
}

fn finish(hasher: Sha256) -> ContentHash {
    ContentHash(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn known_digest() {
        assert_eq!(
            content_hash(b"abc").as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn digest_is_lowercase_hex() {
        let hash = content_hash(b"");
        assert_eq!(hash.as_str().len(), 64);
        assert!(
            hash.as_str()
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        );
        assert_eq!(hash.to_string(), format!("{:x}", Sha256::digest(b"")));
    }

    #[test]
    fn reader_matches_slice_across_chunks() {
        let bytes: Vec<u8> = (0..200_000_u32).map(|n| (n % 251) as u8).collect();
        let streamed = hash_reader(Cursor::new(&bytes)).expect("hash");
        assert_eq!(streamed, content_hash(&bytes));
    }
}
