// ABOUTME: Running content digests for backup and restore file transfers.
// ABOUTME: MD5 rendered as upper-case hex, the format the orchestrator stores and compares.

use md5::{Digest, Md5};

/// An incremental digest over the bytes of one file.
pub trait Checksum: Send {
    /// Feed bytes into the running digest.
    fn update(&mut self, bytes: &[u8]);

    /// Finalize the digest and reset the accumulator for the next file.
    fn checksum(&mut self) -> String;

    /// Drop whatever has been accumulated so far.
    fn reset(&mut self);
}

/// MD5 digest, upper-case hex.
#[derive(Clone, Default)]
pub struct Md5Checksum {
    hasher: Md5,
}

impl Md5Checksum {
    pub fn new() -> Self {
        Self::default()
    }

    /// Digest of a complete buffer.
    pub fn of(bytes: &[u8]) -> String {
        let mut checksum = Self::new();
        checksum.update(bytes);
        checksum.checksum()
    }
}

impl Checksum for Md5Checksum {
    fn update(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    fn checksum(&mut self) -> String {
        hex::encode_upper(self.hasher.finalize_reset())
    }

    fn reset(&mut self) {
        Digest::reset(&mut self.hasher);
    }
}
