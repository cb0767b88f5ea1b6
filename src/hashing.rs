// Optional chunk-hashing helpers.
//
// Never called by `chunker`: content hashing of emitted chunks is a caller concern (e.g. a
// deduplication layer keying chunks by content hash), not something the chunker itself needs to
// do its job.

/// Extends SHA3-256 with truncated variants, trading a larger collision probability for a
/// shorter identifier.
pub trait ExtendableHashExt {
    fn hash_chunk_112(&mut self, chunk: &[u8]) -> [u8; 14];
    fn hash_chunk_128(&mut self, chunk: &[u8]) -> [u8; 16];
    fn hash_chunk_144(&mut self, chunk: &[u8]) -> [u8; 18];
    fn hash_chunk_160(&mut self, chunk: &[u8]) -> [u8; 20];
}

impl ExtendableHashExt for sha3::Sha3_256 {
    fn hash_chunk_112(&mut self, chunk: &[u8]) -> [u8; 14] {
        use sha3::Digest;

        self.input(chunk);
        let out = self.result_reset();

        let mut hash = [0u8; 14];
        hash.copy_from_slice(&out[0..14]);
        hash
    }

    fn hash_chunk_128(&mut self, chunk: &[u8]) -> [u8; 16] {
        use sha3::Digest;

        self.input(chunk);
        let out = self.result_reset();

        let mut hash = [0u8; 16];
        hash.copy_from_slice(&out[0..16]);
        hash
    }

    fn hash_chunk_144(&mut self, chunk: &[u8]) -> [u8; 18] {
        use sha3::Digest;

        self.input(chunk);
        let out = self.result_reset();

        let mut hash = [0u8; 18];
        hash.copy_from_slice(&out[0..18]);
        hash
    }

    fn hash_chunk_160(&mut self, chunk: &[u8]) -> [u8; 20] {
        use sha3::Digest;

        self.input(chunk);
        let out = self.result_reset();

        let mut hash = [0u8; 20];
        hash.copy_from_slice(&out[0..20]);
        hash
    }
}

/// One-liner for a full SHA-256 digest of a chunk.
pub fn hash_chunk_sha256(chunk: &[u8]) -> [u8; 32] {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.input(chunk);

    let mut output = [0u8; 32];
    output.copy_from_slice(hasher.result().as_slice());
    output
}
