/// Equihash parameters `(n, k)`.
///
/// `n` is the bit length of each hash digest, and `2^k` is the number of indices in a
/// solution. Every solver and verifier working on the same puzzle must agree on both.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Params {
    pub(crate) n: u32,
    pub(crate) k: u32,
}

impl Params {
    /// Returns `None` if the parameters are invalid.
    pub fn new(n: u32, k: u32) -> Option<Self> {
        // We place the following requirements on the parameters:
        // - n is a multiple of 8, so the hash output has an exact byte length.
        // - k >= 3 so the encoded solutions have an exact byte length.
        // - k < n, so the collision bit length is at least 1.
        // - n is a multiple of k + 1, so we have an integer collision bit length.
        if (n % 8 == 0) && (k >= 3) && (k < n) && (n % (k + 1) == 0) {
            Some(Params { n, k })
        } else {
            None
        }
    }

    /// The bit length of each hash digest.
    pub fn n(&self) -> u32 {
        self.n
    }

    /// The number of collision rounds; solutions contain `2^k` indices.
    pub fn k(&self) -> u32 {
        self.k
    }

    pub(crate) fn indices_per_hash_output(&self) -> u32 {
        512 / self.n
    }
    pub(crate) fn hash_output(&self) -> u8 {
        (self.indices_per_hash_output() * self.n / 8) as u8
    }

    /// The number of digest bits that must collide in each round.
    pub fn collision_bit_length(&self) -> usize {
        (self.n / (self.k + 1)) as usize
    }
    pub(crate) fn collision_byte_length(&self) -> usize {
        (self.collision_bit_length() + 7) / 8
    }
    #[cfg(test)]
    pub(crate) fn hash_length(&self) -> usize {
        ((self.k as usize) + 1) * self.collision_byte_length()
    }

    /// The bit width of a single index in the encoded form of a solution.
    pub fn index_bit_length(&self) -> usize {
        self.collision_bit_length() + 1
    }

    /// The number of indices in a solution.
    pub fn proof_size(&self) -> usize {
        1 << self.k
    }

    /// The byte length of an encoded solution.
    ///
    /// Division is exact because `k >= 3`.
    pub fn solution_width(&self) -> usize {
        self.proof_size() * self.index_bit_length() / 8
    }

    /// The number of distinct indices, and thus digests, for one `(input, nonce)`.
    #[cfg(feature = "solver")]
    pub(crate) fn index_count(&self) -> usize {
        1 << self.index_bit_length()
    }
}
