//! Per-request set of peers already attempted.

const WORD_BITS: usize = usize::BITS as usize;

/// Fixed-size bit set, one bit per peer of the active pool.
///
/// Bits are only ever set during a request; the whole set is cleared when
/// the request moves on to the backup pool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriedSet {
    words: Vec<usize>,
}

impl TriedSet {
    /// Number of machine words needed for `peers` bits.
    pub fn len_for(peers: usize) -> usize {
        peers.div_ceil(WORD_BITS)
    }

    /// An empty set able to hold `peers` bits.
    pub fn new(peers: usize) -> Self {
        Self {
            words: vec![0; Self::len_for(peers)],
        }
    }

    /// Mark peer `index` as tried.
    pub fn set(&mut self, index: usize) {
        let (word, mask) = Self::locate(index);
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= mask;
    }

    /// Whether peer `index` was tried.
    pub fn test(&self, index: usize) -> bool {
        let (word, mask) = Self::locate(index);
        self.words.get(word).is_some_and(|w| w & mask != 0)
    }

    /// Clear every bit and resize for a pool of `peers`.
    pub fn reset(&mut self, peers: usize) {
        self.words.clear();
        self.words.resize(Self::len_for(peers), 0);
    }

    /// Number of tried peers.
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    fn locate(index: usize) -> (usize, usize) {
        (index / WORD_BITS, 1 << (index % WORD_BITS))
    }
}
