use std::fmt;

const WORD: usize = u64::BITS as usize;

/// A fixed-width bitset over a table's columns. Bit `i` is the `i`-th column
/// in generation-time order.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct FieldSet {
    words: Vec<u64>,
    len: usize,
}

impl FieldSet {
    pub fn new(len: usize) -> Self {
        FieldSet {
            words: vec![0; len.div_ceil(WORD)],
            len,
        }
    }

    /// Every bit set.
    pub fn filled(len: usize) -> Self {
        let mut fs = FieldSet::new(len);
        for i in 0..len {
            fs.set(i);
        }
        fs
    }

    pub fn from_indices(len: usize, indices: impl IntoIterator<Item = usize>) -> Self {
        let mut fs = FieldSet::new(len);
        for i in indices {
            fs.set(i);
        }
        fs
    }

    pub fn with(mut self, i: usize) -> Self {
        self.set(i);
        self
    }

    /// Panics if `i` is out of range, like slice indexing.
    pub fn set(&mut self, i: usize) {
        assert!(i < self.len, "field index {} out of range for {} fields", i, self.len);
        self.words[i / WORD] |= 1 << (i % WORD);
    }

    pub fn clear(&mut self, i: usize) {
        if i < self.len {
            self.words[i / WORD] &= !(1 << (i % WORD));
        }
    }

    pub fn test(&self, i: usize) -> bool {
        i < self.len && self.words[i / WORD] & (1 << (i % WORD)) != 0
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// True when no bit is set.
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    pub fn count_set_bits(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(move |i| self.test(*i))
    }
}

impl fmt::Debug for FieldSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bits: String = (0..self.len)
            .map(|i| if self.test(i) { '1' } else { '0' })
            .collect();
        write!(f, "FieldSet({})", bits)
    }
}
