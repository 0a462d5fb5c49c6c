/// A packed bitmap.
///
/// Used as the null-row mask for arrays, where a set bit means the row at
/// that physical index is null.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bitmap {
    len: usize,
    words: Vec<u64>,
}

impl Bitmap {
    pub fn new_with_all_false(len: usize) -> Self {
        Bitmap {
            len,
            words: vec![0; len.div_ceil(64)],
        }
    }

    pub fn new_with_all_true(len: usize) -> Self {
        let mut bitmap = Bitmap {
            len,
            words: vec![u64::MAX; len.div_ceil(64)],
        };
        bitmap.clear_trailing();
        bitmap
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get the value at an index.
    ///
    /// Panics if out of bounds.
    #[inline]
    pub fn value(&self, idx: usize) -> bool {
        assert!(idx < self.len, "bitmap index {idx} out of bounds {}", self.len);
        self.words[idx / 64] & (1 << (idx % 64)) != 0
    }

    #[inline]
    pub fn set_unchecked(&mut self, idx: usize, val: bool) {
        if val {
            self.words[idx / 64] |= 1 << (idx % 64);
        } else {
            self.words[idx / 64] &= !(1 << (idx % 64));
        }
    }

    pub fn push(&mut self, val: bool) {
        if self.len % 64 == 0 {
            self.words.push(0);
        }
        self.len += 1;
        self.set_unchecked(self.len - 1, val);
    }

    /// Resize the bitmap, new bits are set to false.
    pub fn resize(&mut self, len: usize) {
        self.words.resize(len.div_ceil(64), 0);
        self.len = len;
        self.clear_trailing();
    }

    pub fn clear(&mut self) {
        self.words.clear();
        self.len = 0;
    }

    /// Count the set bits.
    pub fn count_trues(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn any(&self) -> bool {
        self.words.iter().any(|w| *w != 0)
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(|idx| self.value(idx))
    }

    fn clear_trailing(&mut self) {
        let rem = self.len % 64;
        if rem != 0 {
            if let Some(last) = self.words.last_mut() {
                *last &= (1 << rem) - 1;
            }
        }
    }
}

impl FromIterator<bool> for Bitmap {
    fn from_iter<T: IntoIterator<Item = bool>>(iter: T) -> Self {
        let mut bitmap = Bitmap::default();
        for val in iter {
            bitmap.push(val);
        }
        bitmap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_read() {
        let bitmap = Bitmap::from_iter([true, false, true, true]);
        assert_eq!(4, bitmap.len());
        assert_eq!(3, bitmap.count_trues());
        assert_eq!(vec![true, false, true, true], bitmap.iter().collect::<Vec<_>>());
    }

    #[test]
    fn all_true_across_words() {
        let bitmap = Bitmap::new_with_all_true(70);
        assert_eq!(70, bitmap.count_trues());
        assert!(bitmap.value(69));
    }

    #[test]
    fn resize_clears_new_bits() {
        let mut bitmap = Bitmap::new_with_all_true(3);
        bitmap.resize(2);
        bitmap.resize(100);
        assert_eq!(2, bitmap.count_trues());
        assert!(!bitmap.value(2));
    }
}
