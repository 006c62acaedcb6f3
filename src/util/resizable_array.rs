//! A growable/shrinkable fixed-capacity-free buffer used by the joystick
//! aggregator to accumulate axis deltas between reads.

/// A `Vec<T>` wrapper with the two operations the joystick accumulator
/// needs: `resize`, which truncates or pads with `T::default()`, and
/// `shift`, which drops elements from the front.
#[derive(Debug, Clone, Default)]
pub struct ResizableArray<T> {
    data: Vec<T>,
}

impl<T: Default + Clone> ResizableArray<T> {
    /// Creates an array of `n` default-valued elements.
    #[must_use]
    pub fn new(n: usize) -> Self {
        Self {
            data: vec![T::default(); n],
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Resizes to exactly `n` elements: truncates from the end, or pads
    /// with `T::default()`.
    pub fn resize(&mut self, n: usize) {
        if n <= self.data.len() {
            self.data.truncate(n);
        } else {
            self.data.resize(n, T::default());
        }
    }

    /// Drops the first `k` elements (clamped to the current length),
    /// shrinking the array by `k`.
    pub fn shift(&mut self, k: usize) {
        let k = k.min(self.data.len());
        self.data.drain(0..k);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_to_zero_is_empty() {
        let mut arr = ResizableArray::<i32>::new(5);
        arr.resize(0);
        assert!(arr.is_empty());
    }

    #[test]
    fn resize_after_shift_preserves_min_of_remaining_and_target() {
        let mut arr = ResizableArray::new(10);
        for (i, slot) in arr.as_mut_slice().iter_mut().enumerate() {
            *slot = i as i32;
        }
        arr.shift(3); // remaining: [3..10) -> 7 elements
        arr.resize(4); // min(7, 4) = 4
        assert_eq!(arr.as_slice(), [3, 4, 5, 6]);

        let mut arr2 = ResizableArray::new(10);
        for (i, slot) in arr2.as_mut_slice().iter_mut().enumerate() {
            *slot = i as i32;
        }
        arr2.shift(8); // remaining: 2 elements [8, 9]
        arr2.resize(5); // min(2, 5) = 2, padded with defaults
        assert_eq!(arr2.as_slice(), [8, 9, 0, 0, 0]);
    }
}
