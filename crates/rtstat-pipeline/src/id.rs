//! Short, human-legible region codes.
//!
//! Codes follow the bijective base-26 sequence `A`..`Z`, `AA`, `AB`, ...
//! (spreadsheet column names). An [`IdAllocator`] hands them out in
//! order and never issues the same code twice.

use std::collections::BTreeSet;

/// The `index`-th code (0-based) of the bijective base-26 sequence.
///
/// `code(0) == "A"`, `code(25) == "Z"`, `code(26) == "AA"`.
#[must_use]
pub fn code(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        n -= 1;
        // n % 26 < 26, always a valid offset from b'A'.
        #[allow(clippy::cast_possible_truncation)]
        letters.push(char::from(b'A' + (n % 26) as u8));
        n /= 26;
    }
    letters.iter().rev().collect()
}

/// Hands out region codes for one session.
#[derive(Debug, Clone, Default)]
pub struct IdAllocator {
    next: usize,
    used: BTreeSet<String>,
}

impl IdAllocator {
    /// A fresh allocator starting at `A`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next code not yet used in this session.
    pub fn allocate(&mut self) -> String {
        loop {
            let candidate = code(self.next);
            self.next += 1;
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
        }
    }

    /// Mark `code` as used without issuing it.
    ///
    /// Returns `false` if it was already used.
    pub fn reserve(&mut self, code: impl Into<String>) -> bool {
        self.used.insert(code.into())
    }

    /// Whether `code` has been issued or reserved.
    #[must_use]
    pub fn is_used(&self, code: &str) -> bool {
        self.used.contains(code)
    }

    /// Number of codes issued or reserved.
    #[must_use]
    pub fn used_count(&self) -> usize {
        self.used.len()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn sequence_boundaries() {
        assert_eq!(code(0), "A");
        assert_eq!(code(1), "B");
        assert_eq!(code(25), "Z");
        assert_eq!(code(26), "AA");
        assert_eq!(code(27), "AB");
        assert_eq!(code(51), "AZ");
        assert_eq!(code(52), "BA");
        assert_eq!(code(701), "ZZ");
        assert_eq!(code(702), "AAA");
    }

    #[test]
    fn allocations_are_distinct_and_ordered() {
        let mut ids = IdAllocator::new();
        let issued: Vec<String> = (0..1000).map(|_| ids.allocate()).collect();
        let unique: HashSet<&String> = issued.iter().collect();
        assert_eq!(unique.len(), 1000);
        assert_eq!(issued[0], "A");
        assert_eq!(issued[26], "AA");
        assert_eq!(ids.used_count(), 1000);
    }

    #[test]
    fn reserved_codes_are_skipped() {
        let mut ids = IdAllocator::new();
        assert!(ids.reserve("B"));
        assert!(!ids.reserve("B"));
        assert_eq!(ids.allocate(), "A");
        assert_eq!(ids.allocate(), "C");
        assert!(ids.is_used("B"));
    }

    #[test]
    fn separate_allocators_are_independent() {
        let mut a = IdAllocator::new();
        let mut b = IdAllocator::new();
        assert_eq!(a.allocate(), "A");
        assert_eq!(b.allocate(), "A");
    }
}
