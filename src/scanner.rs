use std::{iter::Enumerate, slice::Windows};

use crate::signature::Signature;

/// Iterator over every match of a signature, leftmost first.
///
/// Yields the match offset together with the matched window of the haystack.
pub struct Scanner<'a, 's> {
    it: Enumerate<Windows<'a, u8>>,
    signature: &'s Signature,
}

impl<'a, 's> Scanner<'a, 's> {
    pub fn new(signature: &'s Signature, bytes: &'a [u8]) -> Self {
        Self {
            // `Signature` is never empty, so the window size is never zero.
            it: bytes.windows(signature.len().max(1)).enumerate(),
            signature,
        }
    }
}

impl<'a, 's> Iterator for Scanner<'a, 's> {
    type Item = (usize, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let signature = self.signature;
        self.it
            .find_map(|(pos, view)| signature.is_matching(view).then_some((pos, view)))
    }
}
