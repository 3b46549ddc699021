//! IUPAC ambiguity expansion.
//!
//! An ambiguity code stands for 2–4 concrete bases; a window containing
//! ambiguous positions therefore denotes a set of concrete k-mers. The
//! expansion set is advanced one position at a time: shifting a base into a
//! set of k-mers is the union of shifting each expansion of that base into
//! each member.

use rustc_hash::FxHashSet;

use crate::kmer::KmerCode;

/// Concrete 2-bit expansions per ASCII byte, case-insensitive.
/// Empty slice: not an IUPAC character, resets the window.
pub fn expansions(ch: u8) -> &'static [u8] {
    const A: u8 = 0;
    const C: u8 = 1;
    const G: u8 = 2;
    const T: u8 = 3;
    match ch.to_ascii_uppercase() {
        b'A' => &[A],
        b'C' => &[C],
        b'G' => &[G],
        b'T' | b'U' => &[T],
        b'R' => &[A, G],
        b'Y' => &[C, T],
        b'S' => &[C, G],
        b'W' => &[A, T],
        b'K' => &[G, T],
        b'M' => &[A, C],
        b'B' => &[C, G, T],
        b'D' => &[A, G, T],
        b'H' => &[A, C, T],
        b'V' => &[A, C, G],
        b'N' => &[A, C, G, T],
        _ => &[],
    }
}

/// Number of concrete bases a character stands for; 0 for non-IUPAC input.
pub fn fan_out(ch: u8) -> u64 {
    expansions(ch).len() as u64
}

/// Shifts every expansion of `ch` into every k-mer of `prev`, collecting
/// the results in `next`. Distinct expansion paths can converge on the same
/// k-mer, so `next` may be smaller than `|prev| * fan_out(ch)`.
pub fn shift_set<K: KmerCode>(
    prev: &FxHashSet<K>,
    next: &mut FxHashSet<K>,
    ch: u8,
    k: usize,
) {
    next.clear();
    for &kmer in prev {
        for &base in expansions(ch) {
            next.insert(kmer.push_base(base, k));
        }
    }
}
