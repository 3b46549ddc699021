//! The split graph engine.
//!
//! `SplitGraph` accumulates a k-mer → color-set index from streamed DNA,
//! folds it into per-pattern weights, and keeps a bounded top list of
//! candidate splits. The greedy filters then select a maximum-weight subset
//! under a compatibility predicate; the strict and n-tree variants can
//! serialise the selection as Newick trees.
//!
//! All ingestion state lives in two hash tables. `add_weights` consumes
//! both, after which only the split list is read.

use std::collections::hash_map::Entry;
use std::collections::VecDeque;
use std::mem;

use anyhow::{bail, Result};
use log::info;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::color::{strictly_compatible, weakly_compatible, ColorSet};
use crate::graph_params::GraphParams;
use crate::iupac;
use crate::kmer::{canonical, KmerCode, INVALID_BASE, NT_CODE};
use crate::means::Reducer;
use crate::progress::progress_bar;
use crate::splits::SplitList;
use crate::tree::newick_from_splits;

/// Per-k-mer record: the inputs it occurs in and its support, which is 1
/// for a concretely observed k-mer and `1/expansions` for one only ever
/// produced by IUPAC expansion.
#[derive(Clone, Debug)]
struct KmerEntry<C> {
    colors: C,
    support: f64,
}

/// Per-pattern accumulator filled by `add_weights`.
#[derive(Clone, Copy, Debug, Default)]
struct SplitCount {
    occurrences: u32,
    total: f64,
}

pub struct SplitGraph<K: KmerCode, C: ColorSet> {
    k: usize,
    num_colors: usize,
    kmer_table: FxHashMap<K, KmerEntry<C>>,
    color_table: FxHashMap<C, SplitCount>,
    splits: SplitList<C>,
}

impl<K: KmerCode, C: ColorSet> SplitGraph<K, C> {
    pub(crate) fn new(params: &GraphParams) -> Self {
        SplitGraph {
            k: params.k(),
            num_colors: params.num_colors(),
            kmer_table: FxHashMap::default(),
            color_table: FxHashMap::default(),
            splits: SplitList::new(params.top_size()),
        }
    }

    /// Distinct k-mers indexed so far.
    pub fn kmer_count(&self) -> usize {
        self.kmer_table.len()
    }

    /// The weight-descending split list populated by `add_weights`.
    pub fn splits(&self) -> &[(f64, C)] {
        self.splits.as_slice()
    }

    fn insert_kmer(&mut self, kmer: K, color: usize, support: f64) {
        let num_colors = self.num_colors;
        let entry = self.kmer_table.entry(kmer).or_insert_with(|| KmerEntry {
            colors: C::empty(num_colors),
            support: 0.0,
        });
        entry.colors.set(color);
        entry.support = entry.support.max(support);
    }

    /// Extracts every k-mer of `seq` and marks it present in `color`.
    ///
    /// The forward and reverse-complement windows roll in parallel; with
    /// `canonicalise` the smaller of the two is the stored key. Bytes that
    /// are not A/C/G/T reset the window. Re-adding a (k-mer, color) pair is
    /// a no-op.
    pub fn add_kmers(&mut self, seq: &[u8], color: usize, canonicalise: bool) -> Result<()> {
        if color >= self.num_colors {
            bail!(
                "color index {} out of range for {} inputs",
                color,
                self.num_colors
            );
        }

        let k = self.k;
        let mut fwd = K::zero();
        let mut rev = K::zero();
        let mut filled = 0usize;

        for &ch in seq {
            let code = NT_CODE[ch as usize];
            if code == INVALID_BASE {
                fwd = K::zero();
                rev = K::zero();
                filled = 0;
                continue;
            }

            fwd = fwd.push_base(code, k);
            rev = rev.push_base_rc(code, k);
            filled += 1;

            if filled >= k {
                let key = if canonicalise { fwd.min(rev) } else { fwd };
                self.insert_kmer(key, color, 1.0);
            }
        }

        Ok(())
    }

    /// Like `add_kmers`, expanding IUPAC ambiguity codes.
    ///
    /// A sliding factor window tracks the product of per-base fan-outs over
    /// the last `k` positions. Windows whose product exceeds `max_iupac`
    /// are dropped and the expansion restarts, keeping the current position
    /// when its own fan-out fits the budget. Every emitted expansion
    /// contributes `1/product` support.
    pub fn add_kmers_iupac(
        &mut self,
        seq: &[u8],
        color: usize,
        canonicalise: bool,
        max_iupac: u64,
    ) -> Result<()> {
        if color >= self.num_colors {
            bail!(
                "color index {} out of range for {} inputs",
                color,
                self.num_colors
            );
        }
        if max_iupac == 0 {
            bail!("max_iupac must be at least 1");
        }

        let k = self.k;
        let mut window: FxHashSet<K> = FxHashSet::default();
        let mut scratch: FxHashSet<K> = FxHashSet::default();
        let mut factors: VecDeque<u64> = VecDeque::with_capacity(k);
        let mut product: u64 = 1;
        let mut filled = 0usize;
        window.insert(K::zero());

        for &ch in seq {
            let fan = iupac::fan_out(ch);
            if fan == 0 {
                window.clear();
                window.insert(K::zero());
                factors.clear();
                product = 1;
                filled = 0;
                continue;
            }

            if factors.len() == k {
                product /= factors.pop_front().unwrap();
            }
            product = product.saturating_mul(fan);
            factors.push_back(fan);

            if product > max_iupac {
                window.clear();
                window.insert(K::zero());
                factors.clear();
                product = 1;
                filled = 0;
                if fan <= max_iupac {
                    iupac::shift_set(&window, &mut scratch, ch, k);
                    mem::swap(&mut window, &mut scratch);
                    factors.push_back(fan);
                    product = fan;
                    filled = 1;
                }
                continue;
            }

            iupac::shift_set(&window, &mut scratch, ch, k);
            mem::swap(&mut window, &mut scratch);
            filled += 1;

            if filled >= k {
                let support = 1.0 / product as f64;
                for &expanded in &window {
                    let key = if canonicalise {
                        canonical(expanded, k)
                    } else {
                        expanded
                    };
                    self.insert_kmer(key, color, support);
                }
            }
        }

        Ok(())
    }

    /// Merges another shard of the index into this one. Folding shards in
    /// input order reproduces the sequential index bit for bit: color
    /// unions and support maxima do not depend on arrival order.
    pub fn absorb(&mut self, other: SplitGraph<K, C>) {
        for (kmer, incoming) in other.kmer_table {
            match self.kmer_table.entry(kmer) {
                Entry::Occupied(mut occupied) => {
                    let entry = occupied.get_mut();
                    entry.colors.or_assign(&incoming.colors);
                    entry.support = entry.support.max(incoming.support);
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(incoming);
                }
            }
        }
    }

    /// Folds the k-mer index into per-split weights and populates the top
    /// list. Consumes both hash tables.
    ///
    /// Counts accumulate per raw presence pattern; the reducer runs once
    /// per pattern. Only then is the pattern normalised: a pattern and its
    /// complement name the same split, and when both occurred the larger
    /// weight wins. Patterns that normalise to the empty set covered all
    /// inputs or none and are not splits.
    pub fn add_weights(&mut self, reducer: Reducer, verbose: bool) {
        let num_colors = self.num_colors;
        let kmer_table = mem::take(&mut self.kmer_table);
        info!("Accumulating weights of {} k-mers.", kmer_table.len());

        let bar = verbose.then(|| progress_bar(kmer_table.len() as u64));
        for (_, entry) in kmer_table {
            let count = self.color_table.entry(entry.colors).or_default();
            count.occurrences += 1;
            count.total += entry.support;
            if let Some(bar) = &bar {
                bar.inc(1);
            }
        }
        if let Some(bar) = &bar {
            bar.finish();
        }

        let color_table = mem::take(&mut self.color_table);
        let mut weights: FxHashMap<C, f64> = FxHashMap::default();
        for (color, count) in color_table {
            let weight = reducer(count.occurrences, count.total);
            let split = color.normalized(num_colors);
            if split.is_empty() {
                continue;
            }
            let merged = weights.entry(split).or_insert(weight);
            if weight > *merged {
                *merged = weight;
            }
        }
        for (color, weight) in weights {
            self.add_split(weight, color);
        }
        info!("Retained {} candidate splits.", self.splits.len());
    }

    /// Offers a single weighted split to the top list.
    pub fn add_split(&mut self, weight: f64, color: C) {
        self.splits.insert(weight, color);
    }

    /// Greedy maximum-weight subset realisable as one unrooted tree.
    pub fn filter_strict(&self, verbose: bool) -> Vec<(f64, C)> {
        let bar = verbose.then(|| progress_bar(self.splits.len() as u64));
        let mut accepted: Vec<(f64, C)> = Vec::new();

        for (weight, color) in self.splits.iter() {
            if accepted
                .iter()
                .all(|(_, kept)| strictly_compatible(kept, color))
            {
                accepted.push((*weight, color.clone()));
            }
            if let Some(bar) = &bar {
                bar.inc(1);
            }
        }
        if let Some(bar) = &bar {
            bar.finish();
        }

        info!(
            "Strict filter kept {} of {} splits.",
            accepted.len(),
            self.splits.len()
        );
        accepted
    }

    /// Greedy maximum-weight weakly compatible split system.
    pub fn filter_weakly(&self, verbose: bool) -> Vec<(f64, C)> {
        let num_colors = self.num_colors;
        let bar = verbose.then(|| progress_bar(self.splits.len() as u64));
        let mut accepted: Vec<(f64, C)> = Vec::new();

        for (weight, color) in self.splits.iter() {
            if weak_against(color, &accepted, num_colors) {
                accepted.push((*weight, color.clone()));
            }
            if let Some(bar) = &bar {
                bar.inc(1);
            }
        }
        if let Some(bar) = &bar {
            bar.finish();
        }

        info!(
            "Weak filter kept {} of {} splits.",
            accepted.len(),
            self.splits.len()
        );
        accepted
    }

    /// Greedy partition of the split list into at most `n` tree-compatible
    /// subsets: each candidate joins the first subset that admits it.
    pub fn filter_n_tree(&self, n: usize, verbose: bool) -> Vec<Vec<(f64, C)>> {
        let bar = verbose.then(|| progress_bar(self.splits.len() as u64));
        let mut forests: Vec<Vec<(f64, C)>> = vec![Vec::new(); n];

        for (weight, color) in self.splits.iter() {
            for accepted in &mut forests {
                if accepted
                    .iter()
                    .all(|(_, kept)| strictly_compatible(kept, color))
                {
                    accepted.push((*weight, color.clone()));
                    break;
                }
            }
            if let Some(bar) = &bar {
                bar.inc(1);
            }
        }
        if let Some(bar) = &bar {
            bar.finish();
        }

        let kept: usize = forests.iter().map(Vec::len).sum();
        info!(
            "{}-tree filter kept {} of {} splits.",
            n,
            kept,
            self.splits.len()
        );
        forests
    }

    /// Strict filter plus Newick serialisation of the resulting tree.
    pub fn filter_strict_newick(
        &self,
        names: Option<&[String]>,
        verbose: bool,
    ) -> Result<(Vec<(f64, C)>, String)> {
        let accepted = self.filter_strict(verbose);
        let newick = newick_from_splits(&accepted, self.num_colors, names)?;
        Ok((accepted, newick))
    }

    /// n-tree filter plus one Newick line per non-empty tree.
    pub fn filter_n_tree_newick(
        &self,
        n: usize,
        names: Option<&[String]>,
        verbose: bool,
    ) -> Result<(Vec<Vec<(f64, C)>>, String)> {
        let forests = self.filter_n_tree(n, verbose);
        let mut lines = Vec::new();
        for accepted in &forests {
            if accepted.is_empty() {
                continue;
            }
            lines.push(newick_from_splits(accepted, self.num_colors, names)?);
        }
        Ok((forests, lines.join("\n")))
    }
}

/// True when `candidate` passes the weak triple test against every pair of
/// already accepted splits.
fn weak_against<C: ColorSet>(candidate: &C, accepted: &[(f64, C)], n: usize) -> bool {
    for i in 0..accepted.len() {
        for j in (i + 1)..accepted.len() {
            if !weakly_compatible(&accepted[i].1, &accepted[j].1, candidate, n) {
                return false;
            }
        }
    }
    true
}
