//! Engine parameters.
//!
//! `GraphParams` bundles the launch-time constants of the split graph: the
//! k-mer length, the number of input genomes (colors), and the capacity of
//! the split top list. A validated parameter set is the only way to obtain
//! a `SplitGraph`, which pins the misconfiguration checks to one place.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::color::ColorSet;
use crate::graph::SplitGraph;
use crate::kmer::KmerCode;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphParams {
    kmer_length: usize,
    num_colors: usize,
    top_size: usize,
}

impl GraphParams {
    pub fn new(kmer_length: usize, num_colors: usize, top_size: usize) -> Result<Self> {
        if kmer_length == 0 || kmer_length > 64 {
            bail!("k-mer length must be in the range [1, 64], got {}", kmer_length);
        }
        if num_colors == 0 {
            bail!("at least one input genome is required");
        }
        if top_size == 0 {
            bail!("the split list capacity must be at least 1");
        }

        Ok(GraphParams {
            kmer_length,
            num_colors,
            top_size,
        })
    }

    pub fn k(&self) -> usize {
        self.kmer_length
    }

    pub fn num_colors(&self) -> usize {
        self.num_colors
    }

    pub fn top_size(&self) -> usize {
        self.top_size
    }

    /// Build an empty split graph on the chosen k-mer and color backings,
    /// rejecting a backing too narrow for the parameters.
    pub fn create_graph<K: KmerCode, C: ColorSet>(&self) -> Result<SplitGraph<K, C>> {
        if self.kmer_length > K::MAX_K {
            bail!(
                "k = {} exceeds the {} bases of the selected k-mer backing",
                self.kmer_length,
                K::MAX_K
            );
        }
        if let Some(max_colors) = C::MAX_COLORS {
            if self.num_colors > max_colors {
                bail!(
                    "{} inputs exceed the {} colors of the selected color backing",
                    self.num_colors,
                    max_colors
                );
            }
        }

        Ok(SplitGraph::new(self))
    }
}
