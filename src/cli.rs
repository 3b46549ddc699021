
//! Command-line interface definition for the splitmer application.
//!
//! This file defines the `Cli` struct using the `clap` crate to parse and validate
//! command-line arguments. It covers input selection (a directory of FASTA files or an
//! ordered list file), the split graph parameters (k-mer length, top list size, weight
//! function, reverse-complement handling, IUPAC expansion budget), the compatibility
//! filter, and runtime options. The CLI output is styled using the `anstyle` crate.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

const DEFAULT_K: usize = 31;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(styles=get_styles())]
#[command(disable_help_subcommand = true)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Directory of genomic FASTA files, one genome per file
    #[arg(short = 'i', long, help_heading = "Inputs", group = "input", value_parser = clap::value_parser!(PathBuf))]
    pub input_dir: Option<PathBuf>,

    /// File listing genomic FASTA files, one path per line; line order fixes the genome indices
    #[arg(short = 'g', long, help_heading = "Inputs", group = "input", value_parser = clap::value_parser!(PathBuf))]
    pub genome_list: Option<PathBuf>,

    /// Output directory
    #[arg(short = 'o', long, help_heading = "Output", value_parser = clap::value_parser!(PathBuf))]
    pub out_dir: PathBuf,

    /// Length of k-mers to index
    #[arg(short, long, help_heading = "Graph parameters", default_value_t = DEFAULT_K, value_parser = validate_kmer_length)]
    pub kmer_length: usize,

    /// Number of top splits to keep (default: ten per input genome)
    #[arg(short = 't', long, help_heading = "Graph parameters")]
    pub top: Option<usize>,

    /// Weight function folding the counts of a split into its weight
    #[arg(short = 'm', long, help_heading = "Graph parameters", value_enum, default_value_t = MeanArg::Geom)]
    pub mean: MeanArg,

    /// Do not merge k-mers with their reverse complements
    #[arg(long, help_heading = "Graph parameters", default_value_t = false)]
    pub no_reverse: bool,

    /// Expand IUPAC ambiguity codes, allowing at most this many expansions per k-mer window
    #[arg(long, help_heading = "Graph parameters")]
    pub iupac: Option<u64>,

    /// Compatibility filter applied to the weighted splits
    #[arg(short = 'f', long, help_heading = "Filtering", value_enum, default_value_t = FilterArg::None)]
    pub filter: FilterArg,

    /// Number of trees built by the tree filter
    #[arg(long, help_heading = "Filtering", default_value_t = 2, value_parser = validate_trees)]
    pub trees: usize,

    /// Number of threads to use
    #[arg(long, default_value_t = 1, value_parser = validate_threads)]
    pub threads: usize,

    /// Show progress while weighting and filtering
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

/// Split weight function.
#[derive(Copy, Clone, Debug, PartialEq, ValueEnum)]
pub enum MeanArg {
    /// Arithmetic mean of k-mer occurrences and their summed support
    Arith,
    /// Geometric mean of k-mer occurrences and their summed support
    Geom,
}

/// Greedy compatibility filter.
#[derive(Copy, Clone, Debug, PartialEq, ValueEnum)]
pub enum FilterArg {
    /// Keep the full top list
    None,
    /// Greedy tree-compatible subset, written as one Newick tree
    Strict,
    /// Greedy weakly compatible split system
    Weakly,
    /// Greedy partition into tree-compatible subsets, one Newick tree each
    Tree,
}

fn validate_kmer_length(k: &str) -> Result<usize, String> {
    let k: usize = k
        .parse()
        .map_err(|_| format!("`{k}` isn't a valid k-mer length"))?;

    if !(1..=64).contains(&k) {
        return Err("k-mer length must be in the range [1, 64]".to_string());
    }

    Ok(k)
}

fn validate_trees(trees: &str) -> Result<usize, String> {
    let trees: usize = trees
        .parse()
        .map_err(|_| format!("`{trees}` isn't a valid value"))?;

    if trees == 0 {
        return Err("The tree filter needs at least one tree".to_string());
    }

    Ok(trees)
}

fn validate_threads(threads: &str) -> Result<usize, String> {
    let threads: usize = threads
        .parse()
        .map_err(|_| format!("`{threads}` isn't a valid value"))?;

    if !(1..=1024).contains(&threads) {
        return Err("Threads must be in the range [1, 1024]".to_string());
    }

    Ok(threads)
}

fn get_styles() -> clap::builder::Styles {
    clap::builder::Styles::styled()
        .usage(
            anstyle::Style::new()
                .bold()
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::White))),
        )
        .header(
            anstyle::Style::new()
                .bold()
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::White))),
        )
        .literal(
            anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))),
        )
        .invalid(
            anstyle::Style::new()
                .bold()
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red))),
        )
        .error(
            anstyle::Style::new()
                .bold()
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red))),
        )
        .valid(
            anstyle::Style::new()
                .bold()
                .underline()
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))),
        )
        .placeholder(
            anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::White))),
        )
}

#[test]
fn test_verify_cli() {
    use clap::CommandFactory;
    Cli::command().debug_assert()
}
