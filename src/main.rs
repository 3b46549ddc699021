
//! Main entry point for the splitmer application.
//!
//! This file handles command-line parsing, logging setup, and input collection, then
//! orchestrates the split graph pipeline: every input FASTA file becomes one color,
//! k-mers are indexed per input in parallel and merged, split weights are accumulated,
//! and the selected compatibility filter produces the final split list and, for the
//! tree-shaped filters, Newick output. Results are written to the output directory.

use std::env;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use ahash::{HashSet, HashSetExt};
use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use needletail::parse_fastx_reader;
use rayon::iter::{IndexedParallelIterator, IntoParallelRefIterator, ParallelIterator};

use crate::cli::{Cli, FilterArg, MeanArg};
use crate::color::{ColorSet, WideColor};
use crate::graph::SplitGraph;
use crate::graph_params::GraphParams;
use crate::io_utils::genome_id_from_filename;
use crate::kmer::KmerCode;
use crate::logging::setup_logger;
use crate::means::{arithmetic_mean, geometric_mean, Reducer};
use crate::progress::progress_bar;

mod cli;
pub mod color;
pub mod graph;
pub mod graph_params;
pub mod io_utils;
pub mod iupac;
pub mod kmer;
pub mod logging;
pub mod means;
pub mod progress;
pub mod splits;
pub mod tree;

/// Common initialization required by all commands.
fn init(threads: usize) -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    info!("{} v{}", env!("CARGO_PKG_NAME"), VERSION);
    info!("{}", env::args().collect::<Vec<String>>().join(" "));

    info!("Using {} threads.", threads);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()?;

    Ok(())
}

/// Resolve the input genomes, in the order that fixes their color indices.
fn collect_inputs(args: &Cli) -> Result<Vec<PathBuf>> {
    let inputs = if let Some(genome_list) = &args.genome_list {
        info!("Using genome list: {}", genome_list.display());
        let file = File::open(genome_list)
            .context(format!("Failed to open {}", genome_list.display()))?;
        let reader = BufReader::new(file);

        let mut paths = Vec::new();
        for line in reader.lines() {
            let line = line?;
            let line = line.trim();

            // skip comment lines starting with #
            if line.starts_with('#') || line.is_empty() {
                continue;
            }
            paths.push(PathBuf::from(line));
        }
        paths
    } else if let Some(input_dir) = &args.input_dir {
        info!("Using input directory: {}", input_dir.display());

        let mut paths: Vec<PathBuf> = std::fs::read_dir(input_dir)?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| has_fasta_extension(path))
            .collect();

        // directory iteration order is arbitrary; color indices must not be
        paths.sort();
        paths
    } else {
        bail!("No input specified. Use --input-dir or --genome-list.");
    };

    if inputs.is_empty() {
        bail!("No FASTA files found.");
    }
    for path in &inputs {
        if !path.exists() {
            bail!("Genome file {} does not exist.", path.display());
        }
    }

    Ok(inputs)
}

fn has_fasta_extension(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    let base = name.strip_suffix(".gz").unwrap_or(name.as_str());

    [".fa", ".fasta", ".fna"].iter().any(|ext| base.ends_with(ext))
}

/// One display name per input, made unique by suffixing the color index.
fn genome_names(inputs: &[PathBuf]) -> Vec<String> {
    let mut seen = HashSet::new();
    inputs
        .iter()
        .enumerate()
        .map(|(index, path)| {
            let mut name = genome_id_from_filename(path);
            if name.is_empty() || !seen.insert(name.clone()) {
                name = format!("{}_{}", name, index);
                seen.insert(name.clone());
            }
            name
        })
        .collect()
}

/// The pipeline, monomorphised over the k-mer and color backings.
fn run<K: KmerCode, C: ColorSet>(
    args: &Cli,
    inputs: &[PathBuf],
    names: &[String],
    params: &GraphParams,
) -> Result<()> {
    let reducer: Reducer = match args.mean {
        MeanArg::Arith => arithmetic_mean,
        MeanArg::Geom => geometric_mean,
    };
    let canonicalise = !args.no_reverse;

    // index each input into its own shard, then merge in input order
    info!("Indexing k-mers of {} genomes.", inputs.len());
    let bar = progress_bar(inputs.len() as u64);
    let shards: Result<Vec<SplitGraph<K, C>>> = inputs
        .par_iter()
        .enumerate()
        .map(|(color, path)| -> Result<SplitGraph<K, C>> {
            let mut shard = params.create_graph::<K, C>()?;
            let reader = File::open(path)
                .context(format!("Failed to open {}", path.display()))?;

            let mut fastx_reader = parse_fastx_reader(reader)?;
            while let Some(record) = fastx_reader.next() {
                let record = record?;
                match args.iupac {
                    Some(max_iupac) => {
                        shard.add_kmers_iupac(&record.seq(), color, canonicalise, max_iupac)?
                    }
                    None => shard.add_kmers(&record.seq(), color, canonicalise)?,
                }
            }

            bar.inc(1);
            Ok(shard)
        })
        .collect();
    bar.finish();

    let mut shards = shards?.into_iter();
    let Some(mut graph) = shards.next() else {
        bail!("No input shards produced.");
    };
    for shard in shards {
        graph.absorb(shard);
    }
    info!("Indexed {} distinct k-mers.", graph.kmer_count());

    graph.add_weights(reducer, args.verbose);

    std::fs::create_dir_all(&args.out_dir)?;
    let splits_path = args.out_dir.join("splits.tsv");
    let newick_path = args.out_dir.join("tree.nwk");

    match args.filter {
        FilterArg::None => {
            write_splits(&splits_path, graph.splits(), names, params.num_colors())?;
        }
        FilterArg::Strict => {
            let (accepted, newick) = graph.filter_strict_newick(Some(names), args.verbose)?;
            write_splits(&splits_path, &accepted, names, params.num_colors())?;
            write_newick(&newick_path, &newick)?;
        }
        FilterArg::Weakly => {
            let accepted = graph.filter_weakly(args.verbose);
            write_splits(&splits_path, &accepted, names, params.num_colors())?;
        }
        FilterArg::Tree => {
            let (forests, newick) =
                graph.filter_n_tree_newick(args.trees, Some(names), args.verbose)?;
            let accepted: Vec<(f64, C)> = forests.into_iter().flatten().collect();
            write_splits(&splits_path, &accepted, names, params.num_colors())?;
            write_newick(&newick_path, &newick)?;
        }
    }

    Ok(())
}

/// Write one split per line: weight, then the member taxa of the stored side.
fn write_splits<C: ColorSet>(
    path: &Path,
    splits: &[(f64, C)],
    names: &[String],
    num_colors: usize,
) -> Result<()> {
    let file = File::create(path).context(format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    for (weight, color) in splits {
        write!(writer, "{}", weight)?;
        for index in color.ones(num_colors) {
            write!(writer, "\t{}", names[index])?;
        }
        writeln!(writer)?;
    }

    info!("Wrote {} splits to {}.", splits.len(), path.display());
    Ok(())
}

fn write_newick(path: &Path, newick: &str) -> Result<()> {
    let file = File::create(path).context(format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    writeln!(writer, "{}", newick)?;

    info!("Wrote Newick output to {}.", path.display());
    Ok(())
}

fn main() -> Result<()> {
    let start = Instant::now();

    let args = Cli::parse();

    // the file appender needs the output directory to exist
    std::fs::create_dir_all(&args.out_dir)
        .context(format!("Failed to create {}", args.out_dir.display()))?;
    setup_logger(&args.out_dir)?;

    init(args.threads)?;

    let inputs = collect_inputs(&args)?;
    let names = genome_names(&inputs);
    let num_colors = inputs.len();
    let top_size = args.top.unwrap_or(10 * num_colors);
    let params = GraphParams::new(args.kmer_length, num_colors, top_size)?;

    info!(
        "{} input genomes, k = {}, keeping the top {} splits.",
        num_colors,
        params.k(),
        params.top_size()
    );

    // pick the narrowest backings that fit k and the number of inputs
    if params.k() <= <u64 as KmerCode>::MAX_K {
        if num_colors <= 64 {
            run::<u64, u64>(&args, &inputs, &names, &params)?;
        } else {
            run::<u64, WideColor>(&args, &inputs, &names, &params)?;
        }
    } else if num_colors <= 64 {
        run::<u128, u64>(&args, &inputs, &names, &params)?;
    } else {
        run::<u128, WideColor>(&args, &inputs, &names, &params)?;
    }

    info!("Elapsed time (sec): {:.2}", start.elapsed().as_secs_f32());
    info!("Done.");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::write;
    use tempfile::tempdir;

    #[test]
    fn test_collect_inputs_from_list() -> Result<()> {
        let dir = tempdir()?;
        let genome_a = dir.path().join("a.fna");
        let genome_b = dir.path().join("b.fna");
        write(&genome_a, ">s\nACGT\n")?;
        write(&genome_b, ">s\nACGT\n")?;

        let list = dir.path().join("genomes.txt");
        write(
            &list,
            format!(
                "# path per line\n{}\n\n{}\n",
                genome_b.display(),
                genome_a.display()
            ),
        )?;

        let args = Cli::parse_from([
            "splitmer",
            "--genome-list",
            list.to_str().unwrap(),
            "--out-dir",
            dir.path().join("out").to_str().unwrap(),
        ]);
        let inputs = collect_inputs(&args)?;

        // the list order fixes the color indices
        assert_eq!(inputs, vec![genome_b, genome_a]);
        Ok(())
    }

    #[test]
    fn test_genome_names_are_unique() {
        let inputs = vec![
            PathBuf::from("/x/eco.fna"),
            PathBuf::from("/y/eco.fna"),
            PathBuf::from("/z/styphi.fna"),
        ];
        assert_eq!(genome_names(&inputs), vec!["eco", "eco_1", "styphi"]);
    }

    #[test]
    fn test_end_to_end_strict_filter() -> Result<()> {
        let dir = tempdir()?;
        write(dir.path().join("alpha.fna"), ">seq1\nAAAA\n")?;
        write(dir.path().join("beta.fna"), ">seq1\nAAAT\n")?;
        let out_dir = dir.path().join("out");

        let args = Cli::parse_from([
            "splitmer",
            "--input-dir",
            dir.path().to_str().unwrap(),
            "--out-dir",
            out_dir.to_str().unwrap(),
            "--kmer-length",
            "3",
            "--mean",
            "arith",
            "--filter",
            "strict",
            "--no-reverse",
        ]);

        let inputs = collect_inputs(&args)?;
        let names = genome_names(&inputs);
        assert_eq!(names, vec!["alpha", "beta"]);

        let params = GraphParams::new(3, 2, 20)?;
        run::<u64, u64>(&args, &inputs, &names, &params)?;

        // AAA is shared, AAT is unique to beta: one split of weight 1
        let splits = std::fs::read_to_string(out_dir.join("splits.tsv"))?;
        assert_eq!(splits, "1\tbeta\n");

        let newick = std::fs::read_to_string(out_dir.join("tree.nwk"))?;
        assert_eq!(newick, "(alpha,beta:1);\n");
        Ok(())
    }
}
