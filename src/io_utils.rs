use std::path::Path;

/// Derives a genome identifier from a sequence file name by stripping a
/// compression suffix and the usual FASTA/FASTQ extensions.
pub fn genome_id_from_filename(seq_file: &Path) -> String {
    let name = seq_file
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();

    let base = name.strip_suffix(".gz").unwrap_or(name.as_str());
    for ext in [".fa", ".fasta", ".fna", ".fq", ".fastq"] {
        if let Some(stripped) = base.strip_suffix(ext) {
            return stripped.to_string();
        }
    }

    base.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_genome_id_from_filename() {
        assert_eq!(genome_id_from_filename(&PathBuf::from("/data/eco.fna")), "eco");
        assert_eq!(genome_id_from_filename(&PathBuf::from("eco.fasta.gz")), "eco");
        assert_eq!(genome_id_from_filename(&PathBuf::from("reads.fastq")), "reads");
        assert_eq!(genome_id_from_filename(&PathBuf::from("plain")), "plain");
    }
}
