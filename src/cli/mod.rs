//! Command-line interface for ribo_te

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ribo_te")]
#[command(version)]
#[command(about = "Translational efficiency from paired RNA-seq and Ribo-seq counts")]
#[command(disable_help_flag = true)]
#[command(disable_version_flag = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Number of worker threads (0 = all cores)
    #[arg(short, long, global = true, default_value_t = 0)]
    pub threads: usize,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the whole pipeline from a JSON configuration
    #[command(
        about = "Run the whole pipeline from a JSON configuration",
        long_about = "Run the whole pipeline from a JSON configuration\n\n\
            Reconciles quantifier columns with the sample table, assembles the\n\
            Ribo-seq and RNA-seq count matrices, normalizes to PPM and TPM, calls\n\
            translated features and computes translational efficiency.\n\n\
            Existing non-empty outputs are kept unless --overwrite is given.",
        after_long_help = "\
Examples:
  ribo_te run --config pipeline.json

  # recompute everything
  ribo_te run --config pipeline.json --overwrite --threads 8"
    )]
    Run {
        /// Path to the JSON configuration
        #[arg(short, long)]
        config: String,

        /// Rewrite outputs that already exist
        #[arg(long)]
        overwrite: bool,

        /// Output directory (overrides the configuration)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Map quantifier columns to sample IDs
    #[command(
        about = "Map quantifier columns to sample IDs",
        long_about = "Map quantifier columns to sample IDs\n\n\
            Column headers are reduced to candidate identifiers (directory and\n\
            aligner suffix removed) and matched as literal infixes against the\n\
            sample table's file column for the chosen library.",
        after_long_help = "\
Examples:
  ribo_te reconcile -m samples.tsv -q ribo_orfs.tsv --library ribo -o mapping.csv"
    )]
    Reconcile {
        /// Sample table (CSV/TSV export)
        #[arg(short, long)]
        metadata: String,

        /// Quantifier table whose columns are reconciled
        #[arg(short, long)]
        quant: String,

        /// Library type: rna or ribo
        #[arg(short, long, default_value = "ribo")]
        library: String,

        /// Feature annotation columns before the first sample column
        #[arg(long, default_value_t = 5)]
        metadata_columns: usize,

        /// What to do with a candidate found in several rows: error or first
        #[arg(long, default_value = "error")]
        ambiguity: String,

        /// Collect every candidate per row and sum lanes of one sample
        #[arg(long)]
        lanes: bool,

        /// Output CSV (candidate, sample_id); stdout if omitted
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Build a sample-keyed count matrix from quantifier tables
    #[command(
        about = "Build a sample-keyed count matrix from quantifier tables",
        long_about = "Build a sample-keyed count matrix from quantifier tables\n\n\
            Each table is reconciled against the sample table; tables given with\n\
            --cds-quant get the canonical suffix on their feature IDs. Tables are\n\
            stacked after aligning their sample columns.",
        after_long_help = "\
Examples:
  ribo_te assemble -m samples.tsv --library ribo -q ribo_orfs.tsv \\
    --cds-quant ribo_cds.tsv -o ribo_counts.csv --lengths-out lengths.tsv"
    )]
    Assemble {
        /// Sample table (CSV/TSV export)
        #[arg(short, long)]
        metadata: String,

        /// Library type: rna or ribo
        #[arg(short, long, default_value = "ribo")]
        library: String,

        /// Quantifier table (repeatable)
        #[arg(short, long)]
        quant: Vec<String>,

        /// Canonical CDS quantifier table (repeatable)
        #[arg(long)]
        cds_quant: Vec<String>,

        /// Suffix for canonical CDS features
        #[arg(long, default_value = "_CDS")]
        suffix: String,

        /// Feature annotation columns before the first sample column
        #[arg(long, default_value_t = 5)]
        metadata_columns: usize,

        /// Require identical sample column order across tables
        #[arg(long)]
        strict_order: bool,

        /// Output count matrix CSV
        #[arg(short, long)]
        output: String,

        /// Also write the captured feature lengths (feature_id, chrom, start, end)
        #[arg(long)]
        lengths_out: Option<String>,
    },

    /// Normalize a count matrix to TPM or PPM
    #[command(
        about = "Normalize a count matrix to TPM or PPM",
        long_about = "Normalize a count matrix to TPM or PPM\n\n\
            rate = count / (length / 1000); abundance = rate / (sum of rates / 1e6).\n\
            Features without a length are excluded."
    )]
    Normalize {
        /// Count matrix CSV
        #[arg(short, long)]
        counts: String,

        /// Interval file: feature_id, chrom, start, end (1-based inclusive)
        #[arg(short, long)]
        lengths: String,

        /// Unit: tpm or ppm
        #[arg(short, long, default_value = "tpm")]
        unit: String,

        /// Keep features whose mean raw count is above this value
        #[arg(long)]
        min_mean: Option<f64>,

        /// Output CSV
        #[arg(short, long)]
        output: String,
    },

    /// Call translated (or expressed) features from an abundance matrix
    #[command(
        about = "Call translated (or expressed) features",
        long_about = "Call translated (or expressed) features\n\n\
            A feature is detected when its abundance is above --threshold in at\n\
            least --min-samples samples."
    )]
    Detect {
        /// Abundance matrix CSV (PPM or TPM)
        #[arg(short, long)]
        abundance: String,

        /// Unit of the abundance matrix: ppm (translated ORFs) or tpm (expressed genes)
        #[arg(short, long, default_value = "ppm")]
        unit: String,

        /// Per-sample abundance threshold
        #[arg(long, default_value_t = 1.0)]
        threshold: f64,

        /// Minimum number of samples above threshold
        #[arg(long, default_value_t = 5)]
        min_samples: usize,

        /// Feature annotation table, for per-category summaries
        #[arg(long)]
        annotation: Option<String>,

        /// Output CSV (one row per feature)
        #[arg(short, long)]
        output: String,

        /// Output CSV of per-category totals
        #[arg(long)]
        summary: Option<String>,
    },

    /// Compute translational efficiency from PPM and TPM matrices
    #[command(
        about = "Compute translational efficiency from PPM and TPM matrices",
        long_about = "Compute translational efficiency from PPM and TPM matrices\n\n\
            Both matrices are restricted to shared features and samples. TE is\n\
            PPM / TPM with non-finite ratios set to 0; the log view is\n\
            log2(TE + pseudocount), centered per feature.",
        after_long_help = "\
Examples:
  ribo_te te --ppm ppm.csv --tpm tpm.csv -o te_out --pseudocount 0.1 --centering median"
    )]
    Te {
        /// Ribo-seq PPM matrix CSV
        #[arg(long)]
        ppm: String,

        /// RNA-seq TPM matrix CSV
        #[arg(long)]
        tpm: String,

        /// Pseudocount added before log2
        #[arg(long, default_value_t = 0.01)]
        pseudocount: f64,

        /// Centering: median, mean-sd or none
        #[arg(long, default_value = "median")]
        centering: String,

        /// Output directory (te.csv, te_log2.csv, te_centered.csv)
        #[arg(short, long)]
        output: String,
    },

    /// Write inputs for an external differential-testing engine
    #[command(
        about = "Write inputs for an external differential-testing engine",
        long_about = "Write inputs for an external differential-testing engine\n\n\
            Writes counts.csv (integer counts of annotated samples), coldata.csv\n\
            and design.json (formula and contrast) into the output directory.",
        after_long_help = "\
Examples:
  ribo_te prepare-de -c ribo_counts.csv -m samples.tsv -d subgroup -d myc_group \\
    --numerator high --denominator low -o de_ribo"
    )]
    PrepareDe {
        /// Count matrix CSV
        #[arg(short, long)]
        counts: String,

        /// Sample table (CSV/TSV export)
        #[arg(short, long)]
        metadata: String,

        /// Design variable (repeatable; the last one carries the contrast)
        #[arg(short, long, required = true)]
        design: Vec<String>,

        /// Contrast numerator level
        #[arg(long)]
        numerator: Option<String>,

        /// Contrast denominator (reference) level
        #[arg(long)]
        denominator: Option<String>,

        /// Output directory
        #[arg(short, long)]
        output: String,
    },

    /// Summarize an engine results table and export a ranking
    #[command(
        about = "Summarize an engine results table and export a ranking",
        long_about = "Summarize an engine results table and export a ranking\n\n\
            Reads a standard results table (NA allowed, padj computed with\n\
            Benjamini-Hochberg when absent), prints a summary and writes the\n\
            features ranked by test statistic as a .rnk file."
    )]
    Results {
        /// Results table (CSV/TSV)
        #[arg(short, long)]
        results: String,

        /// Significance level for the summary
        #[arg(long, default_value_t = 0.05)]
        alpha: f64,

        /// Output .rnk file
        #[arg(long)]
        ranks: Option<String>,
    },
}
