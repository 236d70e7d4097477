//! ribo_te command-line interface

use std::path::PathBuf;

use clap::Parser;
use log::{info, LevelFilter};

use ribo_te::cli::{Cli, Commands};
use ribo_te::diff::{read_diff_results, write_diff_input, write_ranks};
use ribo_te::io::write_interval_lengths;
use ribo_te::prelude::*;
use ribo_te::reconcile::{AmbiguityPolicy, CandidateScan};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() {
    let args: Vec<String> = std::env::args().collect();

    // Find the first non-flag argument (potential subcommand)
    let first_positional = args.iter().skip(1).find(|a| !a.starts_with('-'));
    let subcommands = [
        "run", "reconcile", "assemble", "normalize", "detect", "te", "prepare-de", "results", "help",
    ];
    let has_subcommand = first_positional.map_or(false, |a| subcommands.contains(&a.as_str()));

    if !has_subcommand {
        if args.len() == 1 {
            print_no_args();
            return;
        }
        if args.iter().any(|a| a == "--help") {
            print_long_help();
            return;
        }
        if args.iter().any(|a| a == "-h") {
            print_short_help();
            return;
        }
        if args.iter().any(|a| a == "-V" || a == "--version") {
            println!("ribo_te {}", VERSION);
            return;
        }
        print_no_args();
        return;
    }

    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    if cli.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(cli.threads)
            .build_global()
            .ok();
    }

    let result = match cli.command {
        Some(Commands::Run {
            config,
            overwrite,
            output,
        }) => run_config(&config, overwrite, output.as_deref()),
        Some(Commands::Reconcile {
            metadata,
            quant,
            library,
            metadata_columns,
            ambiguity,
            lanes,
            output,
        }) => run_reconcile(
            &metadata,
            &quant,
            &library,
            metadata_columns,
            &ambiguity,
            lanes,
            output.as_deref(),
        ),
        Some(Commands::Assemble {
            metadata,
            library,
            quant,
            cds_quant,
            suffix,
            metadata_columns,
            strict_order,
            output,
            lengths_out,
        }) => run_assemble(
            &metadata,
            &library,
            &quant,
            &cds_quant,
            &suffix,
            metadata_columns,
            strict_order,
            &output,
            lengths_out.as_deref(),
        ),
        Some(Commands::Normalize {
            counts,
            lengths,
            unit,
            min_mean,
            output,
        }) => run_normalize(&counts, &lengths, &unit, min_mean, &output),
        Some(Commands::Detect {
            abundance,
            unit,
            threshold,
            min_samples,
            annotation,
            output,
            summary,
        }) => run_detect(
            &abundance,
            &unit,
            threshold,
            min_samples,
            annotation.as_deref(),
            &output,
            summary.as_deref(),
        ),
        Some(Commands::Te {
            ppm,
            tpm,
            pseudocount,
            centering,
            output,
        }) => run_te(&ppm, &tpm, pseudocount, &centering, &output),
        Some(Commands::PrepareDe {
            counts,
            metadata,
            design,
            numerator,
            denominator,
            output,
        }) => run_prepare_de(
            &counts,
            &metadata,
            &design,
            numerator.as_deref(),
            denominator.as_deref(),
            &output,
        ),
        Some(Commands::Results {
            results,
            alpha,
            ranks,
        }) => run_results(&results, alpha, ranks.as_deref()),
        None => {
            print_no_args();
            return;
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

// ---------------------------------------------------------------------------
// Custom help output
// ---------------------------------------------------------------------------

fn print_no_args() {
    println!("ribo_te v{}", VERSION);
    println!("Run `ribo_te -h` for usage or `ribo_te --help` for detailed information.");
}

fn print_short_help() {
    println!("ribo_te v{}", VERSION);
    println!();
    println!("Usage: ribo_te <COMMAND> [OPTIONS]");
    println!();
    println!("Commands:");
    println!("  run         Run the whole pipeline from a JSON configuration");
    println!("  reconcile   Map quantifier columns to sample IDs");
    println!("  assemble    Build a sample-keyed count matrix");
    println!("  normalize   Normalize counts to TPM or PPM");
    println!("  detect      Call translated features");
    println!("  te          Compute translational efficiency");
    println!("  prepare-de  Write inputs for a differential-testing engine");
    println!("  results     Summarize engine results and export a ranking");
    println!();
    println!("Run `ribo_te <COMMAND> --help` for command-specific options.");
}

fn print_long_help() {
    println!("ribo_te v{}", VERSION);
    println!("Translational efficiency from paired RNA-seq and Ribo-seq counts");
    println!();
    println!("Usage: ribo_te <COMMAND> [OPTIONS]");
    println!();
    println!("Commands:");
    println!("  run         Run the whole pipeline from a JSON configuration");
    println!("                - identifier reconciliation and lane collapse");
    println!("                - PPM / TPM normalization");
    println!("                - translation detection with per-category summary");
    println!("                - TE (raw, log2, centered)");
    println!("  reconcile   Map quantifier columns to sample IDs");
    println!("  assemble    Build a sample-keyed count matrix from quantifier tables");
    println!("  normalize   Normalize a count matrix to TPM or PPM");
    println!("  detect      Call translated (or expressed) features");
    println!("  te          Compute translational efficiency from PPM and TPM");
    println!("  prepare-de  Write counts, coldata and design for an external engine");
    println!("  results     Summarize an engine results table and export a .rnk ranking");
    println!();
    println!("Global Options:");
    println!("  -v, --verbose    Enable verbose output");
    println!("  -t, --threads    Number of worker threads (0 = all cores)");
    println!("  -h               Print short help");
    println!("      --help       Print detailed help");
    println!("  -V, --version    Print version");
    println!();
    println!("Examples:");
    println!("  ribo_te run --config pipeline.json");
    println!();
    println!("  ribo_te assemble -m samples.tsv --library ribo -q ribo_orfs.tsv \\");
    println!("    --cds-quant ribo_cds.tsv -o ribo_counts.csv --lengths-out lengths.tsv");
    println!();
    println!("  ribo_te te --ppm ppm.csv --tpm tpm.csv -o te_out --pseudocount 0.1");
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn parse_library(library: &str) -> Result<LibraryType> {
    match library {
        "rna" | "rnaseq" => Ok(LibraryType::Rna),
        "ribo" | "riboseq" => Ok(LibraryType::Ribo),
        _ => Err(TeError::InvalidInput {
            reason: format!("Unknown library '{}'. Use 'rna' or 'ribo'.", library),
        }),
    }
}

fn parse_centering(centering: &str) -> Result<Centering> {
    match centering {
        "median" => Ok(Centering::Median),
        "mean-sd" | "mean_sd" => Ok(Centering::MeanSd),
        "none" => Ok(Centering::None),
        _ => Err(TeError::InvalidInput {
            reason: format!(
                "Unknown centering '{}'. Use 'median', 'mean-sd' or 'none'.",
                centering
            ),
        }),
    }
}

fn quant_spec(metadata_columns: usize) -> QuantTableSpec {
    if metadata_columns == 0 {
        QuantTableSpec::plain()
    } else {
        QuantTableSpec {
            n_metadata_columns: metadata_columns,
            ..QuantTableSpec::default()
        }
    }
}

fn read_abundance(path: &str, unit: AbundanceUnit) -> Result<AbundanceMatrix> {
    info!("Loading {} matrix from: {}", unit, path);
    let (values, feature_ids, sample_ids) = read_count_matrix(path)?.into_parts();
    AbundanceMatrix::new(values, feature_ids, sample_ids, unit)
}

fn run_config(config_path: &str, overwrite: bool, output: Option<&str>) -> Result<()> {
    info!("Loading configuration from: {}", config_path);
    let mut config = PipelineConfig::from_json_file(config_path)?;
    config.overwrite |= overwrite;
    if let Some(dir) = output {
        config.output_dir = PathBuf::from(dir);
    }
    let summary = run_pipeline(&config)?;
    info!(
        "Done! {} outputs written, {} skipped, in {}",
        summary.written.len(),
        summary.skipped.len(),
        config.output_dir.display()
    );
    Ok(())
}

fn run_reconcile(
    metadata_path: &str,
    quant_path: &str,
    library: &str,
    metadata_columns: usize,
    ambiguity: &str,
    lanes: bool,
    output: Option<&str>,
) -> Result<()> {
    let library = parse_library(library)?;
    let ambiguity = match ambiguity {
        "error" => AmbiguityPolicy::Error,
        "first" | "first_in_table" => AmbiguityPolicy::FirstInTable,
        _ => {
            return Err(TeError::InvalidInput {
                reason: format!("Unknown ambiguity policy '{}'. Use 'error' or 'first'.", ambiguity),
            })
        }
    };
    let params = ReconcileParams {
        ambiguity,
        scan: if lanes { CandidateScan::AllPerRow } else { CandidateScan::FirstPerRow },
        allow_shared_samples: lanes,
        ..ReconcileParams::default()
    };

    info!("Loading sample table from: {}", metadata_path);
    let metadata = read_metadata(metadata_path, &MetadataTableSpec::default())?;
    let table = read_quant_table(quant_path, &quant_spec(metadata_columns))?;
    let raw = ribo_te::assemble::to_candidates(&table.counts, &params)?;
    let mapping = reconcile(raw.sample_ids(), &metadata, library, &params)?;

    let mut writer = match output {
        Some(path) => csv::Writer::from_writer(Box::new(std::fs::File::create(path)?) as Box<dyn std::io::Write>),
        None => csv::Writer::from_writer(Box::new(std::io::stdout()) as Box<dyn std::io::Write>),
    };
    writer.write_record(["candidate", "sample_id"])?;
    for m in mapping.mapped() {
        writer.write_record([m.candidate.as_str(), m.sample_id.as_str()])?;
    }
    writer.flush()?;

    info!(
        "{} candidates mapped, {} unmatched",
        mapping.len(),
        mapping.unmatched().len()
    );
    Ok(())
}

fn run_assemble(
    metadata_path: &str,
    library: &str,
    quant: &[String],
    cds_quant: &[String],
    suffix: &str,
    metadata_columns: usize,
    strict_order: bool,
    output_path: &str,
    lengths_out: Option<&str>,
) -> Result<()> {
    let library = parse_library(library)?;
    if quant.is_empty() && cds_quant.is_empty() {
        return Err(TeError::InvalidInput {
            reason: "at least one --quant or --cds-quant table is required".to_string(),
        });
    }

    let spec = quant_spec(metadata_columns);
    let inputs: Vec<QuantInput> = quant
        .iter()
        .map(|p| (p, None))
        .chain(cds_quant.iter().map(|p| (p, Some(suffix.to_string()))))
        .map(|(p, feature_suffix)| QuantInput {
            path: PathBuf::from(p),
            spec: spec.clone(),
            feature_suffix,
        })
        .collect();

    info!("Loading sample table from: {}", metadata_path);
    let metadata = read_metadata(metadata_path, &MetadataTableSpec::default())?;
    let order = if strict_order { ColumnOrder::Strict } else { ColumnOrder::Reorder };
    let (counts, lengths) =
        assemble_library(&inputs, &metadata, library, &ReconcileParams::default(), order)?;

    info!("Writing counts to: {}", output_path);
    write_count_matrix(output_path, &counts)?;
    if let Some(path) = lengths_out {
        info!("Writing {} feature lengths to: {}", lengths.len(), path);
        write_interval_lengths(path, &lengths)?;
    }
    info!("Done!");
    Ok(())
}

fn run_normalize(
    counts_path: &str,
    lengths_path: &str,
    unit: &str,
    min_mean: Option<f64>,
    output_path: &str,
) -> Result<()> {
    let unit: AbundanceUnit = unit.parse()?;

    info!("Loading count matrix from: {}", counts_path);
    let mut counts = read_count_matrix(counts_path)?;
    info!("  {} features, {} samples", counts.n_features(), counts.n_samples());
    if let Some(threshold) = min_mean {
        counts = counts.filter_min_mean(threshold)?;
        info!("  {} features with mean count > {}", counts.n_features(), threshold);
    }

    let lengths = read_interval_lengths(lengths_path)?;
    let abundance = ribo_te::normalization::normalize_abundance(&counts, &lengths, unit)?;

    info!("Writing {} to: {}", unit, output_path);
    write_matrix(
        output_path,
        abundance.feature_ids(),
        abundance.sample_ids(),
        abundance.values(),
    )?;
    info!("Done!");
    Ok(())
}

fn run_detect(
    abundance_path: &str,
    unit: &str,
    threshold: f64,
    min_samples: usize,
    annotation_path: Option<&str>,
    output_path: &str,
    summary_path: Option<&str>,
) -> Result<()> {
    let abundance = read_abundance(abundance_path, unit.parse()?)?;
    let annotation = match annotation_path {
        Some(path) => Some(read_feature_annotation(path, &AnnotationTableSpec::default())?),
        None => None,
    };
    let params = DetectionParams {
        threshold,
        min_samples,
    };
    let detection = detect_translated(&abundance, annotation.as_ref(), &params);

    info!("Writing detection calls to: {}", output_path);
    detection.write_csv(output_path)?;
    if let Some(path) = summary_path {
        detection.write_category_summary(path)?;
    }
    for row in detection.summarize_by_category() {
        info!("  {}: {} of {} detected", row.category, row.detected, row.total);
    }
    Ok(())
}

fn run_te(
    ppm_path: &str,
    tpm_path: &str,
    pseudocount: f64,
    centering: &str,
    output_dir: &str,
) -> Result<()> {
    let params = TeParams {
        pseudocount,
        centering: parse_centering(centering)?,
        ..TeParams::default()
    };
    let occupancy = read_abundance(ppm_path, AbundanceUnit::Ppm)?;
    let transcript = read_abundance(tpm_path, AbundanceUnit::Tpm)?;
    let (occupancy, transcript) = intersect_inputs(&occupancy, &transcript)?;
    let te = translational_efficiency(&occupancy, &transcript, &params)?;

    let dir = PathBuf::from(output_dir);
    std::fs::create_dir_all(&dir)?;
    info!("Writing TE matrices to: {}", dir.display());
    write_matrix(dir.join("te.csv"), &te.feature_ids, &te.sample_ids, te.raw.view())?;
    write_matrix(dir.join("te_log2.csv"), &te.feature_ids, &te.sample_ids, te.log2.view())?;
    if let Some(centered) = &te.centered {
        write_matrix(dir.join("te_centered.csv"), &te.feature_ids, &te.sample_ids, centered.view())?;
    }
    info!("Done!");
    Ok(())
}

fn run_prepare_de(
    counts_path: &str,
    metadata_path: &str,
    design: &[String],
    numerator: Option<&str>,
    denominator: Option<&str>,
    output_dir: &str,
) -> Result<()> {
    let variables: Vec<&str> = design.iter().map(|s| s.as_str()).collect();
    let mut diff_design = DiffDesign::new(&variables);
    match (numerator, denominator, variables.last()) {
        (Some(num), Some(den), Some(var)) => {
            diff_design = diff_design.with_contrast(var, num, den);
        }
        (None, None, _) => {}
        _ => {
            return Err(TeError::InvalidInput {
                reason: "--numerator and --denominator must be given together".to_string(),
            })
        }
    }

    info!("Loading count matrix from: {}", counts_path);
    let counts = read_count_matrix(counts_path)?;
    info!("Loading sample table from: {}", metadata_path);
    let metadata = read_metadata(metadata_path, &MetadataTableSpec::default())?;

    let input = write_diff_input(output_dir, &counts, &metadata, &diff_design)?;
    info!(
        "Done! {} features x {} samples, design {}",
        input.counts.n_features(),
        input.counts.n_samples(),
        diff_design.formula()
    );
    Ok(())
}

fn run_results(results_path: &str, alpha: f64, ranks_path: Option<&str>) -> Result<()> {
    let results = read_diff_results(results_path)?;
    print!("{}", results.summary(alpha));
    if let Some(path) = ranks_path {
        let ranks = results.ranked_statistics();
        info!("Writing {} ranked features to: {}", ranks.len(), path);
        write_ranks(path, &ranks)?;
    }
    Ok(())
}
