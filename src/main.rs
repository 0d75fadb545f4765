use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use std::path::PathBuf;

use isomirgff::context::{sample_name, Config, RunContext};
use isomirgff::gff::AttrFormat;
use isomirgff::intersect::{find_bedtools, AnnotationIntersector, BedtoolsIntersector, Intersector};
use isomirgff::output::{output_path, write_gff_file};
use isomirgff::pipeline::read_file;
use isomirgff::reference::{MatureMap, PrecursorMap, ReferenceAnnotation};

/// isomirgff - Convert Manatee small-RNA alignments into mirGFF3
///
/// Reads are placed on their miRNA precursors, compared with the annotated
/// mature sequences and written as one isomiR annotation per unique read.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Manatee alignment files (plain, .gz or .bgz)
    #[clap(value_name = "FILE", required = true)]
    files: Vec<PathBuf>,

    /// Precursor (hairpin) sequences in FASTA
    #[clap(long = "hairpin")]
    hairpin: PathBuf,

    /// Reference annotation (miRBase GFF3) with primary transcripts and matures
    #[clap(long = "gtf")]
    gtf: PathBuf,

    /// Database name for column 2 of the output
    #[clap(long = "database", default_value = "miRBase")]
    database: String,

    /// Keep only precursors whose name starts with this species prefix
    #[clap(long = "sps")]
    sps: Option<String>,

    /// Output directory
    #[clap(short = 'o', long = "out")]
    out: PathBuf,

    /// Output attribute style: gff (key=value) or gtf (key value)
    #[clap(long = "out-format", default_value = "gff")]
    out_format: String,

    /// Add the nucleotide-level Changes attribute
    #[clap(long = "add-extra")]
    add_extra: bool,

    /// Write the read name instead of the sequence in the Read attribute
    #[clap(long = "keep-name")]
    keep_name: bool,

    /// Intersect with an external bedtools instead of in memory
    #[clap(long = "bedtools")]
    bedtools: bool,

    /// Verbose logging
    #[clap(short = 'v', long = "verbose")]
    verbose: bool,

    /// Quiet mode (warnings and errors only)
    #[clap(long = "quiet", conflicts_with = "verbose")]
    quiet: bool,
}

fn init_logging(args: &Args) {
    let level = if args.verbose {
        "debug"
    } else if args.quiet {
        "warn"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    let format = match args.out_format.to_lowercase().as_str() {
        "gff" | "gff3" => AttrFormat::Gff,
        "gtf" => AttrFormat::Gtf,
        other => bail!("Unknown output format '{}'. Use gff or gtf", other),
    };

    std::fs::create_dir_all(&args.out)
        .with_context(|| format!("Failed to create output directory {}", args.out.display()))?;

    let precursors = PrecursorMap::from_fasta(&args.hairpin, args.sps.as_deref())?;
    if precursors.is_empty() {
        bail!("No precursor sequences loaded from {}", args.hairpin.display());
    }
    let annotation = ReferenceAnnotation::from_gff(&args.gtf)?;
    let matures = MatureMap::from_annotation(&annotation);
    info!(
        "Loaded {} precursors and {} annotation features",
        precursors.len(),
        annotation.len()
    );

    let config = Config {
        out_dir: args.out.clone(),
        format,
        add_extra: args.add_extra,
        keep_name: args.keep_name,
        database: args.database.clone(),
    };

    let in_memory = AnnotationIntersector::new(&annotation)?;
    let external;
    let intersector: &dyn Intersector = if args.bedtools {
        external = BedtoolsIntersector::new(find_bedtools()?, args.gtf.clone());
        &external
    } else {
        &in_memory
    };

    for file in &args.files {
        let sample = sample_name(file);
        let ctx = RunContext::new(&config, &precursors, &matures, sample.clone());
        let store = read_file(file, &ctx, intersector)?;

        let path = output_path(&config.out_dir, &sample, config.format);
        let lines = write_gff_file(&path, &store, &config.database, &sample)?;
        info!("Wrote {} isomiR lines to {}", lines, path.display());
    }

    Ok(())
}
