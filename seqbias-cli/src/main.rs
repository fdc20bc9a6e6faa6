//! # seqbias - sequencing bias estimation from the command line
//!
//! ## Usage
//!
//! ```bash
//! # Train a model from a reference and an indexed BAM
//! seqbias fit -r genome.fa -b reads.bam -o model.yml
//!
//! # Per-base bias over an interval (1-based, inclusive)
//! seqbias predict -r genome.fa -m model.yml --region chr1:10000-11000 --strand +
//!
//! # Bias-corrected read counts over an interval
//! seqbias count -b reads.bam --region chr1:10000-11000 --strand + \
//!     -r genome.fa -m model.yml
//! ```
//!
//! `fit` prints a summary of the learned dependency structure to stderr;
//! `predict` and `count` print one value per interval position to stdout.

use std::error::Error;

use clap::{Arg, ArgAction, ArgMatches, Command};
use seqbias_core::types::strand_from_char;
use seqbias_core::{count_reads, count_reads_total, BiasConfig, SequencingBias};

fn cli() -> Command {
    let region = Arg::new("region")
        .long("region")
        .value_name("SEQ:START-END")
        .required(true)
        .help("1-based inclusive interval, e.g. chr1:10000-11000");
    let strand = Arg::new("strand")
        .long("strand")
        .value_name("STRAND")
        .help("Restrict to one strand: + or -");

    Command::new("seqbias")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Sequence composition bias estimation for short-read alignments")
        .subcommand_required(true)
        .subcommand(
            Command::new("fit")
                .about("Train a bias model from a reference FASTA and a BAM")
                .arg(
                    Arg::new("reference")
                        .short('r')
                        .long("reference")
                        .value_name("FILE")
                        .required(true)
                        .help("Indexed reference FASTA"),
                )
                .arg(
                    Arg::new("reads")
                        .short('b')
                        .long("reads")
                        .value_name("FILE")
                        .required(true)
                        .help("BAM file of aligned reads"),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("FILE")
                        .required(true)
                        .help("Output model file (YAML)"),
                )
                .arg(
                    Arg::new("left")
                        .short('L')
                        .long("left")
                        .value_name("N")
                        .help("Window positions left of the read start"),
                )
                .arg(
                    Arg::new("right")
                        .short('R')
                        .long("right")
                        .value_name("N")
                        .help("Window positions right of the read start"),
                )
                .arg(
                    Arg::new("max-reads")
                        .short('n')
                        .long("max-reads")
                        .value_name("N")
                        .help("Maximum read positions used for training"),
                )
                .arg(
                    Arg::new("penalty")
                        .long("penalty")
                        .value_name("P")
                        .help("Complexity penalty per added parameter"),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .value_name("SEED")
                        .help("Seed for the training random number generator"),
                )
                .arg(
                    Arg::new("quiet")
                        .short('q')
                        .long("quiet")
                        .action(ArgAction::SetTrue)
                        .help("Suppress the structure summary"),
                ),
        )
        .subcommand(
            Command::new("predict")
                .about("Per-base bias over an interval")
                .arg(
                    Arg::new("reference")
                        .short('r')
                        .long("reference")
                        .value_name("FILE")
                        .required(true)
                        .help("Indexed reference FASTA the model was trained against"),
                )
                .arg(
                    Arg::new("model")
                        .short('m')
                        .long("model")
                        .value_name("FILE")
                        .required(true)
                        .help("Model file written by fit"),
                )
                .arg(region.clone())
                .arg(strand.clone().required(true)),
        )
        .subcommand(
            Command::new("count")
                .about("Read counts over an interval, optionally bias-corrected")
                .arg(
                    Arg::new("reads")
                        .short('b')
                        .long("reads")
                        .value_name("FILE")
                        .required(true)
                        .help("Indexed BAM file of aligned reads"),
                )
                .arg(
                    Arg::new("reference")
                        .short('r')
                        .long("reference")
                        .value_name("FILE")
                        .requires("model")
                        .help("Reference FASTA (required with --model)"),
                )
                .arg(
                    Arg::new("model")
                        .short('m')
                        .long("model")
                        .value_name("FILE")
                        .requires("reference")
                        .help("Bias model; counts are divided by its prediction"),
                )
                .arg(region)
                .arg(strand)
                .arg(
                    Arg::new("binary")
                        .long("binary")
                        .action(ArgAction::SetTrue)
                        .help("Count each position at most once"),
                )
                .arg(
                    Arg::new("sum")
                        .long("sum")
                        .action(ArgAction::SetTrue)
                        .help("Print the interval total instead of per-base counts"),
                ),
        )
}

/// Parse `seq:start-end` with 1-based inclusive coordinates.
fn parse_region(region: &str) -> Result<(String, i64, i64), Box<dyn Error>> {
    let (name, range) = region
        .rsplit_once(':')
        .ok_or("region must look like seq:start-end")?;
    let (start, end) = range
        .split_once('-')
        .ok_or("region must look like seq:start-end")?;
    let start: i64 = start.replace(',', "").parse()?;
    let end: i64 = end.replace(',', "").parse()?;
    Ok((name.to_string(), start, end))
}

fn run_fit(matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let mut config = BiasConfig::default();
    if let Some(left) = matches.get_one::<String>("left") {
        config.left = left.parse()?;
    }
    if let Some(right) = matches.get_one::<String>("right") {
        config.right = right.parse()?;
    }
    if let Some(max_reads) = matches.get_one::<String>("max-reads") {
        config.max_reads = max_reads.parse()?;
    }
    if let Some(penalty) = matches.get_one::<String>("penalty") {
        config.complexity_penalty = penalty.parse()?;
    }
    if let Some(seed) = matches.get_one::<String>("seed") {
        config.seed = Some(seed.parse()?);
    }

    let reference = matches.get_one::<String>("reference").unwrap();
    let reads = matches.get_one::<String>("reads").unwrap();
    let output = matches.get_one::<String>("output").unwrap();

    let model = SequencingBias::fit(reference, reads, &config)?;
    model.save(output)?;

    if !matches.get_flag("quiet") {
        eprint!("{}", model.motif().structure_report(model.left()));
        eprintln!("model written to {output}");
    }
    Ok(())
}

fn run_predict(matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let reference = matches.get_one::<String>("reference").unwrap();
    let model_path = matches.get_one::<String>("model").unwrap();
    let (seqname, start, end) = parse_region(matches.get_one::<String>("region").unwrap())?;
    let strand_text = matches.get_one::<String>("strand").unwrap();
    let strand = strand_from_char(single_char(strand_text)?)?;

    let model = SequencingBias::load(reference, model_path)?;
    let bias = model.predict(&seqname, start, end, strand)?;
    for value in bias {
        println!("{value}");
    }
    Ok(())
}

fn run_count(matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let reads = matches.get_one::<String>("reads").unwrap();
    let (seqname, start, end) = parse_region(matches.get_one::<String>("region").unwrap())?;
    let strand = match matches.get_one::<String>("strand") {
        Some(text) => Some(strand_from_char(single_char(text)?)?),
        None => None,
    };
    let binary = matches.get_flag("binary");

    let model = match matches.get_one::<String>("model") {
        Some(model_path) => {
            let reference = matches
                .get_one::<String>("reference")
                .ok_or("--model requires --reference")?;
            Some(SequencingBias::load(reference, model_path)?)
        }
        None => None,
    };

    if matches.get_flag("sum") {
        let total = count_reads_total(
            reads,
            model.as_ref(),
            &seqname,
            start,
            end,
            strand,
            binary,
        )?;
        println!("{total}");
    } else {
        let counts = count_reads(
            reads,
            model.as_ref(),
            &seqname,
            start,
            end,
            strand,
            binary,
        )?;
        for value in counts {
            println!("{value}");
        }
    }
    Ok(())
}

fn single_char(text: &str) -> Result<char, Box<dyn Error>> {
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err("strand must be a single character".into()),
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = cli().get_matches();
    match matches.subcommand() {
        Some(("fit", sub)) => run_fit(sub),
        Some(("predict", sub)) => run_predict(sub),
        Some(("count", sub)) => run_count(sub),
        _ => unreachable!("subcommand required"),
    }
}
