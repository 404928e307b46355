use std::fs::File;
use std::io::{self, stdin, stdout, BufRead, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Parser;
use nbest_tune::{ScoreRecombiner, WeightVector};

#[derive(Parser, Debug)]
#[command(about = "A program to rescore n-best lists with a weight vector.")]
struct Args {
    /// A configuration file containing a [weight] section
    #[arg(long)]
    weights: PathBuf,

    /// The n-best list to rescore. Reads stdin if omitted or `-`. `.zst` files are decompressed.
    #[arg(long)]
    nbest: Option<PathBuf>,
}

fn open_input(path: Option<&Path>) -> io::Result<Box<dyn BufRead>> {
    match path {
        Some(path) if path.as_os_str() != "-" => {
            let f = File::open(path)?;
            if path.extension().map_or(false, |ext| ext == "zst") {
                Ok(Box::new(BufReader::new(zstd::Decoder::new(f)?)))
            } else {
                Ok(Box::new(BufReader::new(f)))
            }
        }
        _ => Ok(Box::new(BufReader::new(stdin()))),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    eprintln!("Loading weights...");
    let weights = WeightVector::read(open_input(Some(&args.weights))?)?;
    eprintln!("# of feature groups: {}", weights.len());

    let recombiner = ScoreRecombiner::new(&weights);

    eprintln!("Start rescoring");
    let start = Instant::now();
    let rdr = open_input(args.nbest.as_deref())?;
    let wtr = BufWriter::new(stdout().lock());
    let n_lines = recombiner.recombine_stream(rdr, wtr)?;
    let duration = start.elapsed();
    eprintln!("# of lines: {}", n_lines);
    eprintln!("Elapsed: {} [sec]", duration.as_secs_f64());

    Ok(())
}
