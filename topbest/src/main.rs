use std::fs::File;
use std::io::{self, stdin, stdout, BufRead, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use clap::Parser;
use nbest_tune::{ScoreRecombiner, TopSelector, WeightVector};

#[derive(Parser, Debug)]
#[command(about = "A program to extract the best hypothesis of each segment from n-best lists.")]
struct Args {
    /// The n-best list. Reads stdin if omitted or `-`. `.zst` files are decompressed.
    #[arg(long)]
    nbest: Option<PathBuf>,

    /// Rescore each hypothesis with the [weight] section of this file before selection
    #[arg(long)]
    weights: Option<PathBuf>,
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

    let weights = match &args.weights {
        Some(path) => {
            eprintln!("Loading weights...");
            Some(WeightVector::read(open_input(Some(path))?)?)
        }
        None => None,
    };
    let recombiner = weights.as_ref().map(ScoreRecombiner::new);

    let rdr = open_input(args.nbest.as_deref())?;
    let wtr = BufWriter::new(stdout().lock());
    let n_segments = TopSelector::new().select_stream(rdr, wtr, recombiner.as_ref())?;
    eprintln!("# of segments: {}", n_segments);

    Ok(())
}
