use std::fs::File;
use std::io::{self, prelude::*, stdin, stdout, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use clap::Parser;
use nbest_tune::{
    BleuScorer, BleuStatsExtractor, Grouping, NBestList, PairwiseSampler, RefLengthPolicy,
    SamplerConfig,
};
use rand::{rngs::StdRng, SeedableRng};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(about = "A program to sample hypothesis pairs for pairwise ranking optimization.")]
struct Args {
    /// The n-best list. Reads stdin if omitted or `-`. `.zst` files are decompressed.
    #[arg(long)]
    nbest: Option<PathBuf>,

    /// Reference translations, one sentence per line. Give the option once for each reference.
    /// Segment IDs of the n-best list are line indices of these files.
    #[arg(long = "ref", required_unless_present = "use_model_score")]
    references: Vec<PathBuf>,

    /// Use the score field of the n-best list instead of sentence-level BLEU.
    #[arg(long)]
    use_model_score: bool,

    /// The number of pairs drawn
    #[arg(long, default_value = "5000")]
    candidate_pool_size: usize,

    /// The maximum number of pairs kept
    #[arg(long, default_value = "50")]
    sample_size: usize,

    /// Pairs whose score difference is below this value are rejected
    #[arg(long, default_value = "0.05")]
    min_diff: f64,

    /// How hypotheses are pooled: {flat, segment}.
    /// flat: draws pairs from all hypotheses.
    /// segment: draws pairs within each segment.
    #[arg(long, default_value = "flat")]
    grouping: Grouping,

    /// The random seed
    #[arg(long, default_value = "1")]
    seed: u64,

    /// The maximum n-gram order of BLEU
    #[arg(long, default_value = "4")]
    order: usize,

    /// Reference length used for the brevity penalty: {closest, shortest, average}.
    #[arg(long, default_value = "closest")]
    ref_length: RefLengthPolicy,

    /// Lowercase texts before counting n-grams.
    #[arg(long)]
    lowercase: bool,

    /// The smoothing constant of sentence-level BLEU
    #[arg(long, default_value = "1.0")]
    smoothing: f64,

    /// Write the sampled pairs to this CSV file.
    #[arg(long)]
    dump_samples: Option<PathBuf>,
}

#[derive(Serialize)]
struct SampleRecord<'a> {
    segment1: &'a str,
    text1: &'a str,
    score1: f64,
    segment2: &'a str,
    text2: &'a str,
    score2: f64,
    diff: f64,
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

fn load_references(paths: &[PathBuf]) -> Result<Vec<Vec<String>>, Box<dyn std::error::Error>> {
    let mut references: Vec<Vec<String>> = vec![];
    for path in paths {
        eprintln!("Loading {path:?} ...");
        let lines = open_input(Some(path))?
            .lines()
            .collect::<io::Result<Vec<_>>>()?;
        if references.is_empty() {
            references = lines.into_iter().map(|line| vec![line]).collect();
        } else if references.len() != lines.len() {
            return Err(format!(
                "{path:?} has {} lines, but the first reference has {}",
                lines.len(),
                references.len()
            )
            .into());
        } else {
            for (refs, line) in references.iter_mut().zip(lines) {
                refs.push(line);
            }
        }
    }
    Ok(references)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = SamplerConfig {
        candidate_pool_size: args.candidate_pool_size,
        sample_size: args.sample_size,
        min_diff: args.min_diff,
        grouping: args.grouping,
    };
    let mut sampler = PairwiseSampler::new(config, StdRng::seed_from_u64(args.seed))?;

    eprintln!("Loading n-best list...");
    let mut nbest = NBestList::read(open_input(args.nbest.as_deref())?)?;
    eprintln!(
        "# of hypotheses: {}, # of segments: {}",
        nbest.len(),
        nbest.n_segments()
    );

    if !args.use_model_score {
        let references = load_references(&args.references)?;
        let extractor = BleuStatsExtractor::with_order(args.order)?
            .ref_length_policy(args.ref_length)
            .lowercase(args.lowercase);
        let scorer = BleuScorer::with_order(args.order)?.smoothing(args.smoothing);

        eprintln!("Scoring hypotheses...");
        nbest.score_with_references(&references, &extractor, &scorer)?;
    }

    eprintln!("Sampling pairs...");
    let samples = sampler.sample_list(&nbest);
    eprintln!("# of samples: {}", samples.len());

    let mut wtr = BufWriter::new(stdout().lock());
    for sample in &samples {
        if let Some([first, second]) = sample.training_pair() {
            writeln!(wtr, "{}", first)?;
            writeln!(wtr, "{}", second)?;
        }
    }
    wtr.flush()?;

    if let Some(path) = args.dump_samples {
        eprintln!("Saving samples...");
        let mut wtr = csv::Writer::from_writer(File::create(path)?);
        for sample in &samples {
            wtr.serialize(SampleRecord {
                segment1: sample.hyp1().segment_id(),
                text1: sample.hyp1().text(),
                score1: sample.hyp1().score(),
                segment2: sample.hyp2().segment_id(),
                text2: sample.hyp2().text(),
                score2: sample.hyp2().score(),
                diff: sample.diff(),
            })?;
        }
        wtr.flush()?;
    }

    Ok(())
}
