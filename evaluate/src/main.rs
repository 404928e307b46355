use std::fs::File;
use std::io::{self, stdin, BufRead, BufReader};
use std::path::{Path, PathBuf};

use clap::Parser;
use nbest_tune::{bleu, BleuScorer, BleuStatsExtractor, RefLengthPolicy};

#[derive(Parser, Debug)]
#[command(about = "A program to evaluate translations with BLEU.")]
struct Args {
    /// Reference translations, one sentence per line. Give the option once for each reference.
    #[arg(long = "ref", required = true)]
    references: Vec<PathBuf>,

    /// Translations to evaluate. Reads stdin if omitted or `-`.
    #[arg(long)]
    hyp: Option<PathBuf>,

    /// The maximum n-gram order
    #[arg(long, default_value = "4")]
    order: usize,

    /// Reference length used for the brevity penalty: {closest, shortest, average}.
    #[arg(long, default_value = "closest")]
    ref_length: RefLengthPolicy,

    /// Lowercase texts before counting n-grams.
    #[arg(long)]
    lowercase: bool,

    /// Print the smoothed BLEU of each sentence.
    #[arg(long)]
    sentence: bool,

    /// Print the statistics vector of each sentence.
    #[arg(long)]
    stats: bool,

    /// The smoothing constant of sentence-level BLEU
    #[arg(long, default_value = "1.0")]
    smoothing: f64,
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

fn read_lines(path: &Path) -> io::Result<Vec<String>> {
    open_input(Some(path))?.lines().collect()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let extractor = BleuStatsExtractor::with_order(args.order)?
        .ref_length_policy(args.ref_length)
        .lowercase(args.lowercase);
    let scorer = BleuScorer::with_order(args.order)?.smoothing(args.smoothing);

    eprintln!("Loading references...");
    let mut references: Vec<Vec<String>> = vec![];
    for path in &args.references {
        eprintln!("Loading {path:?} ...");
        let lines = read_lines(path)?;
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
    eprintln!("# of sentences: {}", references.len());

    let mut total = vec![0.; scorer.n_stats()];
    let mut n_sents = 0;
    for (i, line) in open_input(args.hyp.as_deref())?.lines().enumerate() {
        let line = line?;
        let refs = references.get(i).ok_or_else(|| {
            format!(
                "the translation has more lines than the references ({})",
                references.len()
            )
        })?;
        let stats = extractor.stats(&extractor.reference(refs.as_slice()), &line);
        if args.stats {
            let values: Vec<_> = stats.iter().map(|v| v.to_string()).collect();
            println!("{}", values.join(" "));
        }
        if args.sentence {
            println!("{}", scorer.score(&stats)?);
        }
        bleu::add_stats(&mut total, &stats)?;
        n_sents += 1;
    }
    if n_sents != references.len() {
        return Err(format!(
            "the translation has {} lines, but the references have {}",
            n_sents,
            references.len()
        )
        .into());
    }

    let corpus_bleu = scorer.corpus_score(&total)?;
    let ref_len = total[args.order * 2];
    let hyp_len = total[1];
    let precisions: Vec<_> = (0..args.order)
        .map(|j| {
            if total[2 * j + 1] == 0. {
                0.
            } else {
                total[2 * j] / total[2 * j + 1] * 100.
            }
        })
        .map(|p| format!("{:.1}", p))
        .collect();
    println!("BLEU: {:.2}", corpus_bleu * 100.);
    println!("Precisions: {}", precisions.join("/"));
    println!("Length: hyp {}, ref {}", hyp_len, ref_len);

    Ok(())
}
