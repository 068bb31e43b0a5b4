use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::Args;
use tracing::{error, info, info_span};

use nnlat_core::lattice::read_slf_file;
use nnlat_core::output::OutputFormat;
use nnlat_core::settings::{default_config, load_settings_file, ConfigError};
use nnlat_core::{DecoderConfig, LatticeDecoder};

/// Vocabulary file inside a model directory.
pub const VOCABULARY_FILE: &str = "vocabulary.txt";

#[derive(Debug, Clone, Args)]
pub struct DecodeArgs {
    /// Model directory (config.json, model.safetensors, vocabulary.txt)
    pub model_dir: PathBuf,
    /// Word lattice files to decode
    #[arg(long, num_args = 1..)]
    pub lattices: Vec<String>,
    /// File listing lattice paths, one per line
    #[arg(long)]
    pub lattice_list: Option<PathBuf>,
    /// Output file (default: stdout)
    #[arg(long)]
    pub output_file: Option<PathBuf>,
    /// Split the lattices into this many jobs
    #[arg(long, default_value = "1")]
    pub num_jobs: usize,
    /// Job to run, counting from 0
    #[arg(long, default_value = "0")]
    pub job: usize,
    /// Output format: ref, trn or full
    #[arg(long, default_value = "ref")]
    pub output: OutputFormat,
    /// Hypotheses to write per lattice
    #[arg(long, default_value = "1")]
    pub n_best: usize,
    /// Decoding settings file (see settings-export)
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Weight of the network LM against the lattice LM
    #[arg(long)]
    pub nnlm_weight: Option<f64>,
    /// LM scale (default: from the lattice)
    #[arg(long)]
    pub lm_scale: Option<f64>,
    /// Word insertion penalty in the output log base (default: from the lattice)
    #[arg(long, allow_negative_numbers = true)]
    pub wi_penalty: Option<f64>,
    /// Write scores in this log base and read --wi-penalty in it
    #[arg(long)]
    pub log_base: Option<f64>,
    /// Log-probability of out-of-shortlist words
    #[arg(long, allow_negative_numbers = true)]
    pub unk_penalty: Option<f64>,
    /// Distribute <unk> probability by unigram counts (needs --unigrams)
    #[arg(long)]
    pub shortlist: bool,
    /// Unigram counts file (`word count` per line)
    #[arg(long)]
    pub unigrams: Option<PathBuf>,
    /// Use the lattice LM score for out-of-shortlist words
    #[arg(long)]
    pub unk_from_lattice: bool,
    /// Interpolate probabilities linearly instead of log-linearly
    #[arg(long)]
    pub linear_interpolation: bool,
    #[arg(long)]
    pub max_tokens_per_node: Option<usize>,
    #[arg(long)]
    pub beam: Option<f64>,
    /// History words that decide recombination
    #[arg(long)]
    pub recombination_order: Option<usize>,
}

/// Decoder configuration from the settings file (or built-in defaults) with
/// command-line overrides, and the output log scale.
pub fn build_config(args: &DecodeArgs) -> Result<(DecoderConfig, f64), ConfigError> {
    let mut config = match &args.config {
        Some(path) => load_settings_file(path)?,
        None => default_config(),
    };

    let log_scale = match args.log_base {
        None => 1.0,
        Some(base) if base > 0.0 && base != 1.0 && base.is_finite() => base.ln(),
        Some(_) => {
            return Err(ConfigError::InvalidValue {
                field: "log_base".to_string(),
                reason: "must be positive and not 1".to_string(),
            })
        }
    };

    if let Some(w) = args.nnlm_weight {
        config.nnlm_weight = w;
    }
    if args.lm_scale.is_some() {
        config.lm_scale = args.lm_scale;
    }
    if let Some(wip) = args.wi_penalty {
        config.wi_penalty = Some(wip * log_scale);
    }
    if args.unk_penalty.is_some() {
        config.unk_penalty = args.unk_penalty;
    }
    if args.max_tokens_per_node.is_some() {
        config.max_tokens_per_node = args.max_tokens_per_node;
    }
    if args.beam.is_some() {
        config.beam = args.beam;
    }
    if args.recombination_order.is_some() {
        config.recombination_order = args.recombination_order;
    }
    config.use_shortlist |= args.shortlist;
    config.unk_from_lattice |= args.unk_from_lattice;
    config.linear_interpolation |= args.linear_interpolation;

    config.validate()?;
    Ok((config, log_scale))
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DecodeSummary {
    pub decoded: usize,
    pub failed: usize,
}

/// Decode every lattice in `paths` and write the best `n_best` hypotheses
/// of each. A lattice that cannot be read or decoded is logged and skipped.
pub fn decode_lattices<W: Write>(
    decoder: &LatticeDecoder<'_>,
    paths: &[String],
    job: usize,
    format: OutputFormat,
    n_best: usize,
    log_scale: f64,
    out: &mut W,
) -> io::Result<DecodeSummary> {
    let mut summary = DecodeSummary::default();
    for (index, path) in paths.iter().enumerate() {
        info!(path = path.as_str(), "reading word lattice");
        let lattice = match read_slf_file(Path::new(path)) {
            Ok(lattice) => lattice,
            Err(e) => {
                error!(path = path.as_str(), error = %e, "skipping unreadable lattice");
                summary.failed += 1;
                continue;
            }
        };
        let utterance_id = lattice.utterance_id.clone().unwrap_or_else(|| path.clone());
        let _span = info_span!("utterance", id = utterance_id.as_str()).entered();
        info!(index = index + 1, total = paths.len(), job, "decoding");

        let tokens = match decoder.decode(&lattice) {
            Ok(tokens) => tokens,
            Err(e) => {
                error!(error = %e, "decoding failed");
                summary.failed += 1;
                continue;
            }
        };
        for token in tokens.iter().take(n_best.max(1)) {
            writeln!(
                out,
                "{}",
                format.render(token, decoder.vocabulary(), &utterance_id, log_scale)
            )?;
        }
        summary.decoded += 1;
    }
    out.flush()?;
    Ok(summary)
}

#[cfg(feature = "neural")]
pub fn decode_cmd(args: &DecodeArgs) {
    use std::fs::File;
    use std::io::{BufReader, BufWriter};

    use nnlat_core::neural::RnnLm;
    use nnlat_core::Vocabulary;

    use super::lattice_list::{collect_paths, select_job};

    let (config, log_scale) = die!(build_config(args), "Error: {}");

    let mut vocabulary = die!(
        Vocabulary::open(&args.model_dir.join(VOCABULARY_FILE)),
        "Error reading vocabulary: {}"
    );
    if let Some(path) = &args.unigrams {
        die!(
            vocabulary.open_unigram_counts(path),
            "Error reading unigram counts: {}"
        );
    }
    info!(
        words = vocabulary.num_words(),
        classes = vocabulary.num_classes(),
        "vocabulary loaded"
    );

    let model = die!(RnnLm::open(&args.model_dir), "Error loading model: {}");
    if vocabulary.num_classes() > model.num_classes() {
        eprintln!(
            "Error: vocabulary has {} classes but the network predicts {}",
            vocabulary.num_classes(),
            model.num_classes()
        );
        std::process::exit(1);
    }

    let decoder = die!(
        LatticeDecoder::new(&model, &vocabulary, config),
        "Error: {}"
    );

    let list = args.lattice_list.as_ref().map(|path| {
        BufReader::new(die!(
            File::open(path),
            "Error opening {}: {}",
            path.display()
        ))
    });
    let paths = die!(collect_paths(&args.lattices, list), "Error reading lattice list: {}");
    let paths = die!(select_job(paths, args.num_jobs, args.job), "Error: {}");

    let mut out: Box<dyn Write> = match &args.output_file {
        Some(path) => Box::new(BufWriter::new(die!(
            File::create(path),
            "Error creating {}: {}",
            path.display()
        ))),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };
    let summary = die!(
        decode_lattices(
            &decoder,
            &paths,
            args.job,
            args.output,
            args.n_best,
            log_scale,
            &mut out
        ),
        "Error writing output: {}"
    );
    info!(
        decoded = summary.decoded,
        failed = summary.failed,
        "job finished"
    );
}
