use bpetrain::{DecodePolicy, TrainerConfig};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::exit;
use tracing::*;
use tracing_subscriber::{filter::LevelFilter, EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    globals: Globals,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Globals {
    /// Turn debugging information on
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    debug: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Learn a BPE vocabulary and merge list from one or more corpus files
    Train(TrainArgs),
}

#[derive(Args)]
struct TrainArgs {
    /// Maximum number of tokens in the vocabulary, including the 256 byte tokens and the special
    /// tokens
    #[arg(long, env = "BPET_VOCAB_SIZE")]
    vocab_size: usize,

    /// A literal string that is never split or merged.  May be repeated; ids are assigned in the
    /// order given.
    #[arg(long = "special-token", env = "BPET_SPECIAL_TOKENS", value_delimiter = ',')]
    special_tokens: Vec<String>,

    /// Number of pretokenizer threads.
    ///
    /// Defaults to the number of available cores.
    #[arg(long, env = "BPET_PARALLELISM")]
    parallelism: Option<usize>,

    /// How to handle bytes that aren't valid UTF-8: `ignore` drops them, `replace` substitutes
    /// U+FFFD
    #[arg(long, env = "BPET_DECODE_POLICY", default_value_t = DecodePolicy::default())]
    decode_policy: DecodePolicy,

    /// Split input files only where this string occurs.
    ///
    /// Defaults to the first special token.  With neither, each file is read as one chunk.
    #[arg(long, env = "BPET_BOUNDARY_MARKER")]
    boundary_marker: Option<String>,

    /// Where to write the vocabulary, one `<base64 bytes> <id>` line per token
    #[arg(long, value_name = "FILE", env = "BPET_VOCAB_OUT")]
    vocab_out: PathBuf,

    /// Where to write the merges, one `<base64 left> <base64 right>` line per merge
    #[arg(long, value_name = "FILE", env = "BPET_MERGES_OUT")]
    merges_out: PathBuf,

    /// Corpus files
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
}

impl TrainArgs {
    fn config(&self) -> TrainerConfig {
        let mut config = TrainerConfig::new(self.vocab_size)
            .with_special_tokens(self.special_tokens.iter().cloned())
            .with_decode_policy(self.decode_policy);

        if let Some(parallelism) = self.parallelism {
            config = config.with_parallelism(parallelism);
        }
        if let Some(marker) = &self.boundary_marker {
            config = config.with_boundary_marker(marker.as_bytes());
        }

        config
    }
}

impl Commands {
    fn execute(self, _globals: &Globals) -> anyhow::Result<()> {
        use Commands::*;
        match self {
            Train(args) => {
                let config = args.config();
                debug!(?config, "Starting training");

                let trained = bpetrain::train(&config, &args.inputs)?;
                bpetrain::save(&trained, &args.vocab_out, &args.merges_out)?;

                info!(
                    vocab_len = trained.vocab.len(),
                    merges = trained.merges.len(),
                    vocab_out = %args.vocab_out.display(),
                    merges_out = %args.merges_out.display(),
                    "Wrote trained vocabulary"
                );
                println!(
                    "Learned {} merges; vocabulary has {} tokens",
                    trained.merges.len(),
                    trained.vocab.len()
                );
            }
        }

        Ok(())
    }
}

fn main() {
    let cli = Cli::parse();
    let default_log_directive = match cli.globals.debug {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    // JSON logs go to stderr so they never mix with command output
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(default_log_directive.into())
                .from_env_lossy(),
        )
        .json()
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");

    if let Err(e) = cli.command.execute(&cli.globals) {
        error!("{:#}", e);
        exit(1);
    } else {
        debug!("command executed successfully");
    }
}
