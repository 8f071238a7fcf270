use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use docrag::{
    chunking::{DEFAULT_MAX_LINES, DEFAULT_OVERLAP_LINES},
    generation::{DEFAULT_GROQ_MODEL, DEFAULT_OLLAMA_MODEL},
    retrieval::DEFAULT_TOP_K,
};

#[derive(Debug, Parser)]
#[command(
    name = "docrag",
    about = "Ask questions about a folder of documents"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Embedding model id (all-MiniLM-L6-v2, all-MiniLM-L12-v2,
    /// bge-small-en-v1.5, feature-hashing)
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Bring the index up to date with a document directory
    Index(IndexArgs),
    /// Print the passages most relevant to a question
    Query(QueryArgs),
    /// Answer a question using retrieved passages and a language model
    Ask(AskArgs),
    /// Show index status and statistics
    Status(StatusArgs),
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Index --

#[derive(Debug, Parser)]
pub struct IndexArgs {
    /// Directory holding the documents (not searched recursively)
    pub dir: PathBuf,

    /// Maximum number of lines per chunk
    #[arg(long, default_value_t = DEFAULT_MAX_LINES)]
    pub max_lines: usize,

    /// Lines shared by consecutive chunks
    #[arg(long, default_value_t = DEFAULT_OVERLAP_LINES)]
    pub overlap: usize,
}

// -- Query --

#[derive(Debug, Parser)]
pub struct QueryArgs {
    /// The question to look up
    pub question: String,

    /// Number of passages to retrieve
    #[arg(short = 'k', long, default_value_t = DEFAULT_TOP_K)]
    pub top_k: usize,
}

// -- Ask --

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Provider {
    /// Local Ollama server
    Ollama,
    /// Groq chat completions API (needs GROQ_API_KEY)
    Groq,
}

impl Provider {
    pub fn default_model(self) -> &'static str {
        match self {
            Provider::Ollama => DEFAULT_OLLAMA_MODEL,
            Provider::Groq => DEFAULT_GROQ_MODEL,
        }
    }
}

#[derive(Debug, Parser)]
pub struct AskArgs {
    /// The question to answer
    pub question: String,

    /// Language model provider
    #[arg(long, value_enum, default_value_t = Provider::Ollama)]
    pub provider: Provider,

    /// Language model name (defaults to the provider's default)
    #[arg(long)]
    pub llm: Option<String>,

    /// Number of passages to retrieve
    #[arg(short = 'k', long, default_value_t = DEFAULT_TOP_K)]
    pub top_k: usize,

    /// Print the prompt sent to the model
    #[arg(long)]
    pub show_prompt: bool,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "docrag",
            &mut std::io::stdout(),
        );
    }
}
