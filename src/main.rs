use clap::Parser;
use docrag::{
    DataDir,
    Error,
    Result,
    chunking::ChunkingConfig,
    embedding::{self, Embedder},
    generation::{self, ChatCompletionsGenerator, Generator, OllamaGenerator},
    incremental::MetadataMap,
    model_manager::{DEFAULT_MODEL_ID, MODEL_ENV_VAR},
    reconcile::{ReconcileOptions, reconcile},
    retrieval,
    vector_index::FlatIndex,
};
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{AskArgs, Cli, Command, IndexArgs, Provider, QueryArgs};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("DOCRAG_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;

    match &cli.command {
        Command::Index(args) => {
            cmd_index(&data_dir, cli.model.as_deref(), args)?;
        }
        Command::Query(args) => {
            cmd_query(&data_dir, cli.model.as_deref(), args)?;
        }
        Command::Ask(args) => {
            cmd_ask(&data_dir, cli.model.as_deref(), args)?;
        }
        Command::Status(args) => {
            cmd_status(&data_dir, args.json)?;
        }
        Command::Completions(_) => {}
    }

    Ok(())
}

fn open_embedder(
    data_dir: &DataDir,
    model_id: &str,
) -> Result<Box<dyn Embedder>> {
    embedding::from_model_id(model_id, Some(&data_dir.models_dir()))
}

/// Model for querying: an explicit choice wins, then the model the index
/// was built with, then the default.
fn query_model_id(data_dir: &DataDir, explicit: Option<&str>) -> String {
    if let Some(model) = explicit {
        return model.to_string();
    }
    if let Ok(model) = std::env::var(MODEL_ENV_VAR) {
        return model;
    }
    match MetadataMap::load(&data_dir.metadata_file()) {
        Ok(meta) if !meta.model.is_empty() => meta.model,
        _ => DEFAULT_MODEL_ID.to_string(),
    }
}

fn cmd_index(
    data_dir: &DataDir,
    model: Option<&str>,
    args: &IndexArgs,
) -> Result<()> {
    if !args.dir.is_dir() {
        return Err(Error::Config(format!(
            "not a directory: {}",
            args.dir.display()
        )));
    }

    let model_id = embedding::resolve_model_id(model);
    let mut embedder = open_embedder(data_dir, &model_id)?;
    let options = ReconcileOptions {
        chunking: ChunkingConfig::new(args.max_lines)
            .with_overlap(args.overlap),
        ..Default::default()
    };

    eprintln!("Indexing {}...", args.dir.display());
    let report = reconcile(
        &args.dir,
        &data_dir.artifact_paths(),
        embedder.as_mut(),
        &options,
    )?;

    if report.rebuilt {
        eprintln!(
            "  Embedded {} files ({} chunks), reused {}, removed {}",
            report.embedded,
            report.chunks_embedded,
            report.unchanged,
            report.deleted + report.evicted,
        );
        if report.skipped > 0 {
            eprintln!("  Skipped {} unreadable files", report.skipped);
        }
        eprintln!("Index holds {} chunks.", report.total_chunks);
    } else {
        eprintln!("Index is up to date ({} files).", report.unchanged);
    }
    Ok(())
}

fn cmd_query(
    data_dir: &DataDir,
    model: Option<&str>,
    args: &QueryArgs,
) -> Result<()> {
    let model_id = query_model_id(data_dir, model);
    let mut embedder = open_embedder(data_dir, &model_id)?;
    let context = retrieval::retrieve(
        &args.question,
        &data_dir.index_file(),
        &data_dir.mapping_file(),
        args.top_k,
        embedder.as_mut(),
    );
    println!("{context}");
    Ok(())
}

fn cmd_ask(
    data_dir: &DataDir,
    model: Option<&str>,
    args: &AskArgs,
) -> Result<()> {
    let model_id = query_model_id(data_dir, model);
    let mut embedder = open_embedder(data_dir, &model_id)?;
    let context = retrieval::retrieve(
        &args.question,
        &data_dir.index_file(),
        &data_dir.mapping_file(),
        args.top_k,
        embedder.as_mut(),
    );

    let generator: Box<dyn Generator> = match args.provider {
        Provider::Ollama => Box::new(OllamaGenerator::from_env()?),
        Provider::Groq => Box::new(ChatCompletionsGenerator::groq_from_env()?),
    };
    let llm = args
        .llm
        .as_deref()
        .unwrap_or_else(|| args.provider.default_model());

    let answer =
        generation::answer(generator.as_ref(), llm, &context, &args.question);

    if args.show_prompt {
        println!("=== Prompt ===");
        println!("{}", answer.prompt);
        println!();
        println!("=== Answer ===");
    }
    println!("{}", answer.response);
    Ok(())
}

fn cmd_status(data_dir: &DataDir, json: bool) -> Result<()> {
    let meta = MetadataMap::load(&data_dir.metadata_file())?;
    let chunks = match FlatIndex::read(&data_dir.index_file()) {
        Ok(index) => Some(index.len()),
        Err(Error::IndexMissing(_)) => None,
        Err(e) => return Err(e),
    };

    if json {
        let status = serde_json::json!({
            "data_dir": data_dir.root().display().to_string(),
            "model": meta.model,
            "files": meta.files.keys().collect::<Vec<_>>(),
            "chunks": chunks,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("Data directory: {}", data_dir.root().display());
        if meta.model.is_empty() {
            println!("Model: (none)");
        } else {
            println!("Model: {}", meta.model);
        }
        println!("Files: {}", meta.len());
        for path in meta.files.keys() {
            println!("  {path}");
        }
        match chunks {
            Some(n) => println!("Chunks: {n}"),
            None => println!("Chunks: (no index)"),
        }
    }
    Ok(())
}
