pub mod agent;
pub mod choice;
pub mod cli;
pub mod config;
pub mod correspond;
pub mod data;
pub mod dataset;
pub mod derive;
pub mod describe;
pub mod error;
pub mod expr;
pub mod io_utils;
pub mod literal;
pub mod metadata;
pub mod oracle;
pub mod program;
pub mod runner;
pub mod store;
pub mod synth;
pub mod table;
pub mod workflow;

use std::{
    env,
    io::{self, Stderr, StdinLock},
    sync::OnceLock,
};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    choice::{AmbiguityResolver, PromptChoiceSource},
    cli::{Cli, Commands, DatasetArgs, OracleArgs, SettingsArgs},
    config::RemapConfig,
    dataset::Dataset,
    oracle::OpenAiOracle,
    program::MappingCode,
    store::CorrespondenceStore,
    workflow::{Orchestrator, Progress, Session},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("csv_remap", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Describe(args) => handle_describe(&args),
        Commands::Correspond(args) => handle_correspond(&args),
        Commands::Reformat(args) => handle_reformat(&args),
        Commands::Run(args) => handle_run(&args),
    }
}

fn handle_describe(args: &cli::DescribeArgs) -> Result<()> {
    info!(
        "Describing '{}' with delimiter '{}'",
        args.input.display(),
        printable_delimiter(io_utils::resolve_input_delimiter(&args.input, args.delimiter))
    );
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let dataset = Dataset::load(&args.input, args.delimiter, encoding)
        .with_context(|| format!("Loading {:?}", args.input))?;
    print!("{}", describe::describe(&dataset, args.rows));
    Ok(())
}

fn handle_correspond(args: &cli::CorrespondArgs) -> Result<()> {
    let config = load_settings(&args.settings, Some(&args.oracle))?;
    let (template, input) = load_datasets(&args.datasets)?;
    let oracle = build_oracle(&args.oracle, &config)?;
    let orchestrator = Orchestrator::new(&oracle, config);
    let mut session = Session::with_datasets(template, input);
    let correspondence = orchestrator.correspond(&mut session)?;
    let headers = vec![
        "template column".to_string(),
        "kind".to_string(),
        "input column(s)".to_string(),
    ];
    table::print_table(&headers, &correspondence.display_rows());
    Ok(())
}

fn handle_reformat(args: &cli::ReformatArgs) -> Result<()> {
    let config = load_settings(&args.settings, Some(&args.oracle))?;
    let preset = choice::parse_presets(&args.choose)?;
    let (template, input) = load_datasets(&args.datasets)?;
    let oracle = build_oracle(&args.oracle, &config)?;
    let orchestrator = Orchestrator::new(&oracle, config);
    let mut session = Session::with_datasets(template, input);

    let correspondence = orchestrator.correspond(&mut session)?;
    for (column, candidates) in correspondence.entries() {
        debug!("Template column '{column}' <- {candidates:?}");
    }

    let mut prompt: PromptChoiceSource<StdinLock<'static>, Stderr>;
    let mut resolver = if args.interactive {
        prompt = PromptChoiceSource::new(io::stdin().lock(), io::stderr());
        AmbiguityResolver::interactive(&mut prompt)
    } else {
        AmbiguityResolver::automatic()
    }
    .with_preset(preset);
    let choice = orchestrator.choose(&mut session, &mut resolver)?;
    for (column, chosen) in choice.entries() {
        info!("Column '{column}' will be populated from '{chosen}'");
    }

    let mut report = |progress: &Progress| {
        info!(
            "Generated map code for '{}' ({}/{}, {:.0}%)",
            progress.template_column,
            progress.completed,
            progress.total,
            progress.fraction() * 100.0
        );
    };
    let code = orchestrator.generate(&mut session, &mut report)?.clone();
    if session.from_cache() {
        info!("Using saved mapping code; synthesis skipped");
    }
    if let Some(path) = &args.code_out {
        io_utils::save_text(path, code.text())?;
        info!("Mapping code written to {path:?}");
    }
    if args.no_run {
        if args.code_out.is_none() {
            print!("{code}");
        }
        return Ok(());
    }

    let output = orchestrator.run(&mut session, None)?;
    write_output(output, args.output.as_deref(), args.output_delimiter)
}

fn handle_run(args: &cli::RunArgs) -> Result<()> {
    let config = load_settings(&args.settings, None)?;
    let (template, input) = load_datasets(&args.datasets)?;
    let code = MappingCode::from_text(io_utils::load_text(&args.code)?);
    info!(
        "Running {:?} to map '{}' onto '{}'",
        args.code, input.name, template.name
    );
    let output = runner::execute(&code, &template, &input)?;
    let store = CorrespondenceStore::new(config.store_dir.clone(), config.lookup);
    let record = store.record(&template.name, &input.name, &code)?;
    info!("Mapping recorded at {:?}", record.path);
    write_output(&output, args.output.as_deref(), args.output_delimiter)
}

fn load_settings(settings: &SettingsArgs, oracle: Option<&OracleArgs>) -> Result<RemapConfig> {
    let mut config = RemapConfig::load_or_default(settings.config.as_deref())?;
    if let Some(dir) = &settings.store_dir {
        config.store_dir = dir.clone();
    }
    if let Some(args) = oracle {
        if let Some(model) = &args.model {
            config.model = model.clone();
        }
        if let Some(lookup) = args.lookup {
            config.lookup = lookup;
        }
    }
    debug!("Effective settings: {config:?}");
    Ok(config)
}

fn load_datasets(args: &DatasetArgs) -> Result<(Dataset, Dataset)> {
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let load = |path: &std::path::Path, name: Option<&String>| match name {
        Some(name) => Dataset::load_named(path, name, args.delimiter, encoding),
        None => Dataset::load(path, args.delimiter, encoding),
    };
    let template = load(&args.template, args.template_name.as_ref())
        .with_context(|| format!("Loading template {:?}", args.template))?;
    let input = load(&args.input, args.input_name.as_ref())
        .with_context(|| format!("Loading input {:?}", args.input))?;
    if template.headers.is_empty() {
        return Err(anyhow!("Template {:?} has no columns", args.template));
    }
    info!(
        "Template '{}' has {} column(s); input '{}' has {} column(s) and {} row(s)",
        template.name,
        template.headers.len(),
        input.name,
        input.headers.len(),
        input.row_count()
    );
    Ok((template, input))
}

fn build_oracle(args: &OracleArgs, config: &RemapConfig) -> Result<OpenAiOracle> {
    let api_key = args
        .api_key
        .as_deref()
        .ok_or_else(|| anyhow!("An API key is required (--api-key or OPENAI_API_KEY)"))?;
    Ok(OpenAiOracle::new(api_key, config)?)
}

fn write_output(
    output: &Dataset,
    path: Option<&std::path::Path>,
    delimiter: Option<u8>,
) -> Result<()> {
    let delimiter =
        io_utils::resolve_output_delimiter(path, delimiter, io_utils::DEFAULT_CSV_DELIMITER);
    output
        .write_csv(path, delimiter)
        .with_context(|| format!("Writing output to {}", describe_target(path)))?;
    if let Some(path) = path {
        info!(
            "Wrote {} row(s) to {path:?} with delimiter '{}'",
            output.row_count(),
            printable_delimiter(delimiter)
        );
    }
    Ok(())
}

fn describe_target(path: Option<&std::path::Path>) -> String {
    path.map(|p| format!("{p:?}"))
        .unwrap_or_else(|| "stdout".to_string())
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}
