use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::LookupMode;

#[derive(Debug, Parser)]
#[command(author, version, about = "Reformat CSV files to match a template schema", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print the sample rows and inferred column types the oracle is shown
    Describe(DescribeArgs),
    /// Ask the oracle which input columns feed each template column
    Correspond(CorrespondArgs),
    /// Resolve the column map, reuse or synthesize mapping code, and run it
    Reformat(ReformatArgs),
    /// Run an existing (possibly hand-edited) mapping program and save it
    Run(RunArgs),
}

#[derive(Debug, Args)]
pub struct DescribeArgs {
    /// Input CSV file to describe ('-' for stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Number of sample rows to print
    #[arg(long, default_value_t = 5)]
    pub rows: usize,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct DatasetArgs {
    /// Template CSV file whose columns define the output schema
    #[arg(short = 't', long = "template")]
    pub template: PathBuf,
    /// Input CSV file holding the source data
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Name identifying the template in the mapping store (defaults to the file name)
    #[arg(long = "template-name")]
    pub template_name: Option<String>,
    /// Name identifying the input in the mapping store (defaults to the file name)
    #[arg(long = "input-name")]
    pub input_name: Option<String>,
    /// CSV delimiter character for both files (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of both files (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct SettingsArgs {
    /// YAML file overriding the default model, store and agent settings
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Directory holding saved mapping programs and their index
    #[arg(long = "store-dir")]
    pub store_dir: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct OracleArgs {
    /// API key for the chat completion endpoint
    #[arg(long = "api-key", env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,
    /// Model name sent with every completion request
    #[arg(long)]
    pub model: Option<String>,
    /// How saved mappings are located in the store index
    #[arg(long, value_enum)]
    pub lookup: Option<LookupMode>,
}

#[derive(Debug, Args)]
pub struct CorrespondArgs {
    #[command(flatten)]
    pub datasets: DatasetArgs,
    #[command(flatten)]
    pub settings: SettingsArgs,
    #[command(flatten)]
    pub oracle: OracleArgs,
}

#[derive(Debug, Args)]
pub struct ReformatArgs {
    #[command(flatten)]
    pub datasets: DatasetArgs,
    #[command(flatten)]
    pub settings: SettingsArgs,
    #[command(flatten)]
    pub oracle: OracleArgs,
    /// Repeatable picks such as `amount=amt` for ambiguous template columns
    #[arg(long = "choose", action = clap::ArgAction::Append)]
    pub choose: Vec<String>,
    /// Prompt on the terminal for every ambiguous or unresolved column
    #[arg(long)]
    pub interactive: bool,
    /// Write the assembled mapping program to this file
    #[arg(long = "code-out")]
    pub code_out: Option<PathBuf>,
    /// Output CSV file (omit for stdout)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Output delimiter (defaults from the output file extension)
    #[arg(long = "output-delimiter", value_parser = parse_delimiter)]
    pub output_delimiter: Option<u8>,
    /// Stop after assembling the program; nothing is run or saved
    #[arg(long = "no-run")]
    pub no_run: bool,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub datasets: DatasetArgs,
    #[command(flatten)]
    pub settings: SettingsArgs,
    /// Mapping program to execute
    #[arg(long)]
    pub code: PathBuf,
    /// Output CSV file (omit for stdout)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Output delimiter (defaults from the output file extension)
    #[arg(long = "output-delimiter", value_parser = parse_delimiter)]
    pub output_delimiter: Option<u8>,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
