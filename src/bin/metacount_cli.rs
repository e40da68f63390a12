use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process::ExitCode;

use metacount_rs::{dispatch, dispatch_by_name, Invocation, Operation};

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
        _ => Err(format!("expected key=value, got '{}'", s)),
    }
}

#[derive(Parser)]
#[command(name = "metacount-rs")]
#[command(version)]
#[command(about = "Merge and aggregate per-sample metagenomic count tables")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge featureCounts outputs into one wide table
    #[command(name = "clean-featurecount")]
    CleanFeaturecount {
        /// Raw count files, one per sample ({sample}.fc.tsv)
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        #[arg(short, long)]
        output: PathBuf,
        /// Leave out the Length column
        #[arg(long)]
        no_length: bool,
        /// Fail on repeated row keys within a file
        #[arg(long)]
        strict_keys: bool,
        /// File name suffix stripped to get the sample name
        #[arg(long, default_value = ".fc.tsv")]
        suffix: String,
    },

    /// Sum per-ORF abundance by annotation
    #[command(name = "count-features")]
    CountFeatures {
        #[arg(long)]
        abund: PathBuf,
        #[arg(long)]
        annot: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Collect one database's aggregated counts across samples
    #[command(name = "extract-counts")]
    ExtractCounts {
        /// Sample sheet (sample, unit, fq1, fq2, [assembly])
        #[arg(long)]
        sample_info: PathBuf,
        /// Annotation database (kos, pfams, modules, ...)
        #[arg(long)]
        db: String,
        /// Path of each assembly's table, with {assembly} and {db} placeholders
        #[arg(long)]
        table_template: String,
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Run an operation by name with an explicit invocation context
    Run {
        /// clean_featurecount, count_features or extract_counts
        operation: String,
        #[arg(long = "input", value_parser = parse_key_value)]
        inputs: Vec<(String, String)>,
        #[arg(long = "output", value_parser = parse_key_value)]
        outputs: Vec<(String, String)>,
        #[arg(long = "param", value_parser = parse_key_value)]
        params: Vec<(String, String)>,
        #[arg(long = "wildcard", value_parser = parse_key_value)]
        wildcards: Vec<(String, String)>,
    },
}

fn spinner(color: &str, msg: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let template = format!("{{spinner:.{}}} {{msg}}", color);
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(&[
                "⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏",
            ])
            .template(&template)
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(msg.to_string());
    spinner
}

fn build(command: Commands) -> (Option<Operation>, String, Invocation) {
    match command {
        Commands::CleanFeaturecount {
            inputs,
            output,
            no_length,
            strict_keys,
            suffix,
        } => {
            let mut inv = Invocation::new()
                .output("tsv", output)
                .param("with_length", (!no_length).to_string())
                .param("strict_keys", strict_keys.to_string())
                .param("suffix", suffix);
            for input in inputs {
                inv = inv.input("tsv", input);
            }
            (Some(Operation::CleanFeaturecount), String::new(), inv)
        }
        Commands::CountFeatures { abund, annot, output } => {
            let inv = Invocation::new()
                .input("abund", abund)
                .input("annot", annot)
                .output("tsv", output);
            (Some(Operation::CountFeatures), String::new(), inv)
        }
        Commands::ExtractCounts {
            sample_info,
            db,
            table_template,
            output,
        } => {
            let inv = Invocation::new()
                .input("sample_info", sample_info)
                .param("table_template", table_template)
                .wildcard("db", db)
                .output("tsv", output);
            (Some(Operation::ExtractCounts), String::new(), inv)
        }
        Commands::Run {
            operation,
            inputs,
            outputs,
            params,
            wildcards,
        } => {
            let mut inv = Invocation::new();
            for (k, v) in inputs {
                inv = inv.input(&k, v);
            }
            for (k, v) in outputs {
                inv = inv.output(&k, v);
            }
            for (k, v) in params {
                inv = inv.param(&k, v);
            }
            for (k, v) in wildcards {
                inv = inv.wildcard(&k, v);
            }
            (None, operation, inv)
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let (op, name, inv) = build(cli.command);
    let label = op.map(|o| o.to_string()).unwrap_or_else(|| name.clone());

    let progress = spinner("green", &format!("Running {}...", label));
    let result = match op {
        Some(op) => dispatch(op, &inv),
        None => dispatch_by_name(&name, &inv),
    };

    match result {
        Ok(()) => {
            progress.finish_with_message(format!("{} finished.", label));
            ExitCode::SUCCESS
        }
        Err(e) => {
            progress.abandon_with_message(format!("{} failed.", label));
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
