use std::path::PathBuf;
use std::time::Instant;

use anyhow::{anyhow, Result};
use dotenvy::dotenv;
use serde::Serialize;
use serde_json::json;
use tracing::info;

mod admission;
mod config;
mod handlers;
mod imaging;
mod state;
mod utils;

use config::CONFIG;
use imaging::pipeline::Operation;
use imaging::tiers::QualityTier;
use state::AppState;
use utils::logging::init_logging;
use utils::media::{detect_mime_type, format_file_size, validate_upload};
use utils::timing::log_pipeline_timing;

#[derive(Debug, PartialEq, Eq)]
enum CliCommand {
    Process {
        operation: Operation,
        input: PathBuf,
        output: PathBuf,
    },
    Console,
}

#[derive(Debug, Serialize)]
struct ProcessingReport {
    operation: &'static str,
    params: String,
    input: String,
    output: String,
    input_size: String,
    output_size: String,
    duration_s: f64,
}

fn usage() -> &'static str {
    "Usage:\n  imagebot enhance --input <path> --output <path> [--quality <HD|1080p|4K|8K>]\n  imagebot wallpaper --input <path> --output <path>\n  imagebot optimize --input <path> --output <path>\n  imagebot console"
}

fn parse_args(args: &[String]) -> Result<CliCommand> {
    let subcommand = args.get(1).map(|value| value.as_str()).unwrap_or("console");
    let mut operation = match subcommand {
        "console" => return Ok(CliCommand::Console),
        "enhance" => Operation::EnhanceQuality(QualityTier::FullHd),
        "wallpaper" => Operation::Wallpaper,
        "optimize" => Operation::Optimize,
        "--help" | "-h" | "help" => return Err(anyhow!(usage())),
        other => return Err(anyhow!("Unknown command: {other}\n{}", usage())),
    };

    let mut input: Option<PathBuf> = None;
    let mut output: Option<PathBuf> = None;

    let mut index = 2;
    while index < args.len() {
        match args[index].as_str() {
            "--input" | "-i" => {
                index += 1;
                let value = args
                    .get(index)
                    .ok_or_else(|| anyhow!("Missing value for --input"))?;
                input = Some(PathBuf::from(value));
            }
            "--output" | "-o" => {
                index += 1;
                let value = args
                    .get(index)
                    .ok_or_else(|| anyhow!("Missing value for --output"))?;
                output = Some(PathBuf::from(value));
            }
            "--quality" | "-q" if matches!(operation, Operation::EnhanceQuality(_)) => {
                index += 1;
                let value = args
                    .get(index)
                    .ok_or_else(|| anyhow!("Missing value for --quality"))?;
                let tier = QualityTier::from_key(value)
                    .ok_or_else(|| anyhow!("Invalid --quality value: {value}"))?;
                operation = Operation::EnhanceQuality(tier);
            }
            other => {
                return Err(anyhow!("Unknown {subcommand} argument: {other}\n{}", usage()));
            }
        }
        index += 1;
    }

    Ok(CliCommand::Process {
        operation,
        input: input.ok_or_else(|| anyhow!("--input is required"))?,
        output: output.ok_or_else(|| anyhow!("--output is required"))?,
    })
}

async fn process_file(
    state: &AppState,
    operation: Operation,
    input: PathBuf,
    output: PathBuf,
) -> Result<ProcessingReport> {
    let started = Instant::now();
    let bytes = tokio::fs::read(&input).await?;
    let mime_type = detect_mime_type(&bytes);
    validate_upload(mime_type.as_deref(), bytes.len() as u64, state.max_file_size)?;
    let input_size = bytes.len() as u64;

    let metadata = json!({ "input": input.display().to_string(), "params": operation.params() });
    let result = log_pipeline_timing(operation.name(), Some(metadata), || async {
        let produced = match operation {
            Operation::EnhanceQuality(tier) => {
                state.pipeline.enhance_quality(bytes, tier.key()).await
            }
            Operation::Wallpaper => state.pipeline.convert_to_wallpaper(bytes).await,
            Operation::Optimize => state.pipeline.optimize_image(bytes).await,
        };
        produced.ok_or_else(|| anyhow!("{} failed for {}", operation.label(), input.display()))
    })
    .await?;
    tokio::fs::write(&output, &result).await?;

    Ok(ProcessingReport {
        operation: operation.name(),
        params: operation.params(),
        input: input.display().to_string(),
        output: output.display().to_string(),
        input_size: format_file_size(input_size),
        output_size: format_file_size(result.len() as u64),
        duration_s: started.elapsed().as_secs_f64(),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let config = &*CONFIG;
    let _guards = init_logging(&config.log_level, &config.log_dir);

    let args: Vec<String> = std::env::args().collect();
    let command = parse_args(&args)?;
    let state = AppState::new(config);

    match command {
        CliCommand::Console => {
            info!(
                "Starting image console (limit {} requests / {}s, cache {} entries)",
                config.max_requests_per_user, config.rate_limit_window, config.cache_max_size
            );
            handlers::console::run_console(state).await?;
        }
        CliCommand::Process {
            operation,
            input,
            output,
        } => {
            let report = process_file(&state, operation, input, output).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        std::iter::once("imagebot")
            .chain(values.iter().copied())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn defaults_to_console() {
        assert_eq!(parse_args(&args(&[])).unwrap(), CliCommand::Console);
    }

    #[test]
    fn parses_enhance_with_quality() {
        let command =
            parse_args(&args(&["enhance", "-i", "in.jpg", "--output", "out.png", "--quality", "4K"]))
                .unwrap();
        assert_eq!(
            command,
            CliCommand::Process {
                operation: Operation::EnhanceQuality(QualityTier::Uhd4k),
                input: PathBuf::from("in.jpg"),
                output: PathBuf::from("out.png"),
            }
        );
    }

    #[test]
    fn wallpaper_rejects_quality_flag_and_missing_paths() {
        assert!(parse_args(&args(&["wallpaper", "-i", "a", "-o", "b", "-q", "HD"])).is_err());
        assert!(parse_args(&args(&["wallpaper", "-i", "a"])).is_err());
        assert!(parse_args(&args(&["enhance", "-i", "a", "-o", "b", "-q", "16K"])).is_err());
        assert!(parse_args(&args(&["resize"])).is_err());
    }

    #[test]
    fn parses_optimize_without_quality() {
        assert_eq!(
            parse_args(&args(&["optimize", "-i", "big.png", "-o", "small.jpg"])).unwrap(),
            CliCommand::Process {
                operation: Operation::Optimize,
                input: PathBuf::from("big.png"),
                output: PathBuf::from("small.jpg"),
            }
        );
        assert!(parse_args(&args(&["optimize", "-i", "a", "-o", "b", "-q", "4K"])).is_err());
    }
}
