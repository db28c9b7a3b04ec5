use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info};

use crate::admission::session::UploadKind;
use crate::handlers::operations::{record_upload, run_operation, user_status, OperationError};
use crate::imaging::pipeline::Operation;
use crate::imaging::tiers::QualityTier;
use crate::state::AppState;
use crate::utils::media::{
    detect_mime_type, estimate_processing_seconds, format_file_size, format_processing_stats,
    get_file_info, sanitize_filename,
};

const CONSOLE_HELP: &str = "Commands:\n  upload <user> <path>\n  photo <user> <path>\n  enhance <user> <HD|1080p|4K|8K>\n  wallpaper <user>\n  optimize <user>\n  status <user>\n  clear-cache\n  help\n  quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Upload {
        user_id: i64,
        path: PathBuf,
        kind: UploadKind,
    },
    Run { user_id: i64, operation: Operation },
    Status { user_id: i64 },
    ClearCache,
    Help,
    Quit,
}

fn parse_user_id(value: Option<&str>) -> Result<i64, String> {
    let value = value.ok_or_else(|| "missing user id".to_string())?;
    value
        .parse::<i64>()
        .map_err(|_| format!("invalid user id: {value}"))
}

/// Parses one console line. Blank lines and `#` comments yield `None`.
pub fn parse_console_command(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let mut parts = line.split_whitespace();
    let command = parts.next().unwrap_or_default().to_lowercase();
    let parsed = match command.as_str() {
        "upload" | "photo" => {
            let kind = if command == "photo" {
                UploadKind::Photo
            } else {
                UploadKind::Document
            };
            let user_id = parse_user_id(parts.next())?;
            let rest = parts.collect::<Vec<_>>().join(" ");
            if rest.is_empty() {
                return Err("missing path for upload".to_string());
            }
            ConsoleCommand::Upload {
                user_id,
                path: PathBuf::from(rest),
                kind,
            }
        }
        "enhance" => {
            let user_id = parse_user_id(parts.next())?;
            let key = parts.next().unwrap_or("1080p");
            let tier =
                QualityTier::from_key(key).ok_or_else(|| format!("unknown quality option: {key}"))?;
            ConsoleCommand::Run {
                user_id,
                operation: Operation::EnhanceQuality(tier),
            }
        }
        "wallpaper" => ConsoleCommand::Run {
            user_id: parse_user_id(parts.next())?,
            operation: Operation::Wallpaper,
        },
        "optimize" => ConsoleCommand::Run {
            user_id: parse_user_id(parts.next())?,
            operation: Operation::Optimize,
        },
        "status" => ConsoleCommand::Status {
            user_id: parse_user_id(parts.next())?,
        },
        "clear-cache" => ConsoleCommand::ClearCache,
        "help" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        other => return Err(format!("unknown command: {other}")),
    };
    Ok(Some(parsed))
}

/// `<stem>_<operation>[_<params>].<ext>` next to the source asset, with the
/// stem sanitised.
pub fn output_path_for(asset: &Path, operation: Operation) -> PathBuf {
    let stem = asset
        .file_stem()
        .map(|stem| sanitize_filename(&stem.to_string_lossy()))
        .unwrap_or_else(|| "image".to_string());
    let params = operation.params();
    let extension = operation.extension();
    let name = if params.is_empty() {
        format!("{stem}_{}.{extension}", operation.name())
    } else {
        format!("{stem}_{}_{}.{extension}", operation.name(), params)
    };
    asset.with_file_name(name)
}

async fn handle_upload(
    state: &AppState,
    user_id: i64,
    path: &Path,
    kind: UploadKind,
) -> Result<String> {
    let metadata = tokio::fs::metadata(path).await?;
    if metadata.len() > state.max_file_size {
        return Ok(format!(
            "rejected: file too large, maximum size is {}",
            format_file_size(state.max_file_size)
        ));
    }

    let bytes = tokio::fs::read(path).await?;
    let mime_type = detect_mime_type(&bytes);
    let asset = path.to_string_lossy().into_owned();
    match record_upload(
        state,
        user_id,
        &asset,
        mime_type.as_deref(),
        bytes.len() as u64,
        kind,
    ) {
        Ok(()) => {
            let info = get_file_info(bytes.len() as u64, mime_type.as_deref());
            Ok(format!(
                "received {} {} ({}, {})",
                kind.as_str(),
                asset,
                info.size,
                info.format.unwrap_or_else(|| "unknown".to_string())
            ))
        }
        Err(err) => Ok(format!("rejected: {err}")),
    }
}

async fn handle_run(state: &AppState, user_id: i64, operation: Operation) -> Result<String> {
    let estimate = state
        .sessions
        .lock()
        .get(user_id)
        .map(|record| estimate_processing_seconds(record.size_bytes, operation.name()));
    if let Some(seconds) = estimate {
        info!("Running {} for user {user_id}, expected ~{seconds}s", operation.name());
    }

    let started = Instant::now();
    let outcome = run_operation(state, user_id, operation, |asset| async move {
        tokio::fs::read(&asset).await.map_err(anyhow::Error::from)
    })
    .await;

    match outcome {
        Ok(outcome) => {
            let output = output_path_for(Path::new(&outcome.asset_reference), operation);
            tokio::fs::write(&output, &outcome.bytes).await?;
            let remaining = state.rate_limiter.lock().remaining(user_id);
            let stats = format_processing_stats(
                started.elapsed(),
                outcome.bytes.len() as u64,
                operation.label(),
            );
            Ok(format!(
                "ok: wrote {}{}\n{stats}\n{remaining} requests left",
                output.display(),
                if outcome.cached { " (cached)" } else { "" },
            ))
        }
        Err(OperationError::RateLimited { reset_at }) => {
            let wait = reset_at
                .map(|at| at.saturating_duration_since(Instant::now()).as_secs())
                .unwrap_or_default();
            Ok(format!("rate limited: try again in {wait}s"))
        }
        Err(err) => Ok(format!("failed: {err}")),
    }
}

async fn execute(state: &AppState, command: ConsoleCommand) -> Result<String> {
    match command {
        ConsoleCommand::Upload {
            user_id,
            path,
            kind,
        } => handle_upload(state, user_id, &path, kind).await,
        ConsoleCommand::Run { user_id, operation } => handle_run(state, user_id, operation).await,
        ConsoleCommand::Status { user_id } => {
            Ok(serde_json::to_string(&user_status(state, user_id))?)
        }
        ConsoleCommand::ClearCache => {
            state.cache.lock().clear();
            Ok("cache cleared".to_string())
        }
        ConsoleCommand::Help => Ok(CONSOLE_HELP.to_string()),
        ConsoleCommand::Quit => Ok(String::new()),
    }
}

/// Reads commands from stdin one line at a time. Commands run in arrival
/// order, so a user's upload is always recorded before their next operation.
pub async fn run_console(state: AppState) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    info!("Console ready");

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, closing console");
                break;
            }
        };
        let Some(line) = line else { break };
        let reply = match parse_console_command(&line) {
            Ok(None) => continue,
            Ok(Some(ConsoleCommand::Quit)) => break,
            Ok(Some(command)) => match execute(&state, command).await {
                Ok(reply) => reply,
                Err(err) => {
                    error!("Console command failed: {err}");
                    format!("error: {err}")
                }
            },
            Err(message) => format!("error: {message}"),
        };
        stdout.write_all(reply.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    info!("Console closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_operation_commands() {
        assert_eq!(
            parse_console_command("enhance 42 4K").unwrap(),
            Some(ConsoleCommand::Run {
                user_id: 42,
                operation: Operation::EnhanceQuality(QualityTier::Uhd4k)
            })
        );
        assert_eq!(
            parse_console_command("wallpaper 7").unwrap(),
            Some(ConsoleCommand::Run {
                user_id: 7,
                operation: Operation::Wallpaper
            })
        );
        assert_eq!(
            parse_console_command("upload 7 /tmp/my photo.jpg").unwrap(),
            Some(ConsoleCommand::Upload {
                user_id: 7,
                path: PathBuf::from("/tmp/my photo.jpg"),
                kind: UploadKind::Document,
            })
        );
        assert_eq!(
            parse_console_command("photo 7 cat.jpg").unwrap(),
            Some(ConsoleCommand::Upload {
                user_id: 7,
                path: PathBuf::from("cat.jpg"),
                kind: UploadKind::Photo,
            })
        );
    }

    #[test]
    fn skips_blank_lines_and_comments() {
        assert_eq!(parse_console_command("   ").unwrap(), None);
        assert_eq!(parse_console_command("# note").unwrap(), None);
    }

    #[test]
    fn parses_optimize_command() {
        assert_eq!(
            parse_console_command("optimize 3").unwrap(),
            Some(ConsoleCommand::Run {
                user_id: 3,
                operation: Operation::Optimize
            })
        );
    }

    #[test]
    fn reports_malformed_commands() {
        assert!(parse_console_command("enhance abc HD").is_err());
        assert!(parse_console_command("enhance 1 16K").is_err());
        assert!(parse_console_command("upload 1").is_err());
        assert!(parse_console_command("resize 1").is_err());
    }

    #[test]
    fn output_names_carry_operation_and_params() {
        assert_eq!(
            output_path_for(
                Path::new("/data/cat.jpg"),
                Operation::EnhanceQuality(QualityTier::Hd)
            ),
            PathBuf::from("/data/cat_enhance_quality_HD.png")
        );
        assert_eq!(
            output_path_for(Path::new("cat.webp"), Operation::Wallpaper),
            PathBuf::from("cat_wallpaper.png")
        );
        assert_eq!(
            output_path_for(Path::new("/data/what?<now>.png"), Operation::Optimize),
            PathBuf::from("/data/what__now__optimize.jpg")
        );
    }
}
