use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use enclave_core::config::{ConfigLoader, EnclaveConfig};
use enclave_core::executors::{DockerRuntime, LanguageCatalog};
use enclave_core::tools::code_execution::TOOL_NAME;
use enclave_core::{AgentError, SandboxExecutor, Tool, ToolFactory};
use log::LevelFilter;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[clap(name = "enclave", author, version, about = "Run untrusted code snippets in disposable containers")]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    #[clap(long, short, global = true, default_value = "enclave.yaml", help = "Configuration file (optional)")]
    config: PathBuf,

    #[clap(long, global = true, help = "Log level, overrides logging.level from the config file")]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a snippet and print the tool output as JSON
    Run {
        #[clap(long, short)]
        language: String,

        #[clap(long, conflicts_with = "file", help = "Source code; read from stdin when neither --code nor --file is given")]
        code: Option<String>,

        #[clap(long, short)]
        file: Option<PathBuf>,

        #[clap(long, short, default_value_t = 0, allow_hyphen_values = true, help = "Timeout in seconds, 0 uses the configured default")]
        timeout: i64,
    },
    /// List supported languages and their images
    Languages,
    /// Print the tool metadata and input schema
    Schema,
    /// Check that the Docker engine is reachable
    Ping,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::from_file_or_default(&cli.config)
        .await
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    init_logging(&config, cli.log_level.as_deref())?;

    match cli.command {
        Commands::Languages => {
            for spec in LanguageCatalog::new().entries() {
                println!("{:<12} {:<22} {}", spec.id, spec.image, spec.interpreter);
            }
            Ok(())
        }
        Commands::Ping => {
            let runtime = DockerRuntime::connect(&config.docker)?;
            runtime.ping().await.context("Docker engine is not reachable")?;
            println!("Docker engine is reachable");
            Ok(())
        }
        Commands::Schema => {
            let runtime = Arc::new(DockerRuntime::connect(&config.docker)?);
            let executor = Arc::new(SandboxExecutor::from_config(runtime, &config.sandbox));
            let tool = ToolFactory::create_code_execution(executor)?;
            println!("{}", serde_json::to_string_pretty(&tool.metadata())?);
            Ok(())
        }
        Commands::Run {
            language,
            code,
            file,
            timeout,
        } => {
            let code = read_source(code, file).await?;
            run_snippet(&config, language, code, timeout).await
        }
    }
}

fn init_logging(config: &EnclaveConfig, override_level: Option<&str>) -> Result<()> {
    let level = override_level.unwrap_or(&config.logging.level);
    let log_level_filter = level.parse().unwrap_or(LevelFilter::Info);

    let mut builder = env_logger::Builder::new();
    builder.filter_level(log_level_filter);

    if let Some(path) = &config.logging.file {
        let log_file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(log_file)));
    }

    builder.init();
    Ok(())
}

async fn read_source(code: Option<String>, file: Option<PathBuf>) -> Result<String> {
    if let Some(code) = code {
        return Ok(code);
    }
    if let Some(path) = file {
        return tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()));
    }

    let mut source = String::new();
    tokio::io::stdin()
        .read_to_string(&mut source)
        .await
        .context("Failed to read source from stdin")?;
    Ok(source)
}

async fn run_snippet(config: &EnclaveConfig, language: String, code: String, timeout: i64) -> Result<()> {
    let runtime = Arc::new(DockerRuntime::connect(&config.docker)?);
    let executor = Arc::new(SandboxExecutor::from_config(runtime, &config.sandbox));
    let registry = ToolFactory::create_default_registry(executor)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, cancelling execution");
            on_interrupt.cancel();
        }
    });

    let arguments = json!({
        "language": language,
        "code": code,
        "timeout": timeout,
    });

    match registry.execute(TOOL_NAME, arguments, cancel).await {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(e) => {
            if let AgentError::Sandbox(sandbox_error) = &e {
                if let Some(partial) = sandbox_error.partial_output() {
                    eprintln!("{}", partial);
                }
            }
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_accepts_negative_timeout() {
        let cli = Cli::try_parse_from(["enclave", "run", "-l", "python", "--code", "print(1)", "-t", "-3"]).unwrap();
        match cli.command {
            Commands::Run { language, code, timeout, .. } => {
                assert_eq!(language, "python");
                assert_eq!(code.as_deref(), Some("print(1)"));
                assert_eq!(timeout, -3);
            }
            other => panic!("unexpected command: {:?}", other),
        }
        assert_eq!(cli.config, PathBuf::from("enclave.yaml"));
    }

    #[test]
    fn test_code_and_file_conflict() {
        let result = Cli::try_parse_from([
            "enclave", "run", "-l", "sh", "--code", "echo hi", "--file", "script.sh",
        ]);
        assert!(result.is_err());
    }
}
