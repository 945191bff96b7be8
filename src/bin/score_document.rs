//! One-shot scoring from the command line.
//!
//! Usage: score_document <documento> [--provider equifax|mym|bcu] [--no-fallback]
//!        [--force-refresh] [--strict-rules] [--debug]

use rust_credit_score::config::Config;
use rust_credit_score::models::{ProviderId, ScoringOptions};
use rust_credit_score::orchestrator::ScoringService;
use std::env;

fn parse_args(args: &[String]) -> anyhow::Result<(String, ScoringOptions)> {
    let mut documento = None;
    let mut options = ScoringOptions::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--provider" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--provider requires a value"))?;
                options.provider = ProviderId::resolve(Some(value.as_str()));
            }
            "--no-fallback" => options.no_fallback = true,
            "--force-refresh" => options.force_refresh = true,
            "--strict-rules" => options.strict_rules = true,
            "--debug" => options.debug = true,
            flag if flag.starts_with("--") => anyhow::bail!("unknown flag {}", flag),
            value => {
                if documento.replace(value.to_string()).is_some() {
                    anyhow::bail!("only one documento may be given");
                }
            }
        }
    }

    let documento = documento.ok_or_else(|| {
        anyhow::anyhow!(
            "usage: score_document <documento> [--provider p] [--no-fallback] \
             [--force-refresh] [--strict-rules] [--debug]"
        )
    })?;
    Ok((documento, options))
}

/// Scores one document with the production configuration and prints the result as JSON.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays valid JSON
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_credit_score=info".into()),
        )
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let (documento, mut options) = parse_args(&args)?;

    let config = Config::from_env()?;
    let service = ScoringService::from_config(&config)?;

    let result = service.calculate_score(&documento, &mut options).await;
    tracing::info!("Result produced by provider {}", options.provider);

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
