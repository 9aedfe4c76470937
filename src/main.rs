use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use content_lro::{
    analyzer::{
        AnalyzerConfig, AnalyzerTemplate, ContentLocator, ContentUnderstandingClient, LroClient,
        PollPolicy, ResultPayload, SubmitRequest,
    },
    auth, config::Config, logging, pipeline,
};
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "content-lro",
    about = "Create analyzers, analyze content and wait for the results"
)]
struct Cli {
    /// Override the poll interval in seconds.
    #[arg(long, global = true)]
    poll_interval: Option<u64>,
    /// Override the poll timeout in seconds.
    #[arg(long, global = true)]
    timeout: Option<u64>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create (or replace) an analyzer from a JSON template.
    CreateAnalyzer {
        #[arg(long)]
        id: String,
        #[arg(long)]
        template: PathBuf,
    },
    /// Analyze a file or URL with an existing analyzer.
    Analyze {
        #[arg(long)]
        analyzer_id: String,
        source: String,
        /// Print the raw result payload instead of markdown.
        #[arg(long)]
        json: bool,
    },
    /// Create an analyzer, analyze one source, then delete the analyzer.
    Oneshot {
        #[arg(long)]
        template: PathBuf,
        #[arg(long, default_value = "content-lro")]
        prefix: String,
        source: String,
        #[arg(long)]
        json: bool,
    },
    /// Analyze many files, directories or URLs with a temporary analyzer.
    Run {
        #[arg(long)]
        template: PathBuf,
        #[arg(long, default_value = "content-lro")]
        prefix: String,
        #[arg(required = true)]
        sources: Vec<String>,
        #[arg(long)]
        json: bool,
    },
    /// List analyzers defined on the resource.
    List,
    /// Show one analyzer definition.
    Get { id: String },
    /// Delete an analyzer.
    Delete { id: String },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    logging::init_tracing();
    if let Err(err) = run().await {
        tracing::error!(error = %format!("{err:#}"), "Command failed");
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env().context("failed to load configuration from environment")?;
    let policy = resolve_policy(&config, cli.poll_interval, cli.timeout)?;
    let credentials =
        auth::provider_from_config(&config).context("failed to set up credentials")?;
    let transport = ContentUnderstandingClient::new(&config, credentials)
        .context("failed to build HTTP client")?;
    let client = LroClient::new(transport, policy);

    match cli.command {
        Command::CreateAnalyzer { id, template } => {
            let template = AnalyzerTemplate::from_path(&template)?;
            let payload = client
                .submit_and_wait(&id, &SubmitRequest::CreateAnalyzer(template))
                .await
                .with_context(|| format!("failed to create analyzer {id}"))?;
            print_json(payload.as_value())
        }
        Command::Analyze {
            analyzer_id,
            source,
            json,
        } => {
            let payload = client
                .submit_and_wait(
                    &analyzer_id,
                    &SubmitRequest::Analyze(ContentLocator::parse(&source)),
                )
                .await
                .with_context(|| format!("failed to analyze {source}"))?;
            print_payload(&payload, json)
        }
        Command::Oneshot {
            template,
            prefix,
            source,
            json,
        } => {
            let config = AnalyzerConfig::new(
                pipeline::unique_analyzer_id(&prefix),
                AnalyzerTemplate::from_path(&template)?,
                ContentLocator::parse(&source),
            );
            let payload = client
                .run(&config)
                .await
                .with_context(|| format!("failed to analyze {source}"))?;
            print_payload(&payload, json)
        }
        Command::Run {
            template,
            prefix,
            sources,
            json,
        } => {
            let template = AnalyzerTemplate::from_path(&template)?;
            let sources = pipeline::collect_sources(&sources);
            if sources.is_empty() {
                bail!("no sources found");
            }
            let report = pipeline::run_batch(&client, &template, &prefix, sources)
                .await
                .context("failed to create temporary analyzer")?;

            if json {
                let results: Vec<_> = report
                    .outcomes
                    .iter()
                    .map(|outcome| match &outcome.result {
                        Ok(payload) => json!({
                            "source": outcome.source.to_string(),
                            "result": payload.as_value(),
                        }),
                        Err(error) => json!({
                            "source": outcome.source.to_string(),
                            "error": error.to_string(),
                        }),
                    })
                    .collect();
                print_json(&json!({
                    "analyzerId": report.analyzer_id,
                    "analyzerDeleted": report.analyzer_deleted,
                    "metrics": report.metrics,
                    "results": results,
                }))?;
            } else {
                for (source, payload) in report.succeeded() {
                    println!("<!-- source: {source} -->\n{}\n", payload.markdown());
                }
                eprintln!("{}", serde_json::to_string(&report.metrics)?);
            }

            if report.metrics.operations_succeeded == 0 {
                bail!("no source could be analyzed");
            }
            Ok(())
        }
        Command::List => {
            let analyzers = client.transport().list_analyzers().await?;
            print_json(&json!(analyzers))
        }
        Command::Get { id } => {
            let analyzer = client.transport().get_analyzer(&id).await?;
            print_json(&analyzer)
        }
        Command::Delete { id } => {
            if !client.delete(&id).await {
                bail!("analyzer {id} could not be deleted");
            }
            Ok(())
        }
    }
}

fn resolve_policy(
    config: &Config,
    interval: Option<u64>,
    timeout: Option<u64>,
) -> Result<PollPolicy> {
    let mut policy = config.poll_policy();
    if let Some(seconds) = interval {
        if seconds == 0 {
            bail!("--poll-interval must be greater than zero");
        }
        policy.interval = Duration::from_secs(seconds);
    }
    if let Some(seconds) = timeout {
        policy.timeout = Duration::from_secs(seconds);
    }
    Ok(policy)
}

fn print_payload(payload: &ResultPayload, json: bool) -> Result<()> {
    if json {
        print_json(payload.as_value())
    } else {
        println!("{}", payload.markdown());
        Ok(())
    }
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
