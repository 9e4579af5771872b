//! BreachWatch CLI
//!
//! Runs one evaluation: fetch the newest samples, check the alert threshold,
//! estimate time to failure and page if needed.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use breachwatch::alerting::{
    assess, format_time_to_failure, AlertEvaluator, Assessment, Dispatcher, Evaluation, Subject,
};
use breachwatch::provider::PagerDutyClient;
use breachwatch::source::ElasticsearchSource;
use breachwatch::Config;
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// BreachWatch - page before the metric falls over
#[derive(Parser)]
#[command(name = "breachwatch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "BREACHWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate the subject once and page if the alert threshold is breached
    Check {
        #[command(flatten)]
        subject: SubjectArgs,

        /// PagerDuty integration routing key
        #[arg(long, env = "PAGERDUTY_KEY", hide_env_values = true)]
        pagerduty_key: Option<String>,

        /// PagerDuty service id reported as the event source
        #[arg(long, env = "PAGERDUTY_SERVICE")]
        pagerduty_service: Option<String>,

        /// Wait before retrying a rate-limited notification (e.g. "5s")
        #[arg(long, value_parser = humantime::parse_duration)]
        retry_delay: Option<Duration>,

        /// Maximum notification attempts, including the first
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Give up retrying after this long (e.g. "2m")
        #[arg(long, value_parser = humantime::parse_duration)]
        deadline: Option<Duration>,

        /// Evaluate and estimate, but do not page
        #[arg(long)]
        dry_run: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Args)]
struct SubjectArgs {
    /// URI of the Elasticsearch host to connect to
    #[arg(long)]
    es_host: Option<String>,

    /// Elasticsearch index to use
    #[arg(long)]
    index_name: Option<String>,

    /// Only check records with this field name matching the given value
    #[arg(long)]
    match_field: Option<String>,

    /// Value that must be present in the match field
    #[arg(long)]
    match_value: Option<String>,

    /// Field that contains a recognised timestamp for the record
    #[arg(long)]
    timestamp_field: Option<String>,

    /// Field that contains the data to check; must be numeric
    #[arg(long)]
    count_field: Option<String>,

    /// Alert if the value of the count field is higher than this number
    #[arg(long)]
    threshold: Option<f64>,

    /// Assume failure if the count gets this high; used to estimate time to failure
    #[arg(long)]
    failure_threshold: Option<f64>,

    /// Number of records to sample for the estimate
    #[arg(long)]
    sample_length: Option<usize>,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config, cli.verbose);

    let result = match cli.command {
        Commands::Check {
            subject,
            pagerduty_key,
            pagerduty_service,
            retry_delay,
            max_attempts,
            deadline,
            dry_run,
        } => {
            let mut config = config;
            subject.apply(&mut config);
            if pagerduty_key.is_some() {
                config.pagerduty.routing_key = pagerduty_key;
            }
            if pagerduty_service.is_some() {
                config.pagerduty.service_id = pagerduty_service;
            }
            if let Some(delay) = retry_delay {
                config.dispatch.set_retry_delay(delay);
            }
            if let Some(attempts) = max_attempts {
                config.dispatch.max_attempts = attempts;
            }

            if dry_run {
                run_dry(config).await
            } else {
                run_check(config, deadline).await
            }
        }
        Commands::Completions { shell } => {
            generate_completions(shell);
            Ok(ExitCode::SUCCESS)
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

impl SubjectArgs {
    fn apply(self, config: &mut Config) {
        if let Some(url) = self.es_host {
            config.elasticsearch.url = url;
        }
        if let Some(index) = self.index_name {
            config.elasticsearch.index = index;
        }
        if let Some(field) = self.match_field {
            config.subject.match_field = field;
        }
        if let Some(value) = self.match_value {
            config.subject.match_value = value;
        }
        if let Some(field) = self.timestamp_field {
            config.subject.timestamp_field = field;
        }
        if let Some(field) = self.count_field {
            config.subject.count_field = field;
        }
        if let Some(threshold) = self.threshold {
            config.thresholds.alert_threshold = threshold;
        }
        if let Some(threshold) = self.failure_threshold {
            config.thresholds.failure_threshold = threshold;
        }
        if let Some(length) = self.sample_length {
            config.subject.sample_length = length;
        }
    }
}

fn init_logging(config: &Config, verbose: bool) {
    let log_level = if verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    if config.logging.format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn subject_of(config: &Config) -> anyhow::Result<Subject> {
    if config.subject.match_field.is_empty() || config.subject.match_value.is_empty() {
        anyhow::bail!("--match-field and --match-value are required");
    }
    Ok(Subject::new(
        config.subject.match_field.clone(),
        config.subject.match_value.clone(),
    ))
}

async fn connect_source(config: &Config) -> anyhow::Result<ElasticsearchSource> {
    let source = ElasticsearchSource::new(&config.elasticsearch, &config.subject)?;
    source
        .ping()
        .await
        .with_context(|| format!("could not connect to {}", config.elasticsearch.url))?;
    Ok(source)
}

async fn run_check(config: Config, deadline: Option<Duration>) -> anyhow::Result<ExitCode> {
    config.validate()?;
    let subject = subject_of(&config)?;
    let provider = PagerDutyClient::new(&config.pagerduty)?;
    let source = connect_source(&config).await?;

    info!(
        index = %config.elasticsearch.index,
        subject = %subject.key,
        threshold = config.thresholds.alert_threshold,
        failure_threshold = config.thresholds.failure_threshold,
        "Checking subject"
    );

    let evaluator = AlertEvaluator::new(
        source,
        Dispatcher::new(provider, config.dispatch.retry_policy()),
        subject,
        config.thresholds,
        config.subject.sample_length,
    );

    let cancel = CancellationToken::new();
    spawn_cancel_triggers(&cancel, deadline);

    match evaluator.run(&cancel).await? {
        Evaluation::InRange { current } => {
            println!(
                "{} {} is currently in range at {current:.2}",
                config.subject.match_field, config.subject.match_value
            );
            Ok(ExitCode::SUCCESS)
        }
        Evaluation::Alerted { context, outcome } => {
            println!(
                "{} (estimated failure in {})",
                context.summary,
                format_time_to_failure(context.estimated_seconds_to_failure)
            );
            let attempts = outcome.attempts();
            match outcome.into_result() {
                Ok(dedup_key) => {
                    println!("Registered alert after {attempts} attempt(s), dedup key is {dedup_key}");
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => Err(anyhow::Error::new(e)
                    .context(format!("alert not delivered after {attempts} attempt(s)"))),
            }
        }
    }
}

async fn run_dry(config: Config) -> anyhow::Result<ExitCode> {
    config.validate()?;
    let subject = subject_of(&config)?;
    let source = connect_source(&config).await?;

    let assessment = assess(
        &source,
        &subject,
        config.thresholds,
        config.subject.sample_length,
    )
    .await?;

    match assessment {
        Assessment::InRange { current } => {
            println!(
                "{} {} is currently in range at {current:.2}",
                subject.field, subject.key
            );
        }
        Assessment::Breached { context, estimate } => {
            println!(
                "{}; trend {:.4}/s, estimated failure in {} (dry run, not paged)",
                context.summary,
                estimate.rate,
                format_time_to_failure(estimate.seconds_to_failure)
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Cancel the dispatch on Ctrl-C or once `deadline` has passed
fn spawn_cancel_triggers(cancel: &CancellationToken, deadline: Option<Duration>) {
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling dispatch");
            on_signal.cancel();
        }
    });

    if let Some(deadline) = deadline {
        let on_deadline = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            warn!(
                deadline = %humantime::format_duration(deadline),
                "Deadline reached, cancelling dispatch"
            );
            on_deadline.cancel();
        });
    }
}

fn generate_completions(shell: clap_complete::Shell) {
    use clap::CommandFactory;
    use clap_complete::generate;
    use std::io;

    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "breachwatch", &mut io::stdout());
}
