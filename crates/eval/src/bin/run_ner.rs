use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use eval::{NerPipeline, RunConfig, load_dataset, load_resources, save_dataset, truncate_to_limit};
use extract::{ChatClient, PromptBuilder};
use knowledge::{KnowledgeResolver, SummaryCache, WikipediaClient};

/// Knowledge-augmented NER with a reflection pass, scored against gold entities.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// JSON run configuration
    #[arg(long, default_value = "./config/Bio_BC5CDR.json")]
    args_file: PathBuf,

    /// Process only the first N sentences (overrides the config)
    #[arg(long)]
    limit: Option<usize>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    let mut config = RunConfig::load(&args.args_file).await?;
    if args.limit.is_some() {
        config.limit = args.limit;
    }

    let resources = load_resources(config.resources_dir()).await?;
    let mut records = load_dataset(&config.test_file_path).await?;
    truncate_to_limit(&mut records, config.limit);
    info!(
        dataset = %config.dataset,
        model = %config.model_name,
        sentences = records.len(),
        "Loaded dataset"
    );

    let llm = ChatClient::new(
        config.llm.base_url.clone(),
        config.model_name.clone(),
        config.llm.api_key(),
        config.llm.timeout(),
    )?
    .with_retry(config.llm.retry.policy());
    info!(model = llm.model(), base_url = %config.llm.base_url, "Using chat completion endpoint");

    let wikipedia = WikipediaClient::new(
        config.knowledge.base_url.clone(),
        config.knowledge.timeout(),
    )?;
    let mut resolver = KnowledgeResolver::new(wikipedia)
        .with_limits(config.knowledge.sentences, config.knowledge.max_candidates);
    if config.knowledge.cache_enabled {
        resolver = resolver.with_cache(SummaryCache::new(config.knowledge.max_cache_entries));
    }

    let pipeline = NerPipeline::new(llm, resolver, PromptBuilder::new(resources), config.max_loop)
        .with_error_policy(config.on_error);

    pipeline.run(&mut records).await?;

    save_dataset(&config.save_file_path, &records)
        .await
        .context("Failed to save predictions")?;
    info!(path = %config.save_file_path.display(), "Predictions saved");

    let prf = eval::score(&records);
    println!("{} {} {}", prf.precision, prf.recall, prf.f1);

    print_type_table(&records);

    let snapshot = pipeline.metrics().snapshot();
    println!("\n{}", serde_json::to_string_pretty(&snapshot)?);

    Ok(())
}

fn print_type_table(records: &[eval::SentenceRecord]) {
    println!("\n{:<24} {:>9} {:>9} {:>9} {:>7} {:>7} {:>7}", "type", "precision", "recall", "f1", "match", "pred", "gold");
    for (entity_type, prf) in eval::score_by_type(records) {
        println!(
            "{:<24} {:>9.4} {:>9.4} {:>9.4} {:>7} {:>7} {:>7}",
            entity_type, prf.precision, prf.recall, prf.f1, prf.matched, prf.predicted, prf.gold
        );
    }
}
