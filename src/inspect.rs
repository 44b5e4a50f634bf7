//! One-off inspection commands: `classify`, `score`, `categories`.

use anyhow::Result;
use std::sync::Arc;

use tender_harvest_core::taxonomy::Decision;

use crate::config::Config;
use crate::embedding::create_provider;
use crate::gate::{RelevanceGate, RelevanceScorer};

pub fn run_classify(config: &Config, title: &str, description: Option<&str>) -> Result<()> {
    let taxonomy = config.load_taxonomy()?;
    let result = taxonomy.explain(title, description.unwrap_or_default());

    println!("category: {}", result.category);
    println!("name: {}", taxonomy.category_name(&result.category));
    match &result.decision {
        Decision::Excluded { keyword } => println!("rule: excluded ({})", keyword),
        Decision::StrongSignal { keyword } => println!("rule: strong signal ({})", keyword),
        Decision::Weighted { primary, secondary } => {
            println!("rule: weighted (primary {}, secondary {})", primary, secondary)
        }
    }
    Ok(())
}

pub async fn run_score(config: &Config, text: &str, json: bool) -> Result<()> {
    config.require_embeddings()?;
    let provider = create_provider(&config.embedding)?;
    let gate = RelevanceGate::new(Arc::clone(&provider), &config.relevance);
    let score = gate.score(text).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&score)?);
        return Ok(());
    }

    let thresholds = gate.thresholds();
    println!("similarity: {:.4} (threshold {:.2})", score.similarity, thresholds.similarity);
    println!("probability: {:.4} (threshold {:.2})", score.probability, thresholds.probability);
    println!("model_version: {}", score.model_version);
    println!("accept: {}", score.accept);
    Ok(())
}

pub fn run_categories(config: &Config) -> Result<()> {
    let taxonomy = config.load_taxonomy()?;
    println!("{:<24} NAME", "KEY");
    for (key, name) in taxonomy.categories() {
        println!("{:<24} {}", key, name);
    }
    Ok(())
}
