//! Query commands: `crag ask` (clause extraction) and `crag search`
//! (ranked chunks without generation).

use anyhow::{Context, Result};

use contract_rag_core::models::DocumentId;
use contract_rag_core::retrieve::RetrievalParams;

use crate::app::build_pipeline;
use crate::config::Config;

fn parse_id(contract_id: &str) -> Result<DocumentId> {
    DocumentId::parse(contract_id).with_context(|| format!("invalid contract id: {}", contract_id))
}

pub async fn run_ask(config: &Config, contract_id: &str, question: &str, json: bool) -> Result<()> {
    let id = parse_id(contract_id)?;
    if question.trim().is_empty() {
        anyhow::bail!("question must not be empty");
    }
    let pipeline = build_pipeline(config).await?;
    let answer = pipeline.ask(&id, question).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
        return Ok(());
    }

    println!("--- Answer ---");
    println!("{}", answer.answer);
    println!();
    println!("--- Matched chunk ---");
    if answer.matched_chunk.is_empty() {
        println!("(none)");
    } else {
        println!("{}", answer.matched_chunk);
    }
    Ok(())
}

pub async fn run_search(
    config: &Config,
    contract_id: &str,
    question: &str,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let id = parse_id(contract_id)?;
    let mut pipeline = build_pipeline(config).await?;
    if let Some(top_k) = limit {
        pipeline = pipeline.with_retrieval(RetrievalParams { top_k })?;
    }
    let hits = pipeline.retrieve(&id, question).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (rank, hit) in hits.iter().enumerate() {
        println!(
            "{}. [{:.4}] chunk {}",
            rank + 1,
            hit.score,
            hit.chunk_index
        );
        println!("    {}", hit.text.replace('\n', "\n    "));
        println!();
    }
    Ok(())
}
