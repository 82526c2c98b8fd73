//! HuggingFace `tokenizer.json` loader.
//!
//! `chunking.tokenizer` is either a path to a local `tokenizer.json` or a
//! HuggingFace repo id. Remote tokenizers are downloaded once from
//! `https://huggingface.co/{repo}/resolve/main/tokenizer.json` into
//! `~/.cache/contract-rag/tokenizers/` and reused from there.

use anyhow::{anyhow, bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use contract_rag_core::tokenizer::Tokenizer;

const TOKENIZER_FILE: &str = "tokenizer.json";

/// [`Tokenizer`] backed by the `tokenizers` crate. No special tokens are
/// added on encode or skipped on decode, so windows decode to their text.
pub struct HfTokenizer {
    name: String,
    inner: tokenizers::Tokenizer,
}

impl HfTokenizer {
    pub fn from_file(name: &str, path: &Path) -> Result<Self> {
        let inner = tokenizers::Tokenizer::from_file(path)
            .map_err(|e| anyhow!("Load tokenizer {}: {}", path.display(), e))?;
        Ok(Self {
            name: name.to_string(),
            inner,
        })
    }
}

impl Tokenizer for HfTokenizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| anyhow!("Tokenize: {}", e))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        self.inner
            .decode(ids, false)
            .map_err(|e| anyhow!("Detokenize: {}", e))
    }
}

/// Resolve `location` to a local file (downloading it if needed) and load it.
pub async fn load_tokenizer(location: &str) -> Result<Arc<dyn Tokenizer>> {
    let path = Path::new(location);
    if path.is_file() {
        return Ok(Arc::new(HfTokenizer::from_file(location, path)?));
    }
    if location.ends_with(".json") {
        bail!("tokenizer file not found: {}", location);
    }

    let cache_path = cache_dir()?.join(cache_key(location)).join(TOKENIZER_FILE);
    download_to_cache(location, &cache_path).await?;
    Ok(Arc::new(HfTokenizer::from_file(location, &cache_path)?))
}

fn cache_dir() -> Result<PathBuf> {
    let base = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    Ok(PathBuf::from(base)
        .join(".cache")
        .join("contract-rag")
        .join("tokenizers"))
}

fn cache_key(repo: &str) -> String {
    repo.replace('/', "--")
}

async fn download_to_cache(repo: &str, cache_path: &Path) -> Result<()> {
    if cache_path.exists() {
        return Ok(());
    }
    let url = format!(
        "https://huggingface.co/{}/resolve/main/{}",
        repo, TOKENIZER_FILE
    );
    tracing::info!(%url, "downloading tokenizer");
    let bytes = reqwest::get(&url)
        .await
        .map_err(|e| anyhow!("Download {}: {}", url, e))?
        .error_for_status()
        .map_err(|e| anyhow!("Download {}: {}", url, e))?
        .bytes()
        .await
        .map_err(|e| anyhow!("Read body: {}", e))?;
    if let Some(parent) = cache_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Create cache dir {}", parent.display()))?;
    }
    std::fs::write(cache_path, &bytes)
        .with_context(|| format!("Write cache {}", cache_path.display()))?;
    Ok(())
}
