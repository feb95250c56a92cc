//! Embeds a few sentences with a running Ollama server and compares them.
//!
//! Configure with `EMBED_MODEL`, `OLLAMA_BASE_URL` and `OLLAMA_TIMEOUT`.

use campus_rag_embed::{EmbedConfig, EmbeddingProvider, OllamaProvider};

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-12);
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-12);
    dot / (na * nb)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = EmbedConfig::from_env()?;
    println!("Model: {}", config.model_name);
    println!("Server: {}", config.base_url);

    let provider = OllamaProvider::new(config)?;

    let texts = vec![
        "教务处办公时间为周一至周五 8:30-17:00。".to_string(),
        "请假需要先联系辅导员并提交申请。".to_string(),
        "The academic affairs office opens on weekdays.".to_string(),
    ];
    let result = provider.embed_texts(&texts).await?;
    println!("Generated {} embeddings of dimension {}", result.len(), result.dimension);

    let query = provider.embed_text("教务处几点上班").await?;
    for (text, embedding) in texts.iter().zip(result.embeddings.iter()) {
        println!("{:.4}  {}", cosine(&query, embedding), text);
    }

    Ok(())
}
