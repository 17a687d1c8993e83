//! Operator tooling for the dead-letter queue. The DLQ is terminal by design;
//! these commands are the only way entries leave it.

use config::Config;
use quill::WebhookEvent;
use quill_store::Store;

pub async fn list(config: &Config) -> anyhow::Result<()> {
    let store = Store::new(&config.persistence.database_path)?;
    let entries = store.list_dlq(100).await?;
    if entries.is_empty() {
        println!("dead-letter queue is empty");
        return Ok(());
    }
    for e in entries {
        let last = chrono::DateTime::from_timestamp_millis(e.last_failure_ms)
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| e.last_failure_ms.to_string());
        println!(
            "#{} task={} document={} attempts={} last_failure={} reason={}",
            e.id, e.task_id, e.document_id, e.attempt_count, last, e.failure_reason
        );
        if e.checkpoint.is_some() {
            println!("    checkpoint: {}", serde_json::to_string(&e.checkpoint)?);
        }
    }
    Ok(())
}

/// Moves one entry back into the pipeline: the document is re-enqueued through
/// the overflow table, which the running service drains within minutes. The
/// handler resumes from the checkpoint still stored under the task ID.
pub async fn retry(config: &Config, id: i64) -> anyhow::Result<()> {
    let store = Store::new(&config.persistence.database_path)?;
    let entry = store.take_dlq(id).await?;
    if let Some(checkpoint) = &entry.checkpoint {
        store.put_checkpoint(&entry.task_id, checkpoint).await?;
    }
    let event = WebhookEvent::synthetic(&entry.document_id);
    store
        .push_overflow(&serde_json::to_string(&event)?)
        .await?;
    println!(
        "DLQ entry #{} re-enqueued for document {} (drained by the running service)",
        id, entry.document_id
    );
    Ok(())
}

pub async fn delete(config: &Config, id: i64) -> anyhow::Result<()> {
    let store = Store::new(&config.persistence.database_path)?;
    store.delete_dlq(id).await?;
    println!("DLQ entry #{id} deleted");
    Ok(())
}
