//! Single-key commands

use anyhow::{bail, Result};
use colored::Colorize;
use pmem_core::{MemoryConfig, PersistentMemory, PmemError};
use serde_json::Value;

pub async fn get(config: MemoryConfig, key: &str) -> Result<()> {
    let value = PersistentMemory::with_memory(config, |mem| async move {
        mem.try_load::<Value>(key).await
    })
    .await?;

    match value {
        Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        None => println!("{} {} not found", "✗".red(), key),
    }

    Ok(())
}

pub async fn set(config: MemoryConfig, key: &str, raw: &str) -> Result<()> {
    let value = parse_value(raw);

    let dirty = PersistentMemory::with_memory(config, |mem| async move {
        mem.save(key, &value).await?;
        mem.flush().await?;
        Ok(mem.dirty_keys())
    })
    .await?;

    if !dirty.is_empty() {
        bail!("{} was cached but could not be written to the database", key);
    }

    println!("{} Saved {}", "✓".green(), key);
    Ok(())
}

pub async fn delete(config: MemoryConfig, key: &str) -> Result<()> {
    PersistentMemory::with_memory(config, |mem| async move {
        mem.delete(key).await?;
        mem.flush().await?;
        if !mem.dirty_keys().is_empty() {
            return Err(PmemError::Storage(format!("delete of {} was not applied", key)));
        }
        Ok(())
    })
    .await?;

    println!("{} Deleted {}", "✓".green(), key);
    Ok(())
}

/// JSON if it parses, otherwise the raw text as a string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
