//! Throughput benchmark: buffered writes, flush, cache reads, cold store
//! reads and deletes.

use anyhow::Result;
use colored::Colorize;
use pmem_core::{MemoryConfig, PersistentMemory};
use std::time::{Duration, Instant};

/// Cold reads are slow; cap them so large runs stay quick.
const MAX_COLD_READS: usize = 100;

pub async fn run(config: MemoryConfig, count: usize) -> Result<()> {
    println!("{}", "pmem benchmark".blue().bold());
    println!("   Database: {}", config.database_path.display());
    println!();

    let memory = PersistentMemory::new(config.clone());
    memory.open().await?;

    let keys: Vec<String> = (0..count).map(|i| format!("bench_key_{}", i)).collect();

    println!("{}", "1. Writes".cyan());
    let start = Instant::now();
    for (i, key) in keys.iter().enumerate() {
        memory.set(key, &format!("bench_value_{}", i))?;
    }
    let write_time = start.elapsed();
    report(count, write_time);

    println!("{}", "2. Flush".cyan());
    let start = Instant::now();
    memory.flush().await?;
    println!("   {:.3}s", start.elapsed().as_secs_f64());

    println!("{}", "3. Cache reads".cyan());
    let start = Instant::now();
    for key in &keys {
        let _: String = memory.get(key)?;
    }
    let cache_time = start.elapsed();
    report(count, cache_time);

    println!("{}", "4. Store reads (fresh instance)".cyan());
    let cold_reads = count.min(MAX_COLD_READS);
    let cold = PersistentMemory::new(config);
    cold.open().await?;
    let start = Instant::now();
    for key in keys.iter().take(cold_reads) {
        let _: Option<String> = cold.try_load(key).await?;
    }
    let store_time = start.elapsed();
    cold.close().await?;
    report(cold_reads, store_time);

    println!("{}", "5. Deletes".cyan());
    let start = Instant::now();
    for key in &keys {
        memory.remove(key)?;
    }
    let delete_time = start.elapsed();
    report(count, delete_time);

    memory.close().await?;

    let stats = memory.stats();
    println!();
    println!("{}", "Summary".green().bold());
    println!("   Writes:       {} ops/sec", ops_per_sec(count, write_time));
    println!("   Cache reads:  {} ops/sec", ops_per_sec(count, cache_time));
    println!("   Store reads:  {} ops/sec", ops_per_sec(cold_reads, store_time));
    println!("   Deletes:      {} ops/sec", ops_per_sec(count, delete_time));
    println!("   Applied: {}, failed: {}", stats.applied, stats.failed);

    Ok(())
}

fn report(ops: usize, elapsed: Duration) {
    let per_op_ms = if ops == 0 {
        0.0
    } else {
        elapsed.as_secs_f64() * 1000.0 / ops as f64
    };
    println!(
        "   {} ops in {:.3}s ({:.4}ms/op)",
        ops,
        elapsed.as_secs_f64(),
        per_op_ms
    );
}

fn ops_per_sec(ops: usize, elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return format!("> {}", ops);
    }
    format!("{:.0}", ops as f64 / secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ops_per_sec() {
        assert_eq!(ops_per_sec(100, Duration::from_secs(2)), "50");
        assert_eq!(ops_per_sec(100, Duration::ZERO), "> 100");
    }

    #[tokio::test]
    async fn test_bench_leaves_no_rows() {
        let dir = tempfile::tempdir().unwrap();
        let config = MemoryConfig::at(dir.path().join("bench.db"));

        run(config.clone(), 20).await.unwrap();

        let leftover = PersistentMemory::with_memory(config, |mem| async move {
            mem.try_load::<String>("bench_key_0").await
        })
        .await
        .unwrap();
        assert_eq!(leftover, None);
    }
}
