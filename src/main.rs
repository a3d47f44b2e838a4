//! Region Cache demo
//!
//! Exercises a cache region end to end: loader, callbacks, expiry and
//! access ranking, then prints the region's statistics as JSON.

use std::thread::sleep;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use region_cache::{cache, install_sweeper, CacheError, Config, Entry};

/// Demo entry point.
///
/// # Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Start the sweep runtime
/// 4. Populate a region and read through its loader
/// 5. Wait for short-lived entries to expire
/// 6. Print the most accessed entries and region statistics
fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "region_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    info!(
        "Configuration loaded: sweep_worker_threads={}, sweep_blocking_threads={}, default_ttl={}ms",
        config.sweep_worker_threads, config.sweep_blocking_threads, config.default_ttl_ms
    );
    install_sweeper(&config)?;

    let ttl = Duration::from_millis(config.default_ttl_ms);
    let region = cache::<String, String>("demo");

    region.set_on_add(|entry| info!("Added {:?}", entry.key()));
    region.set_on_delete(|entry| {
        info!(
            "Removing {:?} after {} access(es)",
            entry.key(),
            entry.access_count()
        )
    });
    region.set_data_loader(|key: &String, _| {
        key.starts_with("user:")
            .then(|| Entry::new(key.clone(), Duration::ZERO, format!("loaded {}", key)))
    });

    region.add("greeting".to_string(), Duration::ZERO, "hello".to_string());
    let session = region.add("session".to_string(), ttl, "token".to_string());
    session.set_on_expire(|key| info!("{:?} expired", key));

    for _ in 0..3 {
        region.value(&"greeting".to_string())?;
    }
    let loaded = region.value(&"user:42".to_string())?;
    info!("Loader produced {:?}", loaded.value());

    match region.value(&"missing".to_string()) {
        Err(CacheError::KeyNotFoundOrNotLoadable(key)) => info!("{} is not loadable", key),
        other => info!("Unexpected lookup result: {:?}", other.map(|e| e.info())),
    }

    info!("Waiting {:?} for the session to expire", ttl);
    sleep(ttl + Duration::from_millis(100));
    info!("Session still cached: {}", region.exists(&"session".to_string()));

    for entry in region.most_accessed(2) {
        info!(
            "Top entry {:?}: {}",
            entry.key(),
            serde_json::to_string(&entry.info())?
        );
    }

    println!("{}", serde_json::to_string_pretty(&region.stats())?);
    Ok(())
}
