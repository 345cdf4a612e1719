//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::api;
use crate::config::Config;
use crate::remote::ConsistencyBridge;
use crate::service::TagService;
use std::path::{Path, PathBuf};
use tagstore_core::primitives::MAX_BATCH_RECORDS;
use tagstore_core::{ExportFormat, RecordStore, TagError, TagRecord, TagSink};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum file size for ingestion (100 MB).
const MAX_INGEST_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), TagError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| TagError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(TagError::InvalidRecord(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Resolve an input path: canonical, existing, a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, TagError> {
    let canonical = path.canonicalize().map_err(|e| {
        TagError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(TagError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Resolve an output path: the parent must be an existing directory.
fn validate_output_path(path: &Path) -> Result<PathBuf, TagError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        TagError::IoError(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(TagError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| TagError::IoError("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

fn print_json(value: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(config: &Config, host: &str, port: u16) -> Result<(), TagError> {
    let service = TagService::from_config(config)?;

    println!("tagstore Server Starting...");
    println!();
    println!("Configuration:");
    println!("  Host:      {}", host);
    println!("  Port:      {}", port);
    println!("  Store:     {}", config.store.dir.display());
    println!("  Threshold: {}", config.buffer.threshold);
    println!("  Autosave:  {}s", config.autosave.interval_secs);
    println!("  Remote:    {}", service.bridge().state());
    println!();
    println!("Endpoints:");
    println!("  POST /tags          - Save tags (buffered)");
    println!("  GET  /tags          - List records (?uid=)");
    println!("  GET  /tags/{{id}}     - Read one record");
    println!("  POST /tags/autosave - Autosave tick");
    println!("  POST /tags/flush    - Flush buffered tags");
    println!("  POST /flag          - Flag or reject an image");
    println!("  POST /offensive     - Report an offensive image");
    println!("  GET  /counts        - Record counts");
    println!("  POST /export        - Export the store");
    println!("  GET  /status        - Store status");
    println!("  GET  /health        - Health check");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let addr = format!("{}:{}", host, port);
    api::run_server(&addr, service).await
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show store status.
pub async fn cmd_status(config: &Config, json_mode: bool) -> Result<(), TagError> {
    let service = TagService::from_config(config)?;
    let status = service.status().await?;

    if json_mode {
        print_json(&serde_json::json!({
            "store": config.store.dir.to_string_lossy(),
            "backend": status.backend,
            "records": status.records,
            "failures": status.failures,
            "remote_state": status.remote_state,
        }));
        return Ok(());
    }

    println!("tagstore Status");
    println!("===============");
    println!("Store:    {}", config.store.dir.display());
    println!("Backend:  {}", status.backend);
    println!();
    println!("Records:  {}", status.records);
    println!("Failures: {}", status.failures);
    println!("Remote:   {}", status.remote_state);

    Ok(())
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Initialize an empty store, or clear one with `force`.
pub fn cmd_init(config: &Config, force: bool) -> Result<(), TagError> {
    let existing = tagstore_core::StorePaths::in_dir(&config.store.dir).json;
    if existing.exists() && !force {
        return Err(TagError::IoError(format!(
            "Store already exists at {}. Use --force to clear it.",
            config.store.dir.display()
        )));
    }

    let mut store = RecordStore::open(&config.store.dir)?;
    if force {
        store.clear()?;
        tracing::warn!(dir = %config.store.dir.display(), "Store cleared");
    }
    println!("Initialized tag store at {}", config.store.dir.display());

    Ok(())
}

// =============================================================================
// INGEST COMMAND
// =============================================================================

/// Upsert records from a JSON array file and mirror what was written.
pub async fn cmd_ingest(config: &Config, json_mode: bool, file: &Path) -> Result<(), TagError> {
    let validated_path = validate_file_path(file)?;
    validate_file_size(&validated_path, MAX_INGEST_FILE_SIZE)?;

    let data = std::fs::read(&validated_path)
        .map_err(|e| TagError::IoError(format!("Read file: {}", e)))?;
    let items: Vec<serde_json::Value> = serde_json::from_slice(&data)
        .map_err(|e| TagError::DeserializationError(format!("Expected a JSON array: {}", e)))?;

    if items.len() > MAX_BATCH_RECORDS {
        return Err(TagError::InvalidRecord(format!(
            "{} records exceeds maximum batch of {}",
            items.len(),
            MAX_BATCH_RECORDS
        )));
    }

    let mut records = Vec::with_capacity(items.len());
    let mut unreadable = 0usize;
    for (index, item) in items.into_iter().enumerate() {
        match serde_json::from_value::<TagRecord>(item) {
            Ok(record) => records.push(record),
            Err(e) => {
                unreadable += 1;
                tracing::warn!(index, error = %e, "Skipping unreadable record");
            }
        }
    }

    let mut store = RecordStore::open(&config.store.dir)?;
    let outcomes = store.upsert_batch(&records);
    let written: Vec<&TagRecord> = records
        .iter()
        .zip(&outcomes)
        .filter(|(_, o)| o.is_ok())
        .map(|(r, _)| r)
        .collect();
    let rejected = outcomes.iter().filter(|o| o.is_err()).count();

    let bridge = ConsistencyBridge::from_settings(&config.remote);
    let mut mirrored = 0usize;
    for record in &written {
        if bridge.mirror(record).await == crate::remote::MirrorOutcome::Mirrored {
            mirrored += 1;
        }
    }

    if json_mode {
        print_json(&serde_json::json!({
            "written": written.len(),
            "rejected": rejected,
            "unreadable": unreadable,
            "mirrored": mirrored,
        }));
    } else {
        println!(
            "Ingested {} records ({} rejected, {} unreadable, {} mirrored)",
            written.len(),
            rejected,
            unreadable,
            mirrored
        );
    }

    Ok(())
}

// =============================================================================
// EXPORT COMMAND
// =============================================================================

/// Write an export to `output`.
pub async fn cmd_export(
    config: &Config,
    json_mode: bool,
    output: &Path,
    format: &str,
) -> Result<(), TagError> {
    let validated_output = validate_output_path(output)?;
    let format: ExportFormat = format.parse()?;

    let service = TagService::from_config(config)?;
    let artifact = service.export(format).await?;

    std::fs::write(&validated_output, &artifact.bytes)
        .map_err(|e| TagError::IoError(format!("Write file: {}", e)))?;

    if json_mode {
        print_json(&serde_json::json!({
            "format": format.to_string(),
            "bytes": artifact.bytes.len(),
            "checksum": artifact.checksum,
            "output": validated_output.to_string_lossy(),
        }));
    } else {
        println!("Checksum: {}", artifact.checksum);
        println!(
            "Exported {} bytes to {}",
            artifact.bytes.len(),
            validated_output.display()
        );
    }

    Ok(())
}

// =============================================================================
// COUNT COMMAND
// =============================================================================

/// Show local and remote counts.
pub async fn cmd_count(config: &Config, json_mode: bool, uid: Option<&str>) -> Result<(), TagError> {
    let service = TagService::from_config(config)?;
    let counts = service.counts(uid).await?;

    if json_mode {
        let value = serde_json::to_value(&counts)
            .map_err(|e| TagError::SerializationError(e.to_string()))?;
        print_json(&value);
        return Ok(());
    }

    println!("Local total:  {}", counts.local_total);
    if let Some(n) = counts.local_user {
        println!("Local user:   {}", n);
    }
    println!("Remote total: {} ({})", counts.remote_total, counts.remote_state);
    if let Some(n) = counts.remote_user {
        println!("Remote user:  {}", n);
    }

    Ok(())
}

// =============================================================================
// RECONCILE COMMAND
// =============================================================================

/// Push every local record to the remote store.
pub async fn cmd_reconcile(config: &Config, json_mode: bool) -> Result<(), TagError> {
    let service = TagService::from_config(config)?;
    if !service.bridge().is_configured() {
        return Err(TagError::ConfigError(
            "No remote configured. Set [remote] database_url or TAGSTORE_REMOTE_URL.".to_string(),
        ));
    }

    let report = service.reconcile().await?;

    if json_mode {
        let value = serde_json::to_value(report)
            .map_err(|e| TagError::SerializationError(e.to_string()))?;
        print_json(&value);
    } else {
        println!(
            "Reconciled: {} mirrored, {} failed",
            report.mirrored, report.failed
        );
    }

    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &Path) -> Config {
        Config::default().with_store_dir(Some(dir.to_path_buf()))
    }

    #[test]
    fn init_refuses_existing_store_without_force() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config_in(dir.path());

        cmd_init(&config, false).expect("first init");
        assert!(cmd_init(&config, false).is_err());
        cmd_init(&config, true).expect("forced init");
    }

    #[tokio::test]
    async fn ingest_then_export_failures() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config_in(&dir.path().join("store"));

        let input = dir.path().join("records.json");
        std::fs::write(
            &input,
            br#"[{"image_id":"a","flagged":true},{"image_id":""},{"image_id":"b"},"junk"]"#,
        )
        .expect("input");

        cmd_ingest(&config, true, &input).await.expect("ingest");
        let store = RecordStore::open(&config.store.dir).expect("open");
        assert_eq!(store.count_total().expect("count"), 2);

        let output = dir.path().join("failures.csv");
        cmd_export(&config, true, &output, "failures")
            .await
            .expect("export");
        let csv = std::fs::read_to_string(&output).expect("read");
        assert_eq!(csv.lines().count(), 2);
        assert!(csv.lines().nth(1).expect("row").starts_with("a,"));
    }

    #[test]
    fn output_path_requires_existing_parent() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(validate_output_path(&dir.path().join("out.json")).is_ok());
        assert!(validate_output_path(&dir.path().join("missing/out.json")).is_err());
    }

    #[tokio::test]
    async fn reconcile_requires_remote() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = cmd_reconcile(&config_in(dir.path()), true).await;
        assert!(matches!(result, Err(TagError::ConfigError(_))));
    }
}
