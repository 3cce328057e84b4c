//! End-to-end lifecycle of telemetry records through the public API.

use std::cell::Cell;

use serde_json::{json, Value};

use installrecord::backend::MemoryBackend;
use installrecord::config::{Credentials, TelemetryConfig};
use installrecord::legacy::LegacySource;
use installrecord::migrate::MigrationOptions;
use installrecord::storage::{apply_fixup, drop_shadow_column, BatchSqlImporter};
use installrecord::{
    BackendError, InstallSession, MigrationOrchestrator, RecordStore, ReportOutcome, Status,
    TelemetryClient, TelemetryRecord,
};

fn opted_in() -> TelemetryConfig {
    TelemetryConfig { diagnostics: true }
}

#[test]
fn runtime_session_is_created_then_finalized_once() {
    let client = TelemetryClient::new(&opted_in(), Some(MemoryBackend::new()));
    let mut session = InstallSession::new(TelemetryRecord::installing("sess-1", "jellyfin"));

    assert!(matches!(
        client.create(&mut session),
        ReportOutcome::Created { .. }
    ));
    assert!(matches!(
        client.finalize(&mut session, "failed", 100),
        ReportOutcome::Updated { .. }
    ));
    assert_eq!(
        client.finalize(&mut session, "done", 0),
        ReportOutcome::AlreadyReported
    );

    let backend = client.backend().unwrap();
    assert_eq!(backend.mutation_count(), 2);
    let stored = backend.get_by_random_id("sess-1").unwrap();
    assert_eq!(stored.status, Status::Failed);
    assert_eq!(stored.exit_code, 100);
    assert_eq!(stored.error, installrecord::explain(100));
}

#[test]
fn finish_in_a_new_process_finds_the_record() {
    let backend = MemoryBackend::new();
    backend.seed(TelemetryRecord::installing("sess-2", "pihole"));
    let client = TelemetryClient::new(&opted_in(), Some(backend));

    // A fresh session knows only the token, as in `instrec report finish`.
    let mut session = InstallSession::new(TelemetryRecord::installing("sess-2", ""));
    assert!(client.finalize(&mut session, "success", 3).is_success());

    let stored = client.backend().unwrap().get_by_random_id("sess-2").unwrap();
    assert_eq!(stored.status, Status::Success);
    assert_eq!(stored.exit_code, 0);
    assert_eq!(stored.error, "");
}

#[test]
fn telemetry_outage_is_not_an_error() {
    let backend = MemoryBackend::new();
    backend.set_offline(true);
    let client = TelemetryClient::new(&opted_in(), Some(backend));
    let mut session = InstallSession::new(TelemetryRecord::installing("sess-3", "app"));

    assert!(matches!(client.create(&mut session), ReportOutcome::Failed(_)));
    assert!(matches!(
        client.finalize(&mut session, "done", 0),
        ReportOutcome::Failed(_)
    ));
    assert_eq!(
        client.finalize(&mut session, "done", 0),
        ReportOutcome::AlreadyReported
    );
}

/// Legacy source serving a fixed list, failing on one page.
struct FixedSource {
    records: Vec<Value>,
    broken_page: Option<u32>,
    pages_fetched: Cell<u32>,
}

impl LegacySource for FixedSource {
    fn base_url(&self) -> &str {
        "fixed"
    }

    fn total_entries(&self) -> Result<u64, BackendError> {
        Ok(self.records.len() as u64)
    }

    fn fetch_page(&self, page: u32, limit: u32) -> Result<Vec<Value>, BackendError> {
        self.pages_fetched.set(self.pages_fetched.get() + 1);
        if self.broken_page == Some(page) {
            return Err(BackendError::Transport("timed out".into()));
        }
        let start = (page - 1) as usize * limit as usize;
        Ok(self
            .records
            .iter()
            .skip(start)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

fn legacy_records(count: usize) -> Vec<Value> {
    (0..count)
        .map(|i| {
            json!({
                "random_id": format!("old-{i}"),
                "nsapp": "nginx",
                "status": if i % 2 == 0 { "done" } else { "failed" },
                "exit_code": {"$numberInt": "7"},
                "disk_size": "20G",
                "ct_type": 2,
                "created_at": {"$date": "2023-06-01T12:00:00Z"}
            })
        })
        .collect()
}

#[test]
fn migration_survives_a_failed_page_and_resumes() {
    let writer = Credentials::new("writer@example.test", "pw");
    let backend = MemoryBackend::new()
        .with_account("users", writer.clone())
        .requiring_auth();
    let options = MigrationOptions {
        batch_size: 100,
        page_delay: std::time::Duration::ZERO,
        restricted: Some(("users".to_string(), writer)),
        ..MigrationOptions::default()
    };

    let source = FixedSource {
        records: legacy_records(250),
        broken_page: Some(2),
        pages_fetched: Cell::new(0),
    };
    let mut first = MigrationOrchestrator::new(source, backend, "mem", options.clone());
    let summary = first.run().unwrap();
    assert_eq!(first.source().pages_fetched.get(), 3);
    assert_eq!((summary.migrated, summary.skipped, summary.failed), (150, 0, 100));

    let stored = first.target().get_by_random_id("old-1").unwrap();
    assert_eq!(stored.status, Status::Failed);
    assert_eq!(stored.disk_size, Some(20));
    assert_eq!(stored.ct_type, 1);
    assert_eq!(
        stored.original_created.as_deref(),
        Some("2023-06-01 12:00:00.000Z")
    );

    // Rerun everything once the source recovers: only page 2 is new.
    let retry_source = FixedSource {
        records: legacy_records(250),
        broken_page: None,
        pages_fetched: Cell::new(0),
    };
    let mut second = MigrationOrchestrator::new(retry_source, first.into_target(), "mem", options);
    let summary = second.run().unwrap();
    assert_eq!((summary.migrated, summary.skipped, summary.failed), (100, 150, 0));
    assert_eq!(second.target().len(), 250);
}

#[test]
fn offline_import_then_fixup() {
    let dir = tempfile::tempdir().unwrap();
    let export = dir.path().join("export.json");
    std::fs::write(
        &export,
        serde_json::to_string(&legacy_records(4)).unwrap(),
    )
    .unwrap();

    let store = RecordStore::open(dir.path().join("data.db")).unwrap();
    let importer = BatchSqlImporter::new("records", Some("legacy".into())).unwrap();
    let report = importer.import_file(&store, &export).unwrap();
    assert_eq!(report.inserted, 4);
    assert_eq!(importer.import_file(&store, &export).unwrap().inserted, 0);

    let imported = store.get_by_random_id("records", "old-0").unwrap().unwrap();
    assert_eq!(imported.status, Status::Success);
    assert_eq!(imported.created.as_deref(), Some("2023-06-01 12:00:00.000Z"));
    assert_eq!(imported.repo_source.as_deref(), Some("legacy"));

    // Direct imports write timestamps themselves; there is nothing to promote.
    assert_eq!(apply_fixup(&store, "records").unwrap(), 0);
    assert!(drop_shadow_column(&store, "records").unwrap());
    assert_eq!(apply_fixup(&store, "records").unwrap(), 0);
    assert_eq!(store.count("records").unwrap(), 4);
}
