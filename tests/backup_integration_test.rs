use backup_tool::config::file::FileConfig;
use backup_tool::config::{
    AzureSettings, DataSourceKind, FileSourceSettings, GrafanaSettings, LocalSettings,
    OutputOverrides, SourceSettings, StorageKind, StorageSettings,
};
use backup_tool::core::Sink;
use backup_tool::{BackupEngine, BackupError, DataSource, RunOptions, Settings, StorageBackend};
use chrono::{DateTime, Local, TimeZone};
use flate2::read::GzDecoder;
use httpmock::prelude::*;
use httpmock::Method::HEAD;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use tempfile::TempDir;

fn march_15() -> DateTime<Local> {
    Local.with_ymd_and_hms(2024, 3, 15, 10, 30, 0).single().unwrap()
}

fn run_options() -> RunOptions {
    RunOptions {
        prefix: Some("nightly".to_string()),
        filename_template: "backup.tgz".to_string(),
        ..Default::default()
    }
}

fn grafana_settings(server: &MockServer) -> GrafanaSettings {
    GrafanaSettings {
        url: server.base_url(),
        token: "integration-token".to_string(),
        timeout_seconds: 5,
    }
}

/// Entry names and contents of a tar.gz file, in archive order.
fn read_archive(path: &Path) -> Vec<(String, String)> {
    let bytes = std::fs::read(path).unwrap();
    let mut archive = tar::Archive::new(GzDecoder::new(bytes.as_slice()));
    archive
        .entries()
        .unwrap()
        .map(|entry| {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().into_owned();
            let mut content = String::new();
            entry.read_to_string(&mut content).unwrap();
            (name, content)
        })
        .collect()
}

fn mock_grafana_health(server: &MockServer) {
    server.mock(|when, then| {
        when.method(GET).path("/api/health");
        then.status(200)
            .json_body(serde_json::json!({"database": "ok", "version": "10.4.0"}));
    });
}

#[tokio::test]
async fn test_grafana_to_local_skips_failed_dashboard() {
    let temp_dir = TempDir::new().unwrap();
    let server = MockServer::start();
    mock_grafana_health(&server);

    let search = server.mock(|when, then| {
        when.method(GET)
            .path("/api/search")
            .query_param("type", "dash-db")
            .header("authorization", "Bearer integration-token");
        then.status(200).json_body(serde_json::json!([
            {"id": 1, "uid": "a", "title": "Alpha", "uri": "db/alpha", "url": "/d/a/alpha"},
            {"id": 2, "uid": "b", "title": "Beta", "uri": "db/beta", "url": "/d/b/beta"},
            {"id": 3, "uid": "c", "title": "Gamma", "uri": "db/gamma", "url": "/d/c/gamma"}
        ]));
    });
    server.mock(|when, then| {
        when.method(GET).path("/api/dashboards/uid/a");
        then.status(200).body(r#"{"dashboard":{"uid":"a"}}"#);
    });
    server.mock(|when, then| {
        when.method(GET).path("/api/dashboards/uid/b");
        then.status(500);
    });
    server.mock(|when, then| {
        when.method(GET).path("/api/dashboards/uid/c");
        then.status(200).body(r#"{"dashboard":{"uid":"c"}}"#);
    });

    let source = DataSource::from_settings(SourceSettings::Grafana(
        grafana_settings(&server),
    ));
    let sink = StorageBackend::from_settings(StorageSettings::Local(
        LocalSettings {
            root: temp_dir.path().to_path_buf(),
        },
    ))
    .await
    .unwrap();

    let mut engine = BackupEngine::new(source, sink, run_options()).with_clock(march_15);
    let report = engine.run().await.unwrap();

    search.assert();
    assert_eq!(report.destination, "nightly/2024/3/15/backup.tgz");
    assert_eq!(report.summary.total, 3);
    assert_eq!(report.summary.archived, 2);
    assert_eq!(report.summary.failed_ids, vec!["b".to_string()]);

    let written = temp_dir.path().join("nightly/2024/3/15/backup.tgz");
    assert_eq!(std::fs::metadata(&written).unwrap().len(), report.bytes_written);
    assert_eq!(
        read_archive(&written),
        vec![
            ("a.json".to_string(), r#"{"dashboard":{"uid":"a"}}"#.to_string()),
            ("c.json".to_string(), r#"{"dashboard":{"uid":"c"}}"#.to_string()),
        ]
    );
}

#[tokio::test]
async fn test_file_source_resolved_from_environment() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    std::fs::write(input.path().join("home.json"), br#"{"title":"Home"}"#).unwrap();
    std::fs::write(input.path().join("alerts.json"), br#"{"title":"Alerts"}"#).unwrap();

    let env: HashMap<&str, String> = HashMap::from([
        ("FILE_SOURCE_DIR", input.path().display().to_string()),
        ("LOCAL_STORAGE_ROOT", output.path().display().to_string()),
    ]);
    let settings = Settings::resolve(
        DataSourceKind::File,
        StorageKind::Local,
        OutputOverrides {
            prefix: None,
            filename: Some("{kind}-%Y%m%d.tgz".to_string()),
        },
        FileConfig::default(),
        |key: &str| env.get(key).cloned(),
    )
    .unwrap();

    let source = DataSource::from_settings(settings.source);
    let sink = StorageBackend::from_settings(settings.storage).await.unwrap();
    let mut engine = BackupEngine::new(source, sink, settings.run).with_clock(march_15);
    let report = engine.run().await.unwrap();

    assert_eq!(report.destination, "2024/3/15/files-20240315.tgz");
    let entries = read_archive(&output.path().join("2024/3/15/files-20240315.tgz"));
    let names: Vec<&str> = entries.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["alerts.json", "home.json"]);
}

async fn file_to_local(input: &Path, output: &Path) -> BackupEngine<DataSource, StorageBackend> {
    let source = DataSource::from_settings(SourceSettings::File(FileSourceSettings {
        dir: input.to_path_buf(),
    }));
    let sink = StorageBackend::from_settings(StorageSettings::Local(LocalSettings {
        root: output.to_path_buf(),
    }))
    .await
    .unwrap();
    BackupEngine::new(source, sink, run_options()).with_clock(march_15)
}

#[tokio::test]
async fn test_second_run_in_same_minute_does_not_overwrite() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    std::fs::write(input.path().join("one.json"), b"{}").unwrap();

    let first = file_to_local(input.path(), output.path()).await.run().await.unwrap();
    let written = output.path().join(&first.destination);
    let original = std::fs::read(&written).unwrap();

    let err = file_to_local(input.path(), output.path()).await.run().await.unwrap_err();

    assert!(matches!(err, BackupError::AlreadyExists { .. }));
    assert_eq!(err.exit_code(), 1);
    assert_eq!(std::fs::read(&written).unwrap(), original);
}

#[tokio::test]
async fn test_missing_azure_container_stops_before_fetching() {
    let grafana = MockServer::start();
    mock_grafana_health(&grafana);
    let search = grafana.mock(|when, then| {
        when.method(GET).path("/api/search");
        then.status(200).json_body(serde_json::json!([]));
    });

    let azure = MockServer::start();
    let container = azure.mock(|when, then| {
        when.method(HEAD)
            .path("/backups")
            .query_param("restype", "container");
        then.status(404);
    });
    let upload = azure.mock(|when, then| {
        when.method(PUT);
        then.status(201);
    });

    let source = DataSource::from_settings(SourceSettings::Grafana(
        grafana_settings(&grafana),
    ));
    let sink = StorageBackend::from_settings(StorageSettings::Azure(
        AzureSettings {
            account: "devaccount".to_string(),
            container: "backups".to_string(),
            access_key: "dGVzdC1rZXk=".to_string(),
            endpoint: Some(azure.base_url()),
        },
    ))
    .await
    .unwrap();
    assert_eq!(sink.kind(), "azure");

    let mut engine = BackupEngine::new(source, sink, run_options()).with_clock(march_15);
    let err = engine.run().await.unwrap_err();

    assert!(matches!(err, BackupError::ConnectivityError { .. }));
    container.assert();
    search.assert_hits(0);
    upload.assert_hits(0);
}

#[tokio::test]
async fn test_grafana_to_azure_uploads_block_blob() {
    let grafana = MockServer::start();
    mock_grafana_health(&grafana);
    grafana.mock(|when, then| {
        when.method(GET).path("/api/search");
        then.status(200).json_body(serde_json::json!([
            {"id": 1, "uid": "ops", "title": "Ops", "uri": "db/ops", "url": "/d/ops/ops"}
        ]));
    });
    grafana.mock(|when, then| {
        when.method(GET).path("/api/dashboards/uid/ops");
        then.status(200).body(r#"{"dashboard":{"uid":"ops"}}"#);
    });

    let azure = MockServer::start();
    azure.mock(|when, then| {
        when.method(HEAD)
            .path("/backups")
            .query_param("restype", "container");
        then.status(200);
    });
    azure.mock(|when, then| {
        when.method(HEAD).path("/backups/nightly/2024/3/15/backup.tgz");
        then.status(404);
    });
    let upload = azure.mock(|when, then| {
        when.method(PUT)
            .path("/backups/nightly/2024/3/15/backup.tgz")
            .header("x-ms-blob-type", "BlockBlob")
            .header("if-none-match", "*")
            .header("content-type", "application/gzip");
        then.status(201);
    });

    let source = DataSource::from_settings(SourceSettings::Grafana(
        grafana_settings(&grafana),
    ));
    let sink = StorageBackend::from_settings(StorageSettings::Azure(
        AzureSettings {
            account: "devaccount".to_string(),
            container: "backups".to_string(),
            access_key: "dGVzdC1rZXk=".to_string(),
            endpoint: Some(azure.base_url()),
        },
    ))
    .await
    .unwrap();

    let mut engine = BackupEngine::new(source, sink, run_options()).with_clock(march_15);
    let report = engine.run().await.unwrap();

    upload.assert();
    assert_eq!(report.summary.archived, 1);
    assert!(report.bytes_written > 0);
}

#[test]
fn test_missing_grafana_token_is_a_configuration_error() {
    let env: HashMap<&str, String> =
        HashMap::from([("GRAFANA_URL", "http://localhost:3000".to_string())]);

    let err = Settings::resolve(
        DataSourceKind::Grafana,
        StorageKind::Local,
        OutputOverrides::default(),
        FileConfig::default(),
        |key: &str| env.get(key).cloned(),
    )
    .unwrap_err();

    assert_eq!(err.exit_code(), 2);
    assert!(err.to_string().contains("GRAFANA_TOKEN"));
}
