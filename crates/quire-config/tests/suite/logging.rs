use quire_config::{init_tracing, LoggingConfig};

#[test]
fn init_tracing_writes_json_lines_to_the_log_file() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("logs").join("quire.log");
    let config = LoggingConfig {
        level: "quire.config=debug".into(),
        json: true,
        stderr: false,
        file: Some(path.clone()),
    };
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();

    assert!(init_tracing(&config));
    tracing::debug!(target: "quire.config", marker = 7, "written to the log file");

    let contents = std::fs::read_to_string(&path).unwrap();
    let line = contents
        .lines()
        .find(|line| line.contains("written to the log file"))
        .unwrap_or_else(|| panic!("missing event in {contents:?}"));
    assert!(line.starts_with('{'), "{line}");
    assert!(line.contains("\"level\":\"DEBUG\""), "{line}");
    assert!(line.contains("\"marker\":7"), "{line}");

    // Later calls keep the first subscriber.
    assert!(!init_tracing(&LoggingConfig::default()));
}
