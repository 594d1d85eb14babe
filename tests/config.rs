//! Loading configuration files from disk.

use std::io::Write;

use slotcatcher::config::{AppConfig, CONFIG_ENV};
use slotcatcher::scheduler::ScheduleEntry;

const SAMPLE: &str = r#"
[identity]
full_name = "Ada Lovelace"
email = "ada@example.org"
member_id = "555012"

[target]
category = "Sala Lettura - Rettorato"

[browser]
headless = true

[schedule]
timezone = "Europe/Rome"
times = ["00:00", "08:00", "13:30"]

[diagnostics]
dir = "/tmp/slotcatcher-shots"
"#;

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_and_validate_file() {
    let file = write_config(SAMPLE);
    let cfg = AppConfig::load(file.path()).unwrap();
    cfg.validate().unwrap();

    assert!(cfg.browser.headless);
    assert_eq!(cfg.browser.webdriver_url, "http://localhost:9515");
    assert_eq!(cfg.target.category_fallbacks[0].value, "330");
    assert_eq!(
        cfg.schedule.entries().unwrap(),
        vec![
            ScheduleEntry::new(0, 0).unwrap(),
            ScheduleEntry::new(8, 0).unwrap(),
            ScheduleEntry::new(13, 30).unwrap(),
        ]
    );
    assert_eq!(cfg.diagnostics.dir.to_str(), Some("/tmp/slotcatcher-shots"));
}

#[test]
fn test_explicit_missing_path_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.toml");
    let err = AppConfig::resolve(Some(&missing)).unwrap_err();
    assert!(format!("{err:#}").contains("nope.toml"));
}

#[test]
fn test_malformed_file_reports_path() {
    let file = write_config("[identity\nfull_name = ");
    let err = AppConfig::load(file.path()).unwrap_err();
    assert!(err.to_string().contains("failed to parse config file"));
}

#[test]
fn test_environment_variable_is_consulted() {
    let file = write_config(SAMPLE);
    std::env::set_var(CONFIG_ENV, file.path());
    let cfg = AppConfig::resolve(None);
    std::env::remove_var(CONFIG_ENV);

    assert_eq!(cfg.unwrap().identity.member_id, "555012");
}

#[test]
fn test_incomplete_identity_fails_validation() {
    let file = write_config("[identity]\nfull_name = \"Ada\"\n");
    let cfg = AppConfig::load(file.path()).unwrap();
    let err = cfg.validate().unwrap_err().to_string();
    assert!(err.contains("identity.email"), "{err}");
}
