//! Configuration file loading.

use std::io::Write;

use vantage::ServerConfig;

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_load_typical_file() {
    let file = write_config(
        "# server config\n\
         PORT=9090\n\
         DOC_ROOT=/srv/www\n\
         THREAD_COUNT=8\n\
         AUTH_TOKEN=abc123\n\
         MAX_UPLOAD_SIZE=1048576\n\
         \n\
         # streaming\n\
         FPS_LIMIT=30\n",
    );
    let config = ServerConfig::load(file.path()).unwrap();
    assert_eq!(config.port(), 9090);
    assert_eq!(config.doc_root(), std::path::PathBuf::from("/srv/www"));
    assert_eq!(config.thread_count(), 8);
    assert_eq!(config.auth_token(), "abc123");
    assert_eq!(config.max_upload_size(), 1_048_576);
    assert_eq!(config.fps_limit(), 30);
}

#[test]
fn test_unknown_keys_survive_and_are_ignored() {
    let file = write_config("PORT=81\nFUTURE_FEATURE=enabled\n");
    let config = ServerConfig::load(file.path()).unwrap();
    assert_eq!(config.get("FUTURE_FEATURE"), Some("enabled"));
    assert_eq!(config.port(), 81);
}

#[test]
fn test_keys_are_case_sensitive() {
    let file = write_config("port=9999\n");
    let config = ServerConfig::load(file.path()).unwrap();
    // Lowercase `port` is a different (unknown) key.
    assert_eq!(config.port(), 8080);
    assert_eq!(config.get("port"), Some("9999"));
}

#[test]
fn test_malformed_values_fall_back_to_defaults() {
    let file = write_config("PORT=not-a-number\nTHREAD_COUNT=-3\nFPS_LIMIT=0\n");
    let config = ServerConfig::load(file.path()).unwrap();
    assert_eq!(config.port(), 8080);
    assert!(config.thread_count() > 0);
    assert!(config.fps_limit() > 0);
}

#[test]
fn test_missing_file_is_an_error() {
    assert!(ServerConfig::load("/no/such/config.conf").is_err());
}

#[test]
fn test_values_with_equals_in_them() {
    let file = write_config("AUTH_TOKEN=a=b=c\n");
    let config = ServerConfig::load(file.path()).unwrap();
    assert_eq!(config.auth_token(), "a=b=c");
}
