//! CLI command implementations

use crate::output::{print_output, DownloadOutcome};
use crate::progress::DownloadProgress;
use crate::OutputFormat;
use anyhow::{anyhow, bail, Context, Result};
use getr_core::{CompletionEvent, DownloadManager, DownloadRequest, HttpTransport, Settings};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub struct GetArgs {
    pub urls: Vec<String>,
    pub dir: Option<PathBuf>,
    pub name: Option<String>,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub timeout: Option<u64>,
}

// ============================================================================
// Argument Parsing
// ============================================================================

/// Parse `Name: value`
pub fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected `Name: value`, got `{}`", raw))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("header name missing in `{}`", raw));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

/// Parse `key=value`
pub fn parse_query(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected `key=value`, got `{}`", raw))?;
    if key.is_empty() {
        return Err(format!("query key missing in `{}`", raw));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Load settings from a JSON file, or fall back to defaults
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let Some(path) = path else {
        return Ok(Settings::default());
    };

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings from {}", path.display()))?;
    let settings = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid settings file {}", path.display()))?;
    debug!("Loaded settings from {}", path.display());
    Ok(settings)
}

/// `--timeout` takes precedence over the settings file
fn apply_timeout(mut settings: Settings, timeout: Option<u64>) -> Settings {
    if let Some(secs) = timeout {
        settings.transport_timeout_secs = Some(secs);
    }
    settings
}

fn build_request(url: &str, args: &GetArgs) -> DownloadRequest {
    let mut request = DownloadRequest::new(url);
    if let Some(dir) = &args.dir {
        request = request.directory(dir);
    }
    if let Some(name) = &args.name {
        request = request.file_name(name);
    }
    for (name, value) in &args.headers {
        request = request.header(name, value);
    }
    for (key, value) in &args.query {
        request = request.query_pair(key, value);
    }
    request
}

// ============================================================================
// Download Commands
// ============================================================================

pub async fn get(args: GetArgs, settings: Settings, format: OutputFormat) -> Result<()> {
    if args.name.is_some() && args.urls.len() > 1 {
        bail!("--name can only be used with a single URL");
    }

    let settings = apply_timeout(settings, args.timeout);
    let transport = Arc::new(HttpTransport::new()?);
    let manager = DownloadManager::builder(transport).settings(settings).build()?;
    let progress = DownloadProgress::new(format == OutputFormat::Human);

    let mut completions = Vec::with_capacity(args.urls.len());
    for url in &args.urls {
        let id = manager.create(&build_request(url, &args))?;
        let download = manager
            .get(id)
            .ok_or_else(|| anyhow!("Download {} vanished after creation", id))?;

        let bar = progress.add_download(&download);
        completions.push(manager.start_with_progress(id, move |event| bar.update(&event)));
    }

    // Ctrl-C cancels everything still running
    let ids: Vec<_> = completions.iter().map(|c| c.id()).collect();
    let interrupt = manager.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, canceling {} downloads", ids.len());
            for id in ids {
                interrupt.cancel(id);
            }
        }
    });

    let mut failed = 0;
    let total = completions.len();
    for completion in completions {
        let id = completion.id();
        let result = completion.await;
        let event = match &result {
            Ok(done) => CompletionEvent::from(done),
            Err(e) => {
                failed += 1;
                CompletionEvent::from(e)
            }
        };

        let url = manager.get(id).map(|d| d.url).unwrap_or_default();
        progress.finish(id, &event);
        print_output(&DownloadOutcome { id, url, event }, format)?;
    }

    if failed > 0 {
        bail!("{} of {} downloads failed", failed, total);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> GetArgs {
        GetArgs {
            urls: vec!["https://example.com/a.bin".to_string()],
            dir: Some(PathBuf::from("/tmp/out")),
            name: Some("b.bin".to_string()),
            headers: vec![("Accept".to_string(), "*/*".to_string())],
            query: vec![("token".to_string(), "abc".to_string())],
            timeout: None,
        }
    }

    #[test]
    fn test_parse_header() {
        assert_eq!(
            parse_header("Authorization: Bearer a:b"),
            Ok(("Authorization".to_string(), "Bearer a:b".to_string()))
        );
        assert!(parse_header("no-colon").is_err());
        assert!(parse_header(": value").is_err());
    }

    #[test]
    fn test_parse_query() {
        assert_eq!(
            parse_query("q=a=b"),
            Ok(("q".to_string(), "a=b".to_string()))
        );
        assert_eq!(parse_query("empty="), Ok(("empty".to_string(), String::new())));
        assert!(parse_query("novalue").is_err());
        assert!(parse_query("=x").is_err());
    }

    #[test]
    fn test_build_request() {
        let request = build_request("https://example.com/a.bin", &args());
        assert_eq!(request.path, Some(PathBuf::from("/tmp/out")));
        assert_eq!(request.file_name.as_deref(), Some("b.bin"));
        assert_eq!(request.headers["Accept"], "*/*");
        assert!(request.query.is_some());
    }

    #[test]
    fn test_timeout_flag_overrides_settings_file() {
        let from_file = Settings {
            transport_timeout_secs: Some(5),
            ..Settings::default()
        };
        assert_eq!(apply_timeout(from_file.clone(), Some(30)).transport_timeout_secs, Some(30));
        assert_eq!(apply_timeout(from_file, None).transport_timeout_secs, Some(5));
        assert_eq!(apply_timeout(Settings::default(), None).transport_timeout_secs, None);
    }

    #[test]
    fn test_load_settings_defaults_without_file() {
        let settings = load_settings(None).unwrap();
        assert_eq!(settings.throttle_window_ms, Settings::default().throttle_window_ms);
    }

    #[test]
    fn test_load_settings_from_file() {
        let path = std::env::temp_dir().join(format!("getr-settings-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"transport_timeout_secs": 5}"#).unwrap();

        let settings = load_settings(Some(&path)).unwrap();
        assert_eq!(settings.transport_timeout_secs, Some(5));

        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_name_requires_single_url() {
        let mut args = args();
        args.urls.push("https://example.com/c.bin".to_string());
        let result = get(args, Settings::default(), OutputFormat::Json).await;
        assert!(result.is_err());
    }
}
