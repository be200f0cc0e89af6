//! Event subscribers used by the CLI.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use bb_core::{DistributionError, Event, Notifier};

/// Streams every event to stdout as one JSON object per line.
pub struct StdoutTransport;

impl Notifier for StdoutTransport {
    fn notify(&self, event: &Event) -> Result<(), DistributionError> {
        let line = serde_json::to_string(event)?;
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{}", line)?;
        stdout.flush()?;
        Ok(())
    }
}

/// Delivers each bundle as `<dir>/<bundleId>.json`.
///
/// Files are replaced atomically so a consumer never reads half a bundle.
pub struct DirectoryTransport {
    dir: PathBuf,
}

impl DirectoryTransport {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, String> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| format!("Failed to create '{}': {}", dir.display(), e))?;
        Ok(Self { dir })
    }

    pub fn bundle_path(&self, bundle_id: &str) -> Result<PathBuf, DistributionError> {
        let valid = !bundle_id.is_empty()
            && bundle_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_')
            && !bundle_id.starts_with('.');
        if !valid {
            return Err(DistributionError::Rejected(format!("invalid bundle id '{}'", bundle_id)));
        }
        Ok(self.dir.join(format!("{}.json", bundle_id)))
    }
}

impl Notifier for DirectoryTransport {
    fn notify(&self, event: &Event) -> Result<(), DistributionError> {
        let Event::BundleUpdateRequired { bundle_id, json } = event else {
            return Ok(());
        };

        let path = self.bundle_path(bundle_id)?;
        let bytes = serde_json::to_vec(json)?;
        write_atomic(&path, &bytes)?;
        log::debug!("Wrote {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn writes_bundles_and_ignores_other_events() {
        let dir = TempDir::new().unwrap();
        let transport = DirectoryTransport::new(dir.path().join("out")).unwrap();

        transport
            .notify(&Event::BundleUpdateRequired {
                bundle_id: "com.example.Blocker".to_string(),
                json: vec![json!({"action": {"type": "block"}})],
            })
            .unwrap();
        transport
            .notify(&Event::CycleComplete {
                rules_count: 1,
                rules_over_limit: false,
                advanced_rule_count: 0,
                filtering_disabled: false,
            })
            .unwrap();

        let written = fs::read_to_string(dir.path().join("out/com.example.Blocker.json")).unwrap();
        let parsed: Value = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed, json!([{"action": {"type": "block"}}]));

        let entries = fs::read_dir(dir.path().join("out")).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn rejects_bundle_ids_that_escape_the_directory() {
        let dir = TempDir::new().unwrap();
        let transport = DirectoryTransport::new(dir.path()).unwrap();

        for bad in ["../evil", "a/b", "", ".hidden"] {
            let result = transport.notify(&Event::BundleUpdateRequired {
                bundle_id: bad.to_string(),
                json: Vec::new(),
            });
            assert!(matches!(result, Err(DistributionError::Rejected(_))), "{bad}");
        }
    }
}
