//! Plugin directory provider: discovers tools on disk and runs them as
//! child processes.
//!
//! Layout:
//!
//! ```text
//! Plugin/
//!   SciCalculator/
//!     plugin-manifest.json   { "name": ..., "entryPoint": { "command": "python calc.py" }, ... }
//!     calc.py
//!   _disabled/               (skipped)
//! ```
//!
//! A call spawns the entry command inside the plugin directory, writes the
//! JSON arguments to stdin, closes it, and returns whatever the process
//! printed on stdout. A non-zero exit status is an invocation failure
//! carrying stderr.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::errors::CapabilityError;
use super::provider::CapabilityProvider;
use super::types::{CapabilityOutput, ToolManifest};

// ─── Constants ───────────────────────────────────────────────────────────────

/// File that marks a directory as a plugin.
pub const MANIFEST_FILE: &str = "plugin-manifest.json";

/// Longest stderr excerpt carried into an error message.
const MAX_STDERR_CHARS: usize = 2000;

// ─── Types ───────────────────────────────────────────────────────────────────

/// The part of a plugin manifest needed to run it.
#[derive(Debug, Clone, Deserialize)]
struct EntryPoint {
    command: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PluginManifestFile {
    entry_point: EntryPoint,
}

/// A discovered, runnable plugin.
#[derive(Debug, Clone)]
struct Plugin {
    manifest: ToolManifest,
    dir: PathBuf,
    program: String,
    args: Vec<String>,
}

// ─── Provider ────────────────────────────────────────────────────────────────

/// Capability provider backed by a directory of stdio plugins.
#[derive(Debug, Clone, Default)]
pub struct PluginDirectoryProvider {
    /// Sorted by tool name.
    plugins: Vec<Plugin>,
    index: HashMap<String, usize>,
}

impl PluginDirectoryProvider {
    /// Scan `plugin_dir` for plugins.
    ///
    /// Skips directories starting with `_` or `.`, and logs and skips any
    /// plugin whose manifest is unreadable, lacks a `name`, or has no usable
    /// `entryPoint.command`. A missing directory yields an empty provider.
    pub fn discover(plugin_dir: &Path) -> Self {
        let entries = match std::fs::read_dir(plugin_dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(
                    path = %plugin_dir.display(),
                    error = %e,
                    "plugin directory not found, no local tools available"
                );
                return Self::default();
            }
        };

        let mut plugins = Vec::new();

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }

            let Some(dir_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if dir_name.starts_with('_') || dir_name.starts_with('.') {
                continue;
            }

            let manifest_path = path.join(MANIFEST_FILE);
            if !manifest_path.is_file() {
                continue;
            }

            match load_plugin(&path, &manifest_path) {
                Ok(plugin) => {
                    tracing::debug!(
                        tool = %plugin.manifest.name,
                        dir = %path.display(),
                        "discovered plugin"
                    );
                    plugins.push(plugin);
                }
                Err(reason) => {
                    tracing::warn!(
                        manifest = %manifest_path.display(),
                        reason = %reason,
                        "skipping invalid plugin"
                    );
                }
            }
        }

        plugins.sort_by(|a, b| a.manifest.name.cmp(&b.manifest.name));
        plugins.dedup_by(|later, earlier| {
            let duplicate = later.manifest.name == earlier.manifest.name;
            if duplicate {
                tracing::warn!(
                    tool = %later.manifest.name,
                    dir = %later.dir.display(),
                    "duplicate plugin name, keeping the first"
                );
            }
            duplicate
        });

        let index = plugins
            .iter()
            .enumerate()
            .map(|(i, p)| (p.manifest.name.clone(), i))
            .collect();

        tracing::info!(
            path = %plugin_dir.display(),
            count = plugins.len(),
            "loaded local plugins"
        );

        Self { plugins, index }
    }

    /// Number of discovered plugins.
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    fn get(&self, name: &str) -> Option<&Plugin> {
        self.index.get(name).and_then(|&i| self.plugins.get(i))
    }
}

#[async_trait]
impl CapabilityProvider for PluginDirectoryProvider {
    fn list_manifests(&self) -> Vec<ToolManifest> {
        self.plugins.iter().map(|p| p.manifest.clone()).collect()
    }

    async fn invoke(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<CapabilityOutput, CapabilityError> {
        let plugin = self.get(name).ok_or(CapabilityError::UnknownTool {
            name: name.to_string(),
        })?;
        run_plugin(plugin, &arguments).await
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Parse one plugin manifest and resolve its entry command.
fn load_plugin(dir: &Path, manifest_path: &Path) -> Result<Plugin, String> {
    let raw = std::fs::read_to_string(manifest_path).map_err(|e| format!("read failed: {e}"))?;

    let value: Value = serde_json::from_str(&raw).map_err(|e| format!("invalid JSON: {e}"))?;
    let manifest: ToolManifest =
        serde_json::from_value(value.clone()).map_err(|e| format!("invalid manifest: {e}"))?;
    if manifest.name.trim().is_empty() {
        return Err("manifest name is empty".into());
    }

    let file: PluginManifestFile =
        serde_json::from_value(value).map_err(|e| format!("missing entryPoint.command: {e}"))?;
    let mut parts = shlex::split(&file.entry_point.command)
        .filter(|parts| !parts.is_empty())
        .ok_or_else(|| format!("unusable entry command '{}'", file.entry_point.command))?;
    let program = parts.remove(0);

    Ok(Plugin {
        manifest,
        dir: dir.to_path_buf(),
        program,
        args: parts,
    })
}

// ─── Invocation ──────────────────────────────────────────────────────────────

/// Spawn the plugin, feed it the arguments, and collect its output.
async fn run_plugin(plugin: &Plugin, arguments: &Value) -> Result<CapabilityOutput, CapabilityError> {
    let tool = plugin.manifest.name.as_str();

    let mut cmd = Command::new(&plugin.program);
    cmd.args(&plugin.args)
        .current_dir(&plugin.dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    // Windows: prevent console window from appearing for child processes
    #[cfg(target_os = "windows")]
    {
        const CREATE_NO_WINDOW: u32 = 0x08000000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }

    let mut child = cmd.spawn().map_err(|e| CapabilityError::SpawnFailed {
        tool: tool.to_string(),
        reason: e.to_string(),
    })?;

    let input = serde_json::to_vec(arguments).map_err(|e| CapabilityError::SpawnFailed {
        tool: tool.to_string(),
        reason: format!("failed to encode arguments: {e}"),
    })?;

    if let Some(mut stdin) = child.stdin.take() {
        // A plugin may exit without reading stdin; that is not a failure.
        if let Err(e) = stdin.write_all(&input).await {
            tracing::debug!(tool, error = %e, "plugin closed stdin early");
        }
        drop(stdin);
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| CapabilityError::failed(tool, format!("failed to wait for plugin: {e}")))?;

    if output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        return Ok(CapabilityOutput::Text(stdout));
    }

    let mut stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.chars().count() > MAX_STDERR_CHARS {
        stderr = stderr.chars().take(MAX_STDERR_CHARS).collect();
        stderr.push_str("...(truncated)");
    }
    tracing::debug!(tool, status = %output.status, "plugin exited with failure");

    Err(CapabilityError::failed(tool, stderr))
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write_plugin(root: &Path, dir: &str, manifest: Value) {
        let plugin_dir = root.join(dir);
        std::fs::create_dir_all(&plugin_dir).unwrap();
        std::fs::write(
            plugin_dir.join(MANIFEST_FILE),
            serde_json::to_string_pretty(&manifest).unwrap(),
        )
        .unwrap();
    }

    #[test]
    fn test_discover_sorted_by_name() {
        let tmp = TempDir::new().unwrap();
        write_plugin(
            tmp.path(),
            "zeta",
            json!({"name": "Zeta", "entryPoint": {"command": "zeta"}}),
        );
        write_plugin(
            tmp.path(),
            "alpha",
            json!({"name": "Alpha", "description": "first", "entryPoint": {"command": "alpha --fast"}}),
        );

        let provider = PluginDirectoryProvider::discover(tmp.path());
        let names: Vec<String> = provider
            .list_manifests()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["Alpha", "Zeta"]);

        let alpha = provider.get("Alpha").unwrap();
        assert_eq!(alpha.program, "alpha");
        assert_eq!(alpha.args, vec!["--fast"]);
        assert_eq!(provider.list_manifests()[0].metadata["description"], "first");
    }

    #[test]
    fn test_skip_hidden_underscore_and_invalid() {
        let tmp = TempDir::new().unwrap();
        write_plugin(
            tmp.path(),
            "_disabled",
            json!({"name": "Disabled", "entryPoint": {"command": "x"}}),
        );
        write_plugin(
            tmp.path(),
            ".hidden",
            json!({"name": "Hidden", "entryPoint": {"command": "x"}}),
        );
        write_plugin(tmp.path(), "no_entry", json!({"name": "NoEntry"}));
        write_plugin(
            tmp.path(),
            "blank_command",
            json!({"name": "Blank", "entryPoint": {"command": "   "}}),
        );
        write_plugin(
            tmp.path(),
            "nameless",
            json!({"entryPoint": {"command": "x"}}),
        );
        std::fs::create_dir(tmp.path().join("not_a_plugin")).unwrap();
        std::fs::write(tmp.path().join("README.md"), "# plugins").unwrap();

        let provider = PluginDirectoryProvider::discover(tmp.path());
        assert!(provider.is_empty());
    }

    #[test]
    fn test_duplicate_names_keep_one() {
        let tmp = TempDir::new().unwrap();
        write_plugin(tmp.path(), "a", json!({"name": "Dup", "entryPoint": {"command": "a"}}));
        write_plugin(tmp.path(), "b", json!({"name": "Dup", "entryPoint": {"command": "b"}}));

        let provider = PluginDirectoryProvider::discover(tmp.path());
        assert_eq!(provider.len(), 1);
        assert_eq!(provider.list_manifests().len(), 1);
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let provider = PluginDirectoryProvider::discover(Path::new("/nonexistent/plugins"));
        assert!(provider.is_empty());
        assert!(provider.list_manifests().is_empty());
    }

    #[tokio::test]
    async fn test_invoke_unknown_tool() {
        let provider = PluginDirectoryProvider::default();
        let err = provider.invoke("ghost", json!({})).await.unwrap_err();
        assert_eq!(
            err,
            CapabilityError::UnknownTool {
                name: "ghost".into()
            }
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_invoke_returns_stdout_text() {
        let tmp = TempDir::new().unwrap();
        write_plugin(tmp.path(), "echo", json!({"name": "Echo", "entryPoint": {"command": "cat"}}));

        let provider = PluginDirectoryProvider::discover(tmp.path());
        let output = provider
            .invoke("Echo", json!({"text": "hi"}))
            .await
            .unwrap();
        assert_eq!(output, CapabilityOutput::Text(r#"{"text":"hi"}"#.to_string()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_invoke_nonzero_exit_carries_stderr() {
        let tmp = TempDir::new().unwrap();
        write_plugin(
            tmp.path(),
            "broken",
            json!({"name": "Broken", "entryPoint": {"command": "sh -c 'echo boom >&2; exit 3'"}}),
        );

        let provider = PluginDirectoryProvider::discover(tmp.path());
        let err = provider.invoke("Broken", json!({})).await.unwrap_err();
        assert_eq!(err, CapabilityError::failed("Broken", "boom"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_invoke_runs_in_plugin_dir() {
        let tmp = TempDir::new().unwrap();
        write_plugin(tmp.path(), "where", json!({"name": "Where", "entryPoint": {"command": "pwd"}}));

        let provider = PluginDirectoryProvider::discover(tmp.path());
        let output = provider.invoke("Where", json!({})).await.unwrap();
        let CapabilityOutput::Text(dir) = output else {
            panic!("expected text output");
        };
        let expected = tmp.path().join("where").canonicalize().unwrap();
        assert_eq!(Path::new(&dir).canonicalize().unwrap(), expected);
    }

    #[tokio::test]
    async fn test_invoke_missing_program_is_spawn_failure() {
        let tmp = TempDir::new().unwrap();
        write_plugin(
            tmp.path(),
            "ghost",
            json!({"name": "Ghost", "entryPoint": {"command": "definitely-not-a-real-binary-7f3a"}}),
        );

        let provider = PluginDirectoryProvider::discover(tmp.path());
        let err = provider.invoke("Ghost", json!({})).await.unwrap_err();
        assert!(matches!(err, CapabilityError::SpawnFailed { .. }));
    }
}
