//! Sandboxed filesystem tools
//!
//! All file access goes through `Sandbox`, which canonicalizes the requested
//! path and compares it against the canonicalized sandbox root. String-prefix
//! checks on unresolved input are not enough: `..` segments and symlinks both
//! defeat them. Writes are further restricted to one writable subdirectory
//! and plain filenames only.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use genagenta_agent::{Caller, Tool, ToolResult};
use serde_json::json;
use tokio::fs;

const MAX_READ_BYTES: usize = 64 * 1024;
pub const WRITABLE_SUBDIR: &str = "workspace";
const LEARNINGS_FILE: &str = "learnings.md";
const PROPOSALS_FILE: &str = "proposals.md";

/// A directory the file tools may not escape.
pub struct Sandbox {
    root: PathBuf,
}

impl Sandbox {
    /// Canonicalizes the root and creates the writable subdirectory.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().canonicalize()?;
        std::fs::create_dir_all(root.join(WRITABLE_SUBDIR))?;
        Ok(Self { root })
    }

    /// Resolve a requested path and verify it stays inside the sandbox.
    ///
    /// The target must exist: canonicalization is what collapses `..` and
    /// symlinks, and it only works on real paths.
    fn resolve(&self, requested: &str) -> Result<PathBuf, String> {
        let candidate = if Path::new(requested).is_absolute() {
            PathBuf::from(requested)
        } else {
            self.root.join(requested)
        };
        let resolved = candidate
            .canonicalize()
            .map_err(|e| format!("Cannot access '{}': {}", requested, e))?;
        if !resolved.starts_with(&self.root) {
            return Err(format!("Access denied: '{}' is outside the sandbox", requested));
        }
        Ok(resolved)
    }

    /// Writable target for a plain filename. Separators and `..` are
    /// rejected outright, so no resolution step is needed.
    fn writable_target(&self, filename: &str) -> Result<PathBuf, String> {
        if filename.is_empty()
            || filename.contains('/')
            || filename.contains('\\')
            || filename.contains("..")
        {
            return Err(format!(
                "Access denied: '{}' is not a plain filename",
                filename
            ));
        }
        Ok(self.root.join(WRITABLE_SUBDIR).join(filename))
    }
}

pub struct ReadFileTool {
    sandbox: Arc<Sandbox>,
}

impl ReadFileTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a text file from the assistant's sandbox directory."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path relative to the sandbox root"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value, _caller: &Caller) -> ToolResult {
        let path_str = match arguments.get("path").and_then(|v| v.as_str()) {
            Some(p) => p,
            None => return ToolResult::error("Missing 'path' argument"),
        };
        let path = match self.sandbox.resolve(path_str) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e),
        };
        if !path.is_file() {
            return ToolResult::error(format!("'{}' is not a file", path_str));
        }
        match fs::read_to_string(&path).await {
            Ok(content) => {
                let clipped = content.len() > MAX_READ_BYTES;
                let body = if clipped {
                    let mut end = MAX_READ_BYTES;
                    while !content.is_char_boundary(end) {
                        end -= 1;
                    }
                    &content[..end]
                } else {
                    content.as_str()
                };
                ToolResult::ok(json!({"content": body, "clipped": clipped}))
            }
            Err(e) => ToolResult::error(format!("Failed to read file: {}", e)),
        }
    }
}

pub struct ListFilesTool {
    sandbox: Arc<Sandbox>,
}

impl ListFilesTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List files and directories inside the assistant's sandbox directory."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory to list, relative to the sandbox root. Defaults to the root."
                }
            }
        })
    }

    async fn execute(&self, arguments: serde_json::Value, _caller: &Caller) -> ToolResult {
        let path_str = arguments
            .get("path")
            .and_then(|v| v.as_str())
            .unwrap_or(".");
        let path = match self.sandbox.resolve(path_str) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e),
        };
        let mut read_dir = match fs::read_dir(&path).await {
            Ok(rd) => rd,
            Err(e) => return ToolResult::error(format!("Failed to list '{}': {}", path_str, e)),
        };
        let mut entries = Vec::new();
        while let Ok(Some(entry)) = read_dir.next_entry().await {
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            entries.push(json!({"name": name, "dir": is_dir}));
        }
        entries.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));
        ToolResult::ok(json!({"entries": entries}))
    }
}

pub struct WriteFileTool {
    sandbox: Arc<Sandbox>,
}

impl WriteFileTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write a text file into the assistant's workspace. Accepts a plain filename only."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "filename": {
                    "type": "string",
                    "description": "Plain filename, no directories"
                },
                "content": {"type": "string"}
            },
            "required": ["filename", "content"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value, _caller: &Caller) -> ToolResult {
        let filename = match arguments.get("filename").and_then(|v| v.as_str()) {
            Some(f) => f,
            None => return ToolResult::error("Missing 'filename' argument"),
        };
        let content = match arguments.get("content").and_then(|v| v.as_str()) {
            Some(c) => c,
            None => return ToolResult::error("Missing 'content' argument"),
        };
        let target = match self.sandbox.writable_target(filename) {
            Ok(t) => t,
            Err(e) => return ToolResult::error(e),
        };
        match fs::write(&target, content).await {
            Ok(()) => ToolResult::ok(json!({"written": filename, "bytes": content.len()})),
            Err(e) => ToolResult::error(format!("Failed to write file: {}", e)),
        }
    }
}

pub struct ExploreCodeTool {
    sandbox: Arc<Sandbox>,
}

impl ExploreCodeTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }

    fn walk(dir: &Path, depth: usize, out: &mut Vec<serde_json::Value>) {
        if depth > 3 || out.len() >= 200 {
            return;
        }
        let Ok(read_dir) = std::fs::read_dir(dir) else {
            return;
        };
        let mut entries: Vec<_> = read_dir.flatten().collect();
        entries.sort_by_key(|e| e.file_name());
        for entry in entries {
            if out.len() >= 200 {
                return;
            }
            let path = entry.path();
            let name = path.to_string_lossy().into_owned();
            if path.is_dir() {
                out.push(json!({"path": name, "dir": true}));
                Self::walk(&path, depth + 1, out);
            } else {
                let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                out.push(json!({"path": name, "dir": false, "bytes": size}));
            }
        }
    }
}

#[async_trait]
impl Tool for ExploreCodeTool {
    fn name(&self) -> &str {
        "explore_code"
    }

    fn description(&self) -> &str {
        "Walk the sandbox directory tree and return files with sizes. Use read_file to inspect one."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _arguments: serde_json::Value, _caller: &Caller) -> ToolResult {
        let mut out = Vec::new();
        Self::walk(&self.sandbox.root, 0, &mut out);
        ToolResult::ok(json!({"entries": out}))
    }
}

pub struct SaveLearningTool {
    sandbox: Arc<Sandbox>,
}

impl SaveLearningTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for SaveLearningTool {
    fn name(&self) -> &str {
        "save_learning"
    }

    fn description(&self) -> &str {
        "Append a note to the assistant's persistent learnings file."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "text": {"type": "string"}
            },
            "required": ["text"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value, caller: &Caller) -> ToolResult {
        let text = match arguments.get("text").and_then(|v| v.as_str()) {
            Some(t) if !t.trim().is_empty() => t,
            _ => return ToolResult::error("Missing 'text' argument"),
        };
        let path = self.sandbox.root.join(WRITABLE_SUBDIR).join(LEARNINGS_FILE);
        let existing = fs::read_to_string(&path).await.unwrap_or_default();
        let entry = format!(
            "{}## {} ({})\n{}\n",
            existing,
            Utc::now().format("%Y-%m-%d %H:%M UTC"),
            caller.display_name,
            text.trim()
        );
        match fs::write(&path, entry).await {
            Ok(()) => ToolResult::ok(json!({"saved": true})),
            Err(e) => ToolResult::error(format!("Failed to save learning: {}", e)),
        }
    }
}

pub struct ReadLearningsTool {
    sandbox: Arc<Sandbox>,
}

impl ReadLearningsTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for ReadLearningsTool {
    fn name(&self) -> &str {
        "read_learnings"
    }

    fn description(&self) -> &str {
        "Read the assistant's persistent learnings file."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _arguments: serde_json::Value, _caller: &Caller) -> ToolResult {
        let path = self.sandbox.root.join(WRITABLE_SUBDIR).join(LEARNINGS_FILE);
        let content = fs::read_to_string(&path).await.unwrap_or_default();
        ToolResult::ok(json!({"content": content, "empty": content.is_empty()}))
    }
}

/// Records a structured improvement proposal. The agent loop enforces the
/// once-per-request limit.
pub struct ProposeImprovementTool {
    sandbox: Arc<Sandbox>,
}

impl ProposeImprovementTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for ProposeImprovementTool {
    fn name(&self) -> &str {
        "propose_improvement"
    }

    fn description(&self) -> &str {
        "Record a proposal for improving the assistant or its tools. Allowed once per conversation turn."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "title": {"type": "string"},
                "description": {"type": "string"}
            },
            "required": ["title", "description"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value, caller: &Caller) -> ToolResult {
        let title = match arguments.get("title").and_then(|v| v.as_str()) {
            Some(t) => t,
            None => return ToolResult::error("Missing 'title' argument"),
        };
        let description = match arguments.get("description").and_then(|v| v.as_str()) {
            Some(d) => d,
            None => return ToolResult::error("Missing 'description' argument"),
        };
        let path = self.sandbox.root.join(WRITABLE_SUBDIR).join(PROPOSALS_FILE);
        let existing = fs::read_to_string(&path).await.unwrap_or_default();
        let entry = format!(
            "{}## {}\n*{} by {}*\n\n{}\n\n",
            existing,
            title.trim(),
            Utc::now().format("%Y-%m-%d"),
            caller.display_name,
            description.trim()
        );
        match fs::write(&path, entry).await {
            Ok(()) => ToolResult::ok(json!({"recorded": true, "title": title})),
            Err(e) => ToolResult::error(format!("Failed to record proposal: {}", e)),
        }
    }
}
