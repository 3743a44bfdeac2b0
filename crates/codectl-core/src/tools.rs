//! Records exchanged with the npm-distributed CLI tool manager. Detection and
//! installation live outside the workspace controller; only the result shapes
//! and version helpers are shared.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolId {
    Codex,
    Claude,
    Gemini,
}

#[derive(Debug, Clone, Copy)]
pub struct ToolInfo {
    pub id: ToolId,
    pub display_name: &'static str,
    pub package: &'static str,
    pub binaries: &'static [&'static str],
}

pub const TOOLS: [ToolInfo; 3] = [
    ToolInfo {
        id: ToolId::Codex,
        display_name: "Codex (@openai/codex)",
        package: "@openai/codex",
        binaries: &["codex", "openai-codex"],
    },
    ToolInfo {
        id: ToolId::Claude,
        display_name: "Claude Code (@anthropic-ai/claude-code)",
        package: "@anthropic-ai/claude-code",
        binaries: &["claude", "claude-code"],
    },
    ToolInfo {
        id: ToolId::Gemini,
        display_name: "Gemini CLI (@google/gemini-cli)",
        package: "@google/gemini-cli",
        binaries: &["gemini"],
    },
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCheck {
    pub installed: bool,
    #[serde(default)]
    pub version: String,
    /// Which probe produced the version (binary invocation or npm listing).
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub latest: String,
    #[serde(default)]
    pub error: Option<String>,
}

impl ToolCheck {
    pub fn needs_upgrade(&self) -> bool {
        self.installed && version_less(&self.version, &self.latest)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeOutcome {
    pub tool: ToolId,
    pub from: String,
    pub to: String,
    pub ok: bool,
    #[serde(default)]
    pub message: String,
}

/// Boundary to the package-manager side of the dashboard.
pub trait ToolProbe {
    fn check(&self, tool: &ToolInfo) -> ToolCheck;
    fn upgrade(&self, tool: &ToolInfo) -> UpgradeOutcome;
}

pub fn tool_info(id: ToolId) -> &'static ToolInfo {
    TOOLS
        .iter()
        .find(|info| info.id == id)
        .unwrap_or(&TOOLS[0])
}

/// Extracts the first `x.y.z` version from command output, preferring the
/// first line.
pub fn parse_version(output: &str) -> String {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let first = trimmed.lines().next().unwrap_or("");
    for candidate in [first, trimmed] {
        if let Some(caps) = version_regex().captures(candidate) {
            return caps[1].to_string();
        }
    }
    String::new()
}

/// Best-effort semantic version comparison; a pre-release sorts below the
/// matching release. Unknown versions never compare as older.
pub fn version_less(a: &str, b: &str) -> bool {
    let a = normalize_version(a);
    let b = normalize_version(b);
    if a.is_empty() || b.is_empty() {
        return false;
    }
    let a_parts = numeric_parts(a);
    let b_parts = numeric_parts(b);
    if a_parts != b_parts {
        return a_parts < b_parts;
    }
    a.contains('-') && !b.contains('-')
}

pub fn normalize_version(version: &str) -> &str {
    let trimmed = version.trim();
    trimmed.strip_prefix('v').unwrap_or(trimmed)
}

fn numeric_parts(version: &str) -> [u64; 3] {
    let release = version.split('-').next().unwrap_or("");
    let mut parts = [0u64; 3];
    for (slot, piece) in parts.iter_mut().zip(release.split('.')) {
        let digits: String = piece.chars().take_while(|ch| ch.is_ascii_digit()).collect();
        *slot = digits.parse().unwrap_or(0);
    }
    parts
}

fn version_regex() -> &'static Regex {
    static VERSION_RE: OnceLock<Regex> = OnceLock::new();
    VERSION_RE.get_or_init(|| {
        Regex::new(r"(?i)\bv?(\d+\.\d+\.\d+(?:[\w.-]+)?)\b").expect("valid version regex")
    })
}
