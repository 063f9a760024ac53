use serde::{Deserialize, Serialize};

pub type SymbolId = String;
pub type FileId = String;
pub type RepoId = String;

/// Wire prefix length for AST fingerprints on slice cards.
pub const AST_FINGERPRINT_WIRE_LEN: usize = 16;
/// Wire prefix length for AST fingerprints in the compact-v2 payload.
pub const AST_FINGERPRINT_COMPACT_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Interface,
    Type,
    Constructor,
    Module,
    Variable,
}

impl SymbolKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Method => "method",
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Type => "type",
            Self::Constructor => "constructor",
            Self::Module => "module",
            Self::Variable => "variable",
        }
    }
}

impl std::str::FromStr for SymbolKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "function" => Ok(Self::Function),
            "method" => Ok(Self::Method),
            "class" => Ok(Self::Class),
            "interface" => Ok(Self::Interface),
            "type" => Ok(Self::Type),
            "constructor" => Ok(Self::Constructor),
            "module" => Ok(Self::Module),
            "variable" => Ok(Self::Variable),
            other => Err(format!("invalid symbol kind '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Private,
    Protected,
}

impl Visibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
            Self::Protected => "protected",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    Call,
    Import,
    Config,
}

impl EdgeType {
    pub const ALL: [Self; 3] = [Self::Import, Self::Call, Self::Config];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::Import => "import",
            Self::Config => "config",
        }
    }
}

impl std::str::FromStr for EdgeType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "call" => Ok(Self::Call),
            "import" => Ok(Self::Import),
            "config" => Ok(Self::Config),
            other => Err(format!("invalid edge type '{other}'")),
        }
    }
}

/// Card detail levels, totally ordered by rank.
///
/// `Compact` is a wire-compatibility alias: it carries the same payload as
/// `Deps` but is tagged `compact` on the wire.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum DetailLevel {
    Minimal,
    Signature,
    Deps,
    #[default]
    Compact,
    Full,
}

impl DetailLevel {
    pub fn rank(self) -> u8 {
        match self {
            Self::Minimal => 0,
            Self::Signature => 1,
            Self::Deps => 2,
            Self::Compact => 3,
            Self::Full => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Signature => "signature",
            Self::Deps => "deps",
            Self::Compact => "compact",
            Self::Full => "full",
        }
    }

    /// The level whose field set actually drives projection: `Compact`
    /// projects the `Deps` payload.
    pub fn payload_level(self) -> Self {
        match self {
            Self::Compact => Self::Deps,
            other => other,
        }
    }
}

impl std::str::FromStr for DetailLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "minimal" => Ok(Self::Minimal),
            "signature" => Ok(Self::Signature),
            "deps" => Ok(Self::Deps),
            "compact" => Ok(Self::Compact),
            "full" => Ok(Self::Full),
            other => Err(format!(
                "invalid detail level '{other}', expected one of: minimal, signature, deps, compact, full"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SourceRange {
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

impl SourceRange {
    pub fn contains_line(&self, line: u32) -> bool {
        line >= self.start_line && line <= self.end_line
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SignatureInfo {
    #[serde(default)]
    pub params: Vec<ParamInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    #[serde(default)]
    pub generics: Vec<String>,
}

impl SignatureInfo {
    /// Rough character length used by token estimation.
    pub fn approx_len(&self) -> usize {
        let params: usize = self
            .params
            .iter()
            .map(|p| p.name.len() + p.type_name.as_deref().map_or(0, str::len) + 2)
            .sum();
        params
            + self.return_type.as_deref().map_or(0, str::len)
            + self.generics.iter().map(|g| g.len() + 1).sum::<usize>()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub symbol_id: SymbolId,
    pub file_id: FileId,
    pub repo_id: RepoId,
    pub kind: SymbolKind,
    pub name: String,
    pub exported: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
    pub range: SourceRange,
    pub ast_fingerprint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<SignatureInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub invariants: Vec<String>,
    #[serde(default)]
    pub side_effects: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub from_symbol_id: SymbolId,
    pub to_symbol_id: SymbolId,
    pub edge_type: EdgeType,
    pub weight: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SymbolMetrics {
    pub fan_in: u32,
    pub fan_out: u32,
    pub churn_30d: u32,
    #[serde(default)]
    pub test_refs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub file_id: FileId,
    pub repo_id: RepoId,
    pub rel_path: String,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub repo_id: RepoId,
    pub version_id: String,
    pub indexed_at: i64,
}

pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// Truncate a fingerprint to a wire prefix. Full fingerprints never leave
/// internal records.
pub fn truncate_fingerprint(fingerprint: &str, len: usize) -> String {
    if fingerprint.len() <= len {
        fingerprint.to_owned()
    } else {
        fingerprint[..len].to_owned()
    }
}

pub fn blake3_hex(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}
