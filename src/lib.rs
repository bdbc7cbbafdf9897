use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::Path;
use std::process::Command;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DepsResult {
    pub ok: bool,
    pub missing: Vec<String>,
}

/// Check required/optional CLI dependencies.
/// - Required: pdftotext (Poppler)
/// - Optional: languagetool (grammar suggestions)
/// Returns a DepsResult. `ok` is true iff required deps are present.
pub fn check_deps() -> DepsResult {
    let mut missing = Vec::new();

    // required
    let has_pdftotext = which::which("pdftotext").is_ok();
    if !has_pdftotext {
        missing.push("pdftotext".to_string());
    }

    // optional
    if which::which("languagetool").is_err() {
        missing.push("languagetool".to_string());
    }

    DepsResult { ok: has_pdftotext, missing }
}

/// Render apt installation help for missing deps.
pub fn install_help_for(missing: &[String]) -> String {
    let mut pkgs: Vec<&str> = Vec::new();
    if missing.iter().any(|m| m == "pdftotext") {
        pkgs.push("poppler-utils");
    }
    if missing.iter().any(|m| m == "languagetool") {
        pkgs.push("languagetool");
    }

    if pkgs.is_empty() {
        return String::new();
    }

    format!(
        "Dependency missing. Install via apt:\n  sudo apt install {}",
        pkgs.join(" ")
    )
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    pub id: String,
    pub inputs: ReviewInputs,
    #[serde(default)]
    pub checklist: Option<String>,
    #[serde(default)]
    pub rules: Option<String>,
    #[serde(default)]
    pub outputs: Option<ReviewOutputs>,
    #[serde(default)]
    pub compare: Option<CompareConfig>,
    #[serde(default)]
    pub grammar: Option<GrammarConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewInputs {
    pub baseline: String,
    pub draft: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewOutputs {
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareConfig {
    pub match_threshold: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrammarConfig {
    #[serde(default)]
    pub enabled: bool,
    pub lang: Option<String>,
    pub max_suggestions: Option<usize>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read review.yaml: {0}")]
    Read(String),
    #[error("Failed to parse review.yaml: {0}")]
    Parse(String),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Minimal validation for review.yaml.
pub fn validate_config(path: &Path) -> Result<ReviewConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read(e.to_string()))?;
    let cfg: ReviewConfig = serde_yaml::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))?;

    if cfg.id.trim().is_empty() {
        return Err(ConfigError::Invalid("missing id".into()));
    }
    if cfg.inputs.baseline.trim().is_empty() || cfg.inputs.draft.trim().is_empty() {
        return Err(ConfigError::Invalid("missing inputs.baseline or inputs.draft".into()));
    }

    Ok(cfg)
}

impl ReviewConfig {
    pub fn match_threshold(&self) -> f64 {
        self.compare
            .as_ref()
            .and_then(|c| c.match_threshold)
            .unwrap_or(0.8)
    }
    pub fn output_dir(&self) -> String {
        self.outputs
            .as_ref()
            .and_then(|o| o.dir.clone())
            .unwrap_or_else(|| "./output".to_string())
    }
    pub fn grammar_enabled(&self) -> bool {
        self.grammar.as_ref().map(|g| g.enabled).unwrap_or(false)
    }
    pub fn grammar_lang(&self) -> String {
        self.grammar
            .as_ref()
            .and_then(|g| g.lang.clone())
            .unwrap_or_else(|| "en-US".to_string())
    }
    pub fn max_suggestions(&self) -> usize {
        self.grammar
            .as_ref()
            .and_then(|g| g.max_suggestions)
            .unwrap_or(25)
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("FileNotFound: {0}")]
    FileNotFound(String),
    #[error("EncryptedPdf: {0}")]
    EncryptedPdf(String),
    #[error("ExtractError: {0}")]
    Other(String),
}

/// Narrow extraction capability so the comparison core never depends on the
/// concrete tool. Implementations may shell out; tests substitute stubs.
pub trait TextExtractor {
    fn extract(&self, source: &Path) -> Result<String, ExtractError>;
}

/// Extract text using Poppler's pdftotext. Plain-text sources (.txt, .md)
/// are read directly without invoking the tool.
#[derive(Debug, Clone)]
pub struct PopplerExtractor {
    pub layout: bool,
}

impl Default for PopplerExtractor {
    fn default() -> Self {
        Self { layout: true }
    }
}

impl TextExtractor for PopplerExtractor {
    fn extract(&self, source: &Path) -> Result<String, ExtractError> {
        if !source.exists() {
            return Err(ExtractError::FileNotFound(source.display().to_string()));
        }

        let is_pdf = source
            .extension()
            .map(|e| e.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false);
        if !is_pdf {
            return std::fs::read_to_string(source).map_err(|e| ExtractError::Other(e.to_string()));
        }

        let mut cmd = Command::new("pdftotext");
        if self.layout {
            cmd.arg("-layout");
        }
        cmd.arg("-nopgbrk");
        cmd.arg("-q");
        cmd.arg(source);
        cmd.arg("-"); // write to stdout

        let out = cmd.output().map_err(|e| ExtractError::Other(e.to_string()))?;
        if !out.status.success() {
            let err = String::from_utf8_lossy(&out.stderr).to_lowercase();
            if err.contains("encrypt") || err.contains("password") {
                return Err(ExtractError::EncryptedPdf(source.display().to_string()));
            }
            return Err(ExtractError::Other("pdftotext failed".into()));
        }
        Ok(String::from_utf8_lossy(&out.stdout).to_string())
    }
}

/// Bucket for lines that precede the first recognized heading.
pub const PREFACE_LABEL: &str = "Preface or Unnumbered Section";

// Heading: dot-separated numeric id, whitespace, non-empty title.
static HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+(?:\.\d+)*)[ \t]+(\S.*)$").unwrap());

/// Ordered label -> text mapping. Insertion order is document order; a
/// repeated label appends to its existing bucket instead of creating a new
/// one. Downstream consumers rely on the iteration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SectionMap {
    labels: Vec<String>,
    texts: HashMap<String, String>,
}

impl SectionMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn append(&mut self, label: &str, chunk: &str) {
        if !self.texts.contains_key(label) {
            self.labels.push(label.to_string());
        }
        self.texts.entry(label.to_string()).or_default().push_str(chunk);
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn text(&self, label: &str) -> Option<&str> {
        self.texts.get(label).map(|s| s.as_str())
    }

    pub fn contains(&self, label: &str) -> bool {
        self.texts.contains_key(label)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.labels.iter().map(move |l| {
            let text = self.texts.get(l).map(|s| s.as_str()).unwrap_or("");
            (l.as_str(), text)
        })
    }
}

/// Split raw text into labeled sections by heading line.
/// Every line (heading lines included) lands in the current bucket, so the
/// concatenation of all buckets in order reconstructs the input exactly.
pub fn split_sections(text: &str) -> SectionMap {
    let mut map = SectionMap::new();
    let mut current = PREFACE_LABEL.to_string();

    for chunk in text.split_inclusive('\n') {
        let line = chunk.strip_suffix('\n').unwrap_or(chunk);
        let line = line.strip_suffix('\r').unwrap_or(line);
        if let Some(cap) = HEADING_RE.captures(line) {
            let id = cap.get(1).map(|m| m.as_str()).unwrap_or("");
            let title = cap.get(2).map(|m| m.as_str()).unwrap_or("").trim_end();
            current = format!("{} {}", id, title);
        }
        map.append(&current, chunk);
    }

    if map.is_empty() {
        map.append(PREFACE_LABEL, "");
    }
    map
}

fn lcs_len<T: PartialEq>(a: &[T], b: &[T]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let mut prev = vec![0usize; short.len() + 1];
    let mut cur = vec![0usize; short.len() + 1];
    for i in 1..=long.len() {
        for j in 1..=short.len() {
            cur[j] = if long[i - 1] == short[j - 1] {
                prev[j - 1] + 1
            } else {
                prev[j].max(cur[j - 1])
            };
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[short.len()]
}

/// Normalized similarity ratio in [0.0, 1.0]: twice the number of matching
/// aligned in-order characters over the total length of both inputs.
/// Two empty texts compare as identical (1.0). Symmetric.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let total = a_chars.len() + b_chars.len();
    let matches = lcs_len(&a_chars, &b_chars);
    (2 * matches) as f64 / total as f64
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionMatch {
    pub baseline_label: String,
    /// None when no draft section scored above the threshold; the section is
    /// later diffed against empty draft text (all-removed).
    pub draft_label: Option<String>,
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MatchOutcome {
    pub pairs: Vec<SectionMatch>,
    /// Draft labels never claimed by any baseline label, in draft order.
    pub added: Vec<String>,
}

/// Align baseline sections to draft sections. Identical labels pair first;
/// otherwise the best-scoring unclaimed draft section strictly above
/// `threshold` is claimed (ties: first in draft order). Greedy, one pass in
/// baseline order; each draft label is claimed at most once.
pub fn match_sections(baseline: &SectionMap, draft: &SectionMap, threshold: f64) -> MatchOutcome {
    let mut claimed: HashSet<String> = HashSet::new();
    let mut pairs = Vec::new();

    for (b_label, b_text) in baseline.iter() {
        if let Some(d_text) = draft.text(b_label) {
            if !claimed.contains(b_label) {
                claimed.insert(b_label.to_string());
                pairs.push(SectionMatch {
                    baseline_label: b_label.to_string(),
                    draft_label: Some(b_label.to_string()),
                    score: similarity_ratio(b_text, d_text),
                });
                continue;
            }
        }

        let mut best: Option<(&str, f64)> = None;
        for (d_label, d_text) in draft.iter() {
            if claimed.contains(d_label) {
                continue;
            }
            let score = similarity_ratio(b_text, d_text);
            if score > threshold && best.map_or(true, |(_, s)| score > s) {
                best = Some((d_label, score));
            }
        }

        match best {
            Some((d_label, score)) => {
                claimed.insert(d_label.to_string());
                pairs.push(SectionMatch {
                    baseline_label: b_label.to_string(),
                    draft_label: Some(d_label.to_string()),
                    score,
                });
            }
            None => pairs.push(SectionMatch {
                baseline_label: b_label.to_string(),
                draft_label: None,
                score: 0.0,
            }),
        }
    }

    let added = draft
        .labels()
        .iter()
        .filter(|l| !claimed.contains(l.as_str()))
        .cloned()
        .collect();

    MatchOutcome { pairs, added }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Added,
    Removed,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Added => "Added",
            ChangeKind::Removed => "Removed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffLine {
    pub kind: ChangeKind,
    pub line: String,
}

/// Content-only line diff: full LCS alignment of the two sequences, keeping
/// only inserted and deleted lines. Unchanged context is discarded; removals
/// precede additions at each divergence point.
pub fn content_diff(base: &[&str], draft: &[&str]) -> Vec<DiffLine> {
    let n = base.len();
    let m = draft.len();

    // table[i][j] = LCS length of base[i..] and draft[j..]
    let mut table = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[i][j] = if base[i] == draft[j] {
                table[i + 1][j + 1] + 1
            } else {
                table[i + 1][j].max(table[i][j + 1])
            };
        }
    }

    let mut out = Vec::new();
    let (mut i, mut j) = (0usize, 0usize);
    while i < n && j < m {
        if base[i] == draft[j] {
            i += 1;
            j += 1;
        } else if table[i + 1][j] >= table[i][j + 1] {
            out.push(DiffLine { kind: ChangeKind::Removed, line: base[i].to_string() });
            i += 1;
        } else {
            out.push(DiffLine { kind: ChangeKind::Added, line: draft[j].to_string() });
            j += 1;
        }
    }
    while i < n {
        out.push(DiffLine { kind: ChangeKind::Removed, line: base[i].to_string() });
        i += 1;
    }
    while j < m {
        out.push(DiffLine { kind: ChangeKind::Added, line: draft[j].to_string() });
        j += 1;
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeRecord {
    pub chapter: String,
    pub kind: ChangeKind,
    pub content: String,
    pub similarity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionComparison {
    /// Draft-side identifier when the section exists in the draft, otherwise
    /// the baseline label.
    pub label: String,
    pub baseline_label: Option<String>,
    pub draft_label: Option<String>,
    /// Similarity of the full section texts, rounded to 2 decimals.
    pub similarity: f64,
    pub diff: Vec<DiffLine>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ComparisonReport {
    pub sections: Vec<SectionComparison>,
    pub records: Vec<ChangeRecord>,
    pub matched: usize,
    pub removed_sections: usize,
    pub added_sections: usize,
}

impl ComparisonReport {
    /// Ordered label -> rendered content-only diff, for per-section display.
    pub fn section_diffs(&self) -> Vec<(String, String)> {
        self.sections
            .iter()
            .map(|s| (s.label.clone(), render_diff(&s.diff)))
            .collect()
    }
}

/// Render diff lines with `-`/`+` markers, one per line.
pub fn render_diff(diff: &[DiffLine]) -> String {
    let mut out = String::new();
    for dl in diff {
        let marker = match dl.kind {
            ChangeKind::Added => '+',
            ChangeKind::Removed => '-',
        };
        out.push(marker);
        out.push(' ');
        out.push_str(&dl.line);
        out.push('\n');
    }
    out
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn push_section(
    report: &mut ComparisonReport,
    label: &str,
    baseline_label: Option<&str>,
    draft_label: Option<&str>,
    base_text: &str,
    draft_text: &str,
) {
    let base_lines: Vec<&str> = base_text.lines().collect();
    let draft_lines: Vec<&str> = draft_text.lines().collect();
    let diff = content_diff(&base_lines, &draft_lines);
    let similarity = round2(similarity_ratio(base_text, draft_text));

    for dl in &diff {
        report.records.push(ChangeRecord {
            chapter: label.to_string(),
            kind: dl.kind,
            content: dl.line.clone(),
            similarity,
        });
    }
    report.sections.push(SectionComparison {
        label: label.to_string(),
        baseline_label: baseline_label.map(|s| s.to_string()),
        draft_label: draft_label.map(|s| s.to_string()),
        similarity,
        diff,
    });
}

/// Compare two documents section by section: split both into labeled
/// sections, align them (renames included), diff each pair, and emit one
/// ChangeRecord per changed line. Matched and removed baseline sections come
/// first in baseline order, then draft-only sections in draft order.
pub fn compare_documents(baseline_text: &str, draft_text: &str, threshold: f64) -> ComparisonReport {
    let base_map = split_sections(baseline_text);
    let draft_map = split_sections(draft_text);
    let outcome = match_sections(&base_map, &draft_map, threshold);

    let mut report = ComparisonReport::default();

    for pair in &outcome.pairs {
        let b_text = base_map.text(&pair.baseline_label).unwrap_or("");
        match pair.draft_label.as_deref() {
            Some(d_label) => {
                let d_text = draft_map.text(d_label).unwrap_or("");
                push_section(
                    &mut report,
                    d_label,
                    Some(pair.baseline_label.as_str()),
                    Some(d_label),
                    b_text,
                    d_text,
                );
                report.matched += 1;
            }
            None => {
                // wholly removed: diff against empty draft text
                push_section(
                    &mut report,
                    &pair.baseline_label,
                    Some(pair.baseline_label.as_str()),
                    None,
                    b_text,
                    "",
                );
                report.removed_sections += 1;
            }
        }
    }

    for d_label in &outcome.added {
        let d_text = draft_map.text(d_label).unwrap_or("");
        push_section(&mut report, d_label, None, Some(d_label.as_str()), "", d_text);
        report.added_sections += 1;
    }

    report
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChecklistResult {
    pub item: String,
    pub passed: bool,
}

/// Validate draft text against checklist items, in order.
/// - `no use of the word X` passes iff X is absent (case-insensitive).
/// - An item with a double-quoted phrase passes iff the phrase is present.
/// - Any other item passes iff the whole item text is present.
pub fn validate_checklist(text: &str, items: &[String]) -> Vec<ChecklistResult> {
    let haystack = text.to_lowercase();
    let mut results = Vec::new();

    for item in items {
        if item.trim().is_empty() {
            continue;
        }
        let item_lower = item.to_lowercase();
        let passed = if item_lower.contains("no use of the word") {
            let word = item_lower
                .split("no use of the word")
                .nth(1)
                .unwrap_or("")
                .trim()
                .trim_matches('"')
                .to_string();
            word.is_empty() || !haystack.contains(&word)
        } else if let Some(phrase) = item.split('"').nth(1) {
            haystack.contains(&phrase.to_lowercase())
        } else {
            haystack.contains(item_lower.trim())
        };
        results.push(ChecklistResult { item: item.clone(), passed });
    }

    results
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleFinding {
    pub rule: String,
    pub message: String,
}

static PASSIVE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:is|are|was|were|be|been|being)\s+\w+(?:ed|en)\b").unwrap());
static MAX_SENTENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^max sentence length\s+(\d+)$").unwrap());
static AVOID_PHRASE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)^avoid(?:\s+the)?\s+phrase\s+"([^"]+)"$"#).unwrap());

fn sentences(text: &str) -> Vec<&str> {
    text.split(|c| matches!(c, '.' | '!' | '?'))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect()
}

fn snippet(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let cut: String = s.chars().take(max).collect();
    format!("{}...", cut)
}

/// Apply simplistic style-rule heuristics to the draft text. Recognized rule
/// lines: `passive voice`, `max sentence length N`, `no use of the word X`,
/// `avoid phrase "X"`. A line matching none of these yields a single
/// `unrecognized rule` finding; it never aborts the run.
pub fn check_custom_rules(text: &str, rules: &[String]) -> Vec<RuleFinding> {
    let haystack = text.to_lowercase();
    let mut findings = Vec::new();

    for rule in rules {
        let trimmed = rule.trim();
        if trimmed.is_empty() {
            continue;
        }
        let rule_lower = trimmed.to_lowercase();

        if rule_lower.contains("passive voice") {
            for sentence in sentences(text) {
                if PASSIVE_RE.is_match(sentence) {
                    findings.push(RuleFinding {
                        rule: trimmed.to_string(),
                        message: format!("possible passive voice: \"{}\"", snippet(sentence, 80)),
                    });
                }
            }
        } else if let Some(cap) = MAX_SENTENCE_RE.captures(trimmed) {
            let limit: usize = cap
                .get(1)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(usize::MAX);
            for sentence in sentences(text) {
                let words = sentence.split_whitespace().count();
                if words > limit {
                    findings.push(RuleFinding {
                        rule: trimmed.to_string(),
                        message: format!(
                            "sentence has {} words (limit {}): \"{}\"",
                            words,
                            limit,
                            snippet(sentence, 80)
                        ),
                    });
                }
            }
        } else if rule_lower.contains("no use of the word") {
            let word = rule_lower
                .split("no use of the word")
                .nth(1)
                .unwrap_or("")
                .trim()
                .trim_matches('"')
                .to_string();
            if !word.is_empty() {
                let count = haystack.matches(&word).count();
                if count > 0 {
                    findings.push(RuleFinding {
                        rule: trimmed.to_string(),
                        message: format!("forbidden word \"{}\" appears {} time(s)", word, count),
                    });
                }
            }
        } else if let Some(cap) = AVOID_PHRASE_RE.captures(trimmed) {
            let phrase = cap.get(1).map(|m| m.as_str()).unwrap_or("").to_lowercase();
            if !phrase.is_empty() {
                let count = haystack.matches(&phrase).count();
                if count > 0 {
                    findings.push(RuleFinding {
                        rule: trimmed.to_string(),
                        message: format!("forbidden phrase \"{}\" appears {} time(s)", phrase, count),
                    });
                }
            }
        } else {
            findings.push(RuleFinding {
                rule: trimmed.to_string(),
                message: "unrecognized rule".to_string(),
            });
        }
    }

    findings
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrammarSuggestion {
    pub message: String,
    pub context: String,
    pub replacements: Vec<String>,
}

#[derive(Debug, Error)]
pub enum GrammarError {
    #[error("ToolMissing: {0}")]
    ToolMissing(String),
    #[error("GrammarToolFailed: {0}")]
    Failed(String),
    #[error("GrammarOutputParse: {0}")]
    Parse(String),
}

/// Narrow grammar-check capability; the reporting layer only sees suggestion
/// records, never the concrete tool.
pub trait GrammarChecker {
    fn check(&self, text: &str) -> Result<Vec<GrammarSuggestion>, GrammarError>;
}

/// Grammar suggestions via the LanguageTool CLI (`languagetool --json`).
#[derive(Debug, Clone)]
pub struct LanguageToolChecker {
    pub lang: String,
}

impl LanguageToolChecker {
    pub fn new(lang: impl Into<String>) -> Self {
        Self { lang: lang.into() }
    }
}

impl GrammarChecker for LanguageToolChecker {
    fn check(&self, text: &str) -> Result<Vec<GrammarSuggestion>, GrammarError> {
        if which::which("languagetool").is_err() {
            return Err(GrammarError::ToolMissing("languagetool".into()));
        }

        let mut tmp =
            tempfile::NamedTempFile::new().map_err(|e| GrammarError::Failed(e.to_string()))?;
        tmp.write_all(text.as_bytes())
            .map_err(|e| GrammarError::Failed(e.to_string()))?;

        let out = Command::new("languagetool")
            .arg("--json")
            .arg("-l")
            .arg(&self.lang)
            .arg(tmp.path())
            .output()
            .map_err(|e| GrammarError::Failed(e.to_string()))?;
        if !out.status.success() {
            return Err(GrammarError::Failed(format!(
                "languagetool exit {}",
                out.status.code().unwrap_or(-1)
            )));
        }

        parse_languagetool_json(&String::from_utf8_lossy(&out.stdout))
    }
}

#[derive(Debug, Deserialize)]
struct LtResponse {
    #[serde(default)]
    matches: Vec<LtMatch>,
}

#[derive(Debug, Deserialize)]
struct LtMatch {
    message: String,
    #[serde(default)]
    replacements: Vec<LtReplacement>,
    context: Option<LtContext>,
}

#[derive(Debug, Deserialize)]
struct LtContext {
    text: String,
}

#[derive(Debug, Deserialize)]
struct LtReplacement {
    value: String,
}

/// Parse LanguageTool `--json` output into suggestion records. The CLI
/// prints informational lines before the payload, so scan for the first `{`.
pub fn parse_languagetool_json(raw: &str) -> Result<Vec<GrammarSuggestion>, GrammarError> {
    let start = raw
        .find('{')
        .ok_or_else(|| GrammarError::Parse("no JSON object in output".into()))?;
    let resp: LtResponse =
        serde_json::from_str(&raw[start..]).map_err(|e| GrammarError::Parse(e.to_string()))?;

    Ok(resp
        .matches
        .into_iter()
        .map(|m| GrammarSuggestion {
            message: m.message,
            context: m.context.map(|c| c.text).unwrap_or_default(),
            replacements: m.replacements.into_iter().map(|r| r.value).collect(),
        })
        .collect())
}

fn csv_field(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Tabular change summary: header plus one row per ChangeRecord.
pub fn summary_csv(records: &[ChangeRecord]) -> String {
    let mut out = String::from("Chapter,Type,Content,Similarity\n");
    for r in records {
        out.push_str(&format!(
            "{},{},{},{:.2}\n",
            csv_field(&r.chapter),
            r.kind.as_str(),
            csv_field(&r.content),
            r.similarity
        ));
    }
    out
}

/// Human-readable review report: per-section diffs, checklist results, style
/// findings, and the grammar suggestions truncated to `max_suggestions`.
pub fn render_report_markdown(
    report: &ComparisonReport,
    checklist: &[ChecklistResult],
    findings: &[RuleFinding],
    suggestions: &[GrammarSuggestion],
    max_suggestions: usize,
) -> String {
    let mut out = String::from("# Review report\n\n## Sections\n");

    for section in &report.sections {
        out.push_str(&format!(
            "\n### {} (similarity {:.2})\n",
            section.label, section.similarity
        ));
        if section.diff.is_empty() {
            out.push_str("(no content changes)\n");
        } else {
            out.push_str("```diff\n");
            out.push_str(&render_diff(&section.diff));
            out.push_str("```\n");
        }
    }

    if !checklist.is_empty() {
        out.push_str("\n## Checklist\n");
        for result in checklist {
            let mark = if result.passed { "x" } else { " " };
            out.push_str(&format!("- [{}] {}\n", mark, result.item));
        }
    }

    if !findings.is_empty() {
        out.push_str("\n## Style findings\n");
        for finding in findings {
            out.push_str(&format!("- {}: {}\n", finding.rule, finding.message));
        }
    }

    if !suggestions.is_empty() {
        out.push_str("\n## Grammar suggestions\n");
        for suggestion in suggestions.iter().take(max_suggestions) {
            out.push_str(&format!("- {}", suggestion.message));
            if !suggestion.context.is_empty() {
                out.push_str(&format!(" ({})", suggestion.context));
            }
            if !suggestion.replacements.is_empty() {
                out.push_str(&format!(" -> {}", suggestion.replacements.join(", ")));
            }
            out.push('\n');
        }
        if suggestions.len() > max_suggestions {
            out.push_str(&format!(
                "\n({} more suggestions not shown)\n",
                suggestions.len() - max_suggestions
            ));
        }
    }

    out
}

#[derive(Debug, Error)]
pub enum EmitError {
    #[error("WriteFailed: {0}")]
    WriteFailed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmitPaths {
    pub report_path: String,
    pub summary_path: String,
    pub meta_path: String,
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), EmitError> {
    let pid = std::process::id();
    let tmp = path.with_extension(format!("tmp.{}", pid));
    std::fs::write(&tmp, bytes).map_err(|e| EmitError::WriteFailed(e.to_string()))?;
    std::fs::rename(&tmp, path).map_err(|e| EmitError::WriteFailed(e.to_string()))?;
    Ok(())
}

/// Atomically write the markdown report, CSV summary, and meta JSON into
/// outdir with the doc_id stem.
pub fn emit_report(
    report_md: &str,
    summary: &str,
    meta: &serde_json::Value,
    outdir: &str,
    doc_id: &str,
) -> Result<EmitPaths, EmitError> {
    std::fs::create_dir_all(outdir).map_err(|e| EmitError::WriteFailed(e.to_string()))?;
    let report_path = Path::new(outdir).join(format!("{}.diff.md", doc_id));
    let summary_path = Path::new(outdir).join(format!("{}.summary.csv", doc_id));
    let meta_path = Path::new(outdir).join(format!("{}.meta.json", doc_id));

    write_atomic(&report_path, report_md.as_bytes())?;
    write_atomic(&summary_path, summary.as_bytes())?;
    let meta_bytes =
        serde_json::to_vec_pretty(meta).map_err(|e| EmitError::WriteFailed(e.to_string()))?;
    write_atomic(&meta_path, &meta_bytes)?;

    Ok(EmitPaths {
        report_path: report_path.to_string_lossy().to_string(),
        summary_path: summary_path.to_string_lossy().to_string(),
        meta_path: meta_path.to_string_lossy().to_string(),
    })
}

// Utility to compute sha256 hex
pub fn sha256_hex(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let out = hasher.finalize();
    out.iter().map(|b| format!("{:02x}", b)).collect()
}
