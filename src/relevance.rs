// src/relevance.rs
//! Relevance gate: keyword corpus, false-positive overrides, per-source
//! thresholds, and scoring.
//!
//! Score = number of distinct keywords found in `title + " " + summary`,
//! plus 1 if at least one keyword appears in the title. Any false-positive
//! phrase in the same text rejects the entry before scoring.

use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

use crate::ingest::types::FeedEntry;

// --- env defaults & names ---
pub const DEFAULT_RELEVANCE_CONFIG_PATH: &str = "config/relevance.toml";
pub const DEFAULT_THRESHOLD: u32 = 3;

pub const ENV_RELEVANCE_CONFIG_PATH: &str = "RELEVANCE_CONFIG_PATH";
pub const ENV_DEFAULT_THRESHOLD: &str = "RELEVANCE_DEFAULT_THRESHOLD";

/// Shipped corpus, used when no config file is present on disk.
const BUILTIN_RELEVANCE_TOML: &str = include_str!("../config/relevance.toml");

pub(crate) fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

pub(crate) fn truncate_vec<T: ToString>(v: &[T], max: usize) -> Vec<String> {
    v.iter().take(max).map(|x| x.to_string()).collect()
}

fn parse_threshold_env(raw: Option<String>) -> Option<u32> {
    raw.and_then(|s| s.trim().parse::<u32>().ok())
}

/// Outcome of scoring one entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Relevance {
    pub score: u32,
    pub body_hits: u32,
    pub title_bonus: u32,
    pub threshold: u32,
    /// Distinct keywords found in the blob, in corpus order.
    pub matched: Vec<String>,
    /// The false-positive phrase that forced rejection, if any.
    pub blocked_by: Option<String>,
    pub passed: bool,
}

/* ----------------------------
Config schema (from TOML)
---------------------------- */

#[derive(Debug, Clone, Deserialize)]
pub struct RelevanceRoot {
    pub relevance: RelevanceSection,
    pub corpus: CorpusCfg,
    #[serde(default)]
    pub thresholds: Vec<ThresholdRule>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelevanceSection {
    #[serde(default = "default_threshold")]
    pub default_threshold: u32,
}

fn default_threshold() -> u32 {
    DEFAULT_THRESHOLD
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorpusCfg {
    pub keywords: Vec<String>,
    #[serde(default)]
    pub false_positives: Vec<String>,
}

/// `host` is matched as a substring of the source host.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ThresholdRule {
    pub host: String,
    pub threshold: u32,
}

/// Ordered (host substring, threshold) rules, tried top to bottom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdPolicy {
    rules: Vec<ThresholdRule>,
    default: u32,
}

impl ThresholdPolicy {
    pub fn new(rules: Vec<ThresholdRule>, default: u32) -> Self {
        let rules = rules
            .into_iter()
            .filter_map(|r| {
                let host = r.host.trim().to_ascii_lowercase();
                (!host.is_empty()).then_some(ThresholdRule {
                    host,
                    threshold: r.threshold,
                })
            })
            .collect();
        Self { rules, default }
    }

    pub fn rules(&self) -> &[ThresholdRule] {
        &self.rules
    }

    pub fn default_threshold(&self) -> u32 {
        self.default
    }

    /// First rule whose substring occurs in `host` wins; otherwise the default.
    pub fn resolve(&self, host: &str) -> u32 {
        let host = host.to_ascii_lowercase();
        self.rules
            .iter()
            .find(|r| host.contains(&r.host))
            .map_or(self.default, |r| r.threshold)
    }
}

/* ----------------------------
Compiled engine structures
---------------------------- */

#[derive(Debug)]
struct CompiledPhrase {
    phrase: String,
    re: Regex,
}

/// Whole-word, case-insensitive pattern; inner whitespace matches any run.
fn phrase_regex(phrase: &str) -> Result<Regex, regex::Error> {
    let body = phrase
        .split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s+");
    Regex::new(&format!(r"(?i)\b{body}\b"))
}

/// Trim, lowercase, drop blanks and duplicates; keeps first-seen order.
fn clean_phrases(items: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .iter()
        .map(|p| p.split_whitespace().collect::<Vec<_>>().join(" "))
        .map(|p| p.to_lowercase())
        .filter(|p| !p.is_empty() && seen.insert(p.clone()))
        .collect()
}

fn compile_all(kind: &str, phrases: &[String]) -> anyhow::Result<Vec<CompiledPhrase>> {
    phrases
        .iter()
        .map(|p| {
            let re = phrase_regex(p)
                .map_err(|e| anyhow::anyhow!("{kind} `{p}` regex error: {e}"))?;
            Ok(CompiledPhrase {
                phrase: p.clone(),
                re,
            })
        })
        .collect()
}

/// Holds compiled keyword and false-positive patterns plus the threshold policy.
/// Built once at start-up and shared read-only across all classifications.
#[derive(Debug)]
pub struct RelevanceEngine {
    keywords: Vec<CompiledPhrase>,
    false_positives: Vec<CompiledPhrase>,
    policy: ThresholdPolicy,
}

impl RelevanceEngine {
    /// Load from `$RELEVANCE_CONFIG_PATH` (must exist), else
    /// `config/relevance.toml`, else the built-in corpus.
    /// `$RELEVANCE_DEFAULT_THRESHOLD` overrides the default threshold.
    pub fn from_toml() -> anyhow::Result<Self> {
        let explicit = std::env::var(ENV_RELEVANCE_CONFIG_PATH).ok().map(PathBuf::from);
        Self::load(explicit)
    }

    /// Same as [`Self::from_toml`], with an explicit path taking the env var's place.
    pub fn load(explicit: Option<PathBuf>) -> anyhow::Result<Self> {
        let content = match explicit {
            Some(path) => fs::read_to_string(&path).map_err(|e| {
                anyhow::anyhow!(
                    "Failed to read relevance config at {}: {}",
                    path.display(),
                    e
                )
            })?,
            None => {
                let path = PathBuf::from(DEFAULT_RELEVANCE_CONFIG_PATH);
                if path.exists() {
                    fs::read_to_string(&path).map_err(|e| {
                        anyhow::anyhow!(
                            "Failed to read relevance config at {}: {}",
                            path.display(),
                            e
                        )
                    })?
                } else {
                    BUILTIN_RELEVANCE_TOML.to_string()
                }
            }
        };

        let mut root: RelevanceRoot = toml::from_str(&content)?;
        if let Some(t) = parse_threshold_env(std::env::var(ENV_DEFAULT_THRESHOLD).ok()) {
            root.relevance.default_threshold = t;
        }
        Self::from_root(root)
    }

    /// Built-in corpus shipped with the crate.
    pub fn builtin() -> anyhow::Result<Self> {
        Self::from_toml_str(BUILTIN_RELEVANCE_TOML)
    }

    /// Load from a TOML string
    pub fn from_toml_str(toml_str: &str) -> anyhow::Result<Self> {
        let root: RelevanceRoot = toml::from_str(toml_str)?;
        Self::from_root(root)
    }

    fn from_root(root: RelevanceRoot) -> anyhow::Result<Self> {
        let keywords = clean_phrases(&root.corpus.keywords);
        let false_positives = clean_phrases(&root.corpus.false_positives);
        if keywords.is_empty() {
            anyhow::bail!("relevance config has no keywords");
        }

        // the two sets must be disjoint
        let kw: HashSet<&String> = keywords.iter().collect();
        if let Some(both) = false_positives.iter().find(|p| kw.contains(p)) {
            anyhow::bail!("`{both}` is listed both as keyword and as false positive");
        }

        Ok(Self {
            keywords: compile_all("keyword", &keywords)?,
            false_positives: compile_all("false positive", &false_positives)?,
            policy: ThresholdPolicy::new(root.thresholds, root.relevance.default_threshold),
        })
    }

    pub fn policy(&self) -> &ThresholdPolicy {
        &self.policy
    }

    pub fn keyword_count(&self) -> usize {
        self.keywords.len()
    }

    /// First false-positive phrase present in `text`.
    pub fn find_false_positive(&self, text: &str) -> Option<&str> {
        self.false_positives
            .iter()
            .find(|fp| fp.re.is_match(text))
            .map(|fp| fp.phrase.as_str())
    }

    /// Distinct keywords present in `text`; repeats count once.
    pub fn distinct_hits(&self, text: &str) -> Vec<&str> {
        self.keywords
            .iter()
            .filter(|k| k.re.is_match(text))
            .map(|k| k.phrase.as_str())
            .collect()
    }

    /// Score raw (markup not stripped) title and summary for a source host.
    pub fn score(&self, title: &str, summary: &str, host: &str) -> Relevance {
        let blob = format!("{title} {summary}");
        let threshold = self.policy.resolve(host);

        if let Some(fp) = self.find_false_positive(&blob) {
            debug!(
                target: "relevance",
                id = %anon_hash(&blob),
                host,
                threshold,
                blocked_by = fp,
                "rejected by false positive"
            );
            return Relevance {
                threshold,
                blocked_by: Some(fp.to_string()),
                ..Relevance::default()
            };
        }

        let matched = self.distinct_hits(&blob);
        let body_hits = u32::try_from(matched.len()).unwrap_or(u32::MAX);
        let title_bonus = u32::from(self.keywords.iter().any(|k| k.re.is_match(title)));
        let score = body_hits.saturating_add(title_bonus);
        let passed = score >= threshold;

        debug!(
            target: "relevance",
            id = %anon_hash(&blob),
            host,
            score,
            threshold,
            passed,
            matched = ?truncate_vec(&matched, 5),
            "scored"
        );

        Relevance {
            score,
            body_hits,
            title_bonus,
            threshold,
            matched: matched.into_iter().map(str::to_string).collect(),
            blocked_by: None,
            passed,
        }
    }

    /// Gate used by the assembly engine.
    pub fn is_relevant(&self, entry: &FeedEntry, host: &str) -> bool {
        self.score(entry.title(), entry.summary_or_description(), host)
            .passed
    }
}

/* ----------------------------
Tests
---------------------------- */
