use anyhow::{Result, bail};
use std::collections::HashSet;
use std::hash::Hasher;
use twox_hash::XxHash64;

pub const DEFAULT_SEED: u64 = 1337;

/// Seed metadata used for scenario runs and progression analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedInfo {
    pub seed: u64,
    /// The phrase the seed was derived from, if any.
    pub phrase: Option<String>,
}

impl SeedInfo {
    #[must_use]
    pub fn from_numeric(seed: u64) -> Self {
        Self { seed, phrase: None }
    }

    /// Derive a seed from free text so runs can be named.
    #[must_use]
    pub fn from_phrase(phrase: &str) -> Self {
        let normalized = phrase.trim().to_lowercase();
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(normalized.as_bytes());
        Self {
            seed: hasher.finish(),
            phrase: Some(normalized),
        }
    }

    #[must_use]
    pub fn label(&self) -> String {
        self.phrase
            .clone()
            .unwrap_or_else(|| self.seed.to_string())
    }
}

/// Resolve CLI seed tokens into canonical seed metadata.
///
/// Accepts decimal integers (negative values use their magnitude), `0x` hex,
/// and `word:` prefixed phrases. Duplicates are dropped, keeping the first.
///
/// # Errors
///
/// Returns an error for tokens that match none of the accepted forms.
pub fn resolve_seed_inputs(tokens: &[String]) -> Result<Vec<SeedInfo>> {
    let mut resolved = Vec::new();
    let mut seen = HashSet::new();

    for token in tokens {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let info = parse_seed_token(token)?;
        if seen.insert(info.seed) {
            resolved.push(info);
        }
    }

    if resolved.is_empty() {
        resolved.push(SeedInfo::from_numeric(DEFAULT_SEED));
    }
    Ok(resolved)
}

fn parse_seed_token(token: &str) -> Result<SeedInfo> {
    if let Ok(value) = token.parse::<u64>() {
        return Ok(SeedInfo::from_numeric(value));
    }
    if let Ok(value) = token.parse::<i64>() {
        return Ok(SeedInfo::from_numeric(value.unsigned_abs()));
    }
    if let Some(hex) = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        && let Ok(value) = u64::from_str_radix(hex, 16)
    {
        return Ok(SeedInfo::from_numeric(value));
    }
    if let Some(phrase) = token.strip_prefix("word:")
        && !phrase.trim().is_empty()
    {
        return Ok(SeedInfo::from_phrase(phrase));
    }
    bail!("Unrecognized seed token: {token}");
}
