//! Solver options: the baseline configuration and per-case overrides.
//!
//! Config files are read as `KEY= VALUE` lines. `%` starts a comment and blank
//! lines are skipped. Only the shape is understood here; what an option means
//! is the solver's business.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use crate::error::{CaseError, SweepError, SweepResult};

/// Ordered option set. Keys keep the order in which they first appeared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Options {
    entries: Vec<(String, String)>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `KEY= VALUE` text. Later duplicates replace earlier values.
    pub fn parse(text: &str) -> SweepResult<Self> {
        let mut options = Self::new();
        for (lineno, raw) in text.lines().enumerate() {
            let line = match raw.find('%') {
                Some(idx) => &raw[..idx],
                None => raw,
            }
            .trim();
            if line.is_empty() {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| {
                SweepError::Configuration(format!(
                    "line {}: expected KEY= VALUE, got {:?}",
                    lineno + 1,
                    raw.trim()
                ))
            })?;
            let key = normalize_key(key);
            if key.is_empty() {
                return Err(SweepError::Configuration(format!(
                    "line {}: empty option key",
                    lineno + 1
                )));
            }
            options.set(key, value.trim());
        }
        Ok(options)
    }

    /// Read and parse a config file from disk.
    pub fn load(path: &Path) -> SweepResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SweepError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::parse(&text)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        let key = normalize_key(key);
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert or replace a value, keeping the original position of the key.
    pub fn set(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
        let key = normalize_key(key.as_ref());
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Render back to config-file text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.entries {
            out.push_str(key);
            out.push_str("= ");
            out.push_str(value);
            out.push('\n');
        }
        out
    }

    /// SHA-256 over the rendered options, hex encoded.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for (key, value) in &self.entries {
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
            hasher.update(b"\0");
        }
        hex::encode(hasher.finalize())
    }
}

fn normalize_key(key: &str) -> String {
    key.trim().to_ascii_uppercase()
}

/// Sparse per-case overrides: option key to the value replacing the baseline's.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overrides(BTreeMap<String, String>);

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
        self.0.insert(normalize_key(key.as_ref()), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(&normalize_key(key)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Merge onto a copy of `baseline`.
    ///
    /// A key is accepted when the baseline sets it or when it has a known
    /// [`OptionDomain`]. Known keys the baseline leaves to the solver default
    /// are appended after the baseline's own keys. Values for keys with a
    /// domain must fall inside it.
    pub fn apply(&self, baseline: &Options) -> Result<Options, CaseError> {
        let mut merged = baseline.clone();
        for (key, value) in self.iter() {
            match OptionDomain::for_key(key) {
                Some(domain) => domain.check(key, value)?,
                None if !baseline.contains(key) => {
                    return Err(CaseError::configuration(format!(
                        "unknown option {key}: not in the baseline configuration \
                         and not a known sweep option"
                    )));
                }
                None => {}
            }
            merged.set(key, value);
        }
        Ok(merged)
    }
}

impl fmt::Display for Overrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.iter().map(|(k, v)| format!("{k}={v}")).collect();
        write!(f, "{}", parts.join(", "))
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Overrides {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut overrides = Self::new();
        for (k, v) in iter {
            overrides.insert(k, v);
        }
        overrides
    }
}

/// Accepted values for the options a sweep is known to vary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OptionDomain {
    OneOf(&'static [&'static str]),
    Positive,
    Range { min: f64, max: f64 },
}

pub const CONV_NUM_METHODS_FLOW: &[&str] = &[
    "JST",
    "LAX-FRIEDRICH",
    "ROE-1ST_ORDER",
    "ROE-2ND_ORDER",
    "AUSM-1ST_ORDER",
    "AUSM-2ND_ORDER",
    "HLLC-1ST_ORDER",
    "HLLC-2ND_ORDER",
    "ROE_TURKEL_1ST",
    "ROE_TURKEL_2ND",
];

pub const CONV_NUM_METHODS_TURB: &[&str] =
    &["SCALAR_UPWIND-1ST_ORDER", "SCALAR_UPWIND-2ND_ORDER"];

pub const VISC_NUM_METHODS: &[&str] = &["AVG_GRAD", "AVG_GRAD_CORRECTED", "GALERKIN"];

impl OptionDomain {
    /// Domain registered for `key`, if any. Unlisted keys accept any value.
    pub fn for_key(key: &str) -> Option<Self> {
        match normalize_key(key).as_str() {
            "CONV_NUM_METHOD_FLOW" => Some(Self::OneOf(CONV_NUM_METHODS_FLOW)),
            "CONV_NUM_METHOD_TURB" => Some(Self::OneOf(CONV_NUM_METHODS_TURB)),
            "VISC_NUM_METHOD_FLOW" | "VISC_NUM_METHOD_TURB" => {
                Some(Self::OneOf(VISC_NUM_METHODS))
            }
            "LIMITER_COEFF" => Some(Self::Positive),
            "AD_COEFF_FLOW" => Some(Self::Range { min: 0.0, max: 1.0 }),
            _ => None,
        }
    }

    pub fn check(&self, key: &str, value: &str) -> Result<(), CaseError> {
        match self {
            Self::OneOf(allowed) => {
                if allowed.iter().any(|a| a.eq_ignore_ascii_case(value.trim())) {
                    Ok(())
                } else {
                    Err(CaseError::configuration(format!(
                        "{key}={value} is not one of {}",
                        allowed.join(", ")
                    )))
                }
            }
            Self::Positive => match parse_number(key, value)? {
                v if v > 0.0 => Ok(()),
                _ => Err(CaseError::configuration(format!(
                    "{key}={value} must be positive"
                ))),
            },
            Self::Range { min, max } => match parse_number(key, value)? {
                v if v >= *min && v <= *max => Ok(()),
                _ => Err(CaseError::configuration(format!(
                    "{key}={value} must lie in [{min}, {max}]"
                ))),
            },
        }
    }
}

fn parse_number(key: &str, value: &str) -> Result<f64, CaseError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| CaseError::configuration(format!("{key}={value} is not a number")))
}
