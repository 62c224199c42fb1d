//! Query and result types for the serving layer, plus the canonical cache
//! key.
//!
//! Game state and parameters are opaque JSON maps supplied by callers. The
//! serving layer reads a few numeric fields from them (pot, to_call, equity,
//! ...) and otherwise treats them as part of the cache identity.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{GtoError, GtoResult};
use crate::strategy::{ActionValues, Strategy};

pub type Params = BTreeMap<String, Value>;

// ---------------------------------------------------------------------------
// Query type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Range,
    Action,
    Equity,
    Ev,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Range => "range",
            QueryType::Action => "action",
            QueryType::Equity => "equity",
            QueryType::Ev => "ev",
        }
    }
}

impl FromStr for QueryType {
    type Err = GtoError;

    fn from_str(s: &str) -> GtoResult<Self> {
        match s.to_lowercase().as_str() {
            "range" => Ok(QueryType::Range),
            "action" => Ok(QueryType::Action),
            "equity" => Ok(QueryType::Equity),
            "ev" => Ok(QueryType::Ev),
            _ => Err(GtoError::UnknownQueryType(s.to_string())),
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyQuery {
    pub query_type: QueryType,
    #[serde(default)]
    pub game_state: Params,
    #[serde(default)]
    pub parameters: Params,
    /// Falls back to the serving config's budget when absent.
    #[serde(default)]
    pub time_budget_ms: Option<u64>,
    /// Falls back to the engine's current adaptive level when absent.
    #[serde(default)]
    pub approximation_level: Option<u8>,
}

impl StrategyQuery {
    pub fn new(query_type: QueryType) -> Self {
        StrategyQuery {
            query_type,
            game_state: Params::new(),
            parameters: Params::new(),
            time_budget_ms: None,
            approximation_level: None,
        }
    }

    pub fn with_state(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.game_state.insert(key.to_string(), value.into());
        self
    }

    pub fn with_param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.to_string(), value.into());
        self
    }

    pub fn with_level(mut self, level: u8) -> Self {
        self.approximation_level = Some(level);
        self
    }

    pub fn with_budget_ms(mut self, ms: u64) -> Self {
        self.time_budget_ms = Some(ms);
        self
    }

    /// Parse from JSON, reporting an unrecognized `query_type` as such
    /// rather than as a generic decode error.
    pub fn from_value(value: Value) -> GtoResult<Self> {
        match value.get("query_type") {
            Some(Value::String(s)) => {
                s.parse::<QueryType>()?;
            }
            Some(other) => {
                return Err(GtoError::invalid(format!("query_type must be a string, got {}", other)))
            }
            None => return Err(GtoError::invalid("query is missing query_type")),
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Parameters shadow game state for the same key.
    pub fn lookup(&self, key: &str) -> Option<&Value> {
        self.parameters.get(key).or_else(|| self.game_state.get(key))
    }

    pub fn number(&self, key: &str) -> GtoResult<f64> {
        match self.lookup(key) {
            Some(v) => as_number(key, v),
            None => Err(GtoError::invalid(format!(
                "{} query needs '{}'",
                self.query_type, key
            ))),
        }
    }

    pub fn number_or(&self, key: &str, default: f64) -> GtoResult<f64> {
        match self.lookup(key) {
            Some(v) => as_number(key, v),
            None => Ok(default),
        }
    }

    pub fn text_or<'a>(&'a self, key: &str, default: &'a str) -> GtoResult<&'a str> {
        match self.lookup(key) {
            Some(Value::String(s)) => Ok(s.as_str()),
            Some(other) => Err(GtoError::invalid(format!("'{}' must be a string, got {}", key, other))),
            None => Ok(default),
        }
    }
}

fn as_number(key: &str, v: &Value) -> GtoResult<f64> {
    match v.as_f64() {
        Some(n) if n.is_finite() => Ok(n),
        _ => Err(GtoError::invalid(format!("'{}' must be a number, got {}", key, v))),
    }
}

// ---------------------------------------------------------------------------
// Canonical key
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey(pub u64);

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Hash of (game state, query type, parameters, level). Object keys are
/// sorted and numbers are written by value, so field order and `100` vs
/// `100.0` do not change the key.
pub fn canonical_key(query: &StrategyQuery, level: u8) -> CacheKey {
    let mut buf = String::new();
    buf.push_str(query.query_type.as_str());
    buf.push('|');
    write_map(&query.game_state, &mut buf);
    buf.push('|');
    write_map(&query.parameters, &mut buf);
    buf.push('|');
    buf.push_str(&level.to_string());

    let mut hasher = DefaultHasher::new();
    buf.hash(&mut hasher);
    CacheKey(hasher.finish())
}

fn write_map(map: &Params, buf: &mut String) {
    buf.push('{');
    for (i, (k, v)) in map.iter().enumerate() {
        if i > 0 {
            buf.push(',');
        }
        buf.push_str(&Value::String(k.clone()).to_string());
        buf.push(':');
        write_canonical(v, buf);
    }
    buf.push('}');
}

fn write_canonical(value: &Value, buf: &mut String) {
    match value {
        Value::Object(obj) => {
            let mut keys: Vec<&String> = obj.keys().collect();
            keys.sort();
            buf.push('{');
            for (i, k) in keys.into_iter().enumerate() {
                if i > 0 {
                    buf.push(',');
                }
                buf.push_str(&Value::String(k.clone()).to_string());
                buf.push(':');
                write_canonical(&obj[k.as_str()], buf);
            }
            buf.push('}');
        }
        Value::Array(items) => {
            buf.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    buf.push(',');
                }
                write_canonical(item, buf);
            }
            buf.push(']');
        }
        Value::Number(n) => match n.as_f64() {
            Some(f) => buf.push_str(&format!("{}", f)),
            None => buf.push_str(&n.to_string()),
        },
        other => buf.push_str(&other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Answer {
    Range {
        position: String,
        /// Fraction of all starting hands played.
        range_fraction: f64,
    },
    Action {
        action: String,
        strategy: Strategy,
        #[serde(default)]
        action_evs: ActionValues,
    },
    Equity {
        equity: f64,
    },
    Ev {
        ev: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub query_type: QueryType,
    /// `None` only for error placeholders.
    pub answer: Option<Answer>,
    pub confidence: f64,
    pub approximation_level: u8,
    pub cached: bool,
    pub compute_time_ms: f64,
    pub refinement_stages: usize,
    /// Set when the answer came from an equilibrium solve.
    #[serde(default)]
    pub exploitability: Option<f64>,
    #[serde(default)]
    pub error: Option<String>,
}

impl QueryResult {
    pub fn new(query_type: QueryType, answer: Answer, confidence: f64, level: u8) -> Self {
        QueryResult {
            query_type,
            answer: Some(answer),
            confidence,
            approximation_level: level,
            cached: false,
            compute_time_ms: 0.0,
            refinement_stages: 0,
            exploitability: None,
            error: None,
        }
    }

    /// Placeholder for a query that failed inside a batch.
    pub fn failure(query_type: QueryType, message: impl Into<String>) -> Self {
        QueryResult {
            query_type,
            answer: None,
            confidence: 0.0,
            approximation_level: 0,
            cached: false,
            compute_time_ms: 0.0,
            refinement_stages: 0,
            exploitability: None,
            error: Some(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
