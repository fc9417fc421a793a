//! Cost ledger for external provider usage tracking.
//!
//! Pure lookup tables mapping (provider, token/operation count) to dollar
//! estimates. Deterministic and I/O-free so enrichment telemetry can be
//! unit-tested without touching the network or the database.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// External capability providers instrumented by the enrichment log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// News/company-signal search provider.
    Search,
    /// Website crawl provider.
    Crawl,
    /// Language-model completion / structured-generation provider.
    Llm,
    /// Market-research synthesis provider.
    Research,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Search => "search",
            Provider::Crawl => "crawl",
            Provider::Llm => "llm",
            Provider::Research => "research",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "search" => Ok(Provider::Search),
            "crawl" => Ok(Provider::Crawl),
            "llm" => Ok(Provider::Llm),
            "research" => Ok(Provider::Research),
            other => Err(format!("unknown provider: {}", other)),
        }
    }
}

// Blended per-token rates (USD), averaging input/output pricing for mixed
// usage. Update when provider pricing changes.
const LLM_TOKEN_RATES: &[(&str, f64)] = &[
    ("gpt-4o", 0.000_010),      // $5/1M in, $15/1M out
    ("gpt-4o-mini", 0.000_000_375), // $0.15/1M in, $0.60/1M out
];
const LLM_DEFAULT_TOKEN_RATE: f64 = 0.000_010;

const RESEARCH_TOKEN_RATES: &[(&str, f64)] = &[
    ("sonar-pro", 0.000_001),
    ("sonar", 0.000_000_5),
];
const RESEARCH_DEFAULT_TOKEN_RATE: f64 = 0.000_001;

/// Per-operation estimates for providers that bill per call rather than per
/// token.
pub const SEARCH_COST_PER_QUERY: f64 = 0.001;
pub const SEARCH_COST_WITH_CONTENT: f64 = 0.002;
pub const CRAWL_COST_PER_PAGE: f64 = 0.02;

fn rate_for(table: &[(&str, f64)], default: f64, model: &str) -> f64 {
    // Accept both bare model names and provider-prefixed ones ("llm/gpt-4o").
    let bare = model.rsplit('/').next().unwrap_or(model);
    table
        .iter()
        .find(|(name, _)| *name == bare)
        .map(|(_, rate)| *rate)
        .unwrap_or(default)
}

/// Token-based cost for an LLM call. Falls back to the provider default rate
/// for unrecognized models.
pub fn llm_cost(tokens: u64, model: &str) -> f64 {
    tokens as f64 * rate_for(LLM_TOKEN_RATES, LLM_DEFAULT_TOKEN_RATE, model)
}

/// Token-based cost for a research-provider call.
pub fn research_cost(tokens: u64, model: &str) -> f64 {
    tokens as f64 * rate_for(RESEARCH_TOKEN_RATES, RESEARCH_DEFAULT_TOKEN_RATE, model)
}

/// Per-operation cost for a search call.
pub fn search_cost(with_content: bool) -> f64 {
    if with_content {
        SEARCH_COST_WITH_CONTENT
    } else {
        SEARCH_COST_PER_QUERY
    }
}

/// Per-page cost for a crawl.
pub fn crawl_cost(pages: u32) -> f64 {
    pages as f64 * CRAWL_COST_PER_PAGE
}

/// Estimate a cost from token usage when available, otherwise from a fixed
/// per-operation rate. This is the single entry point used by the enrichment
/// log store when a caller does not pass an explicit cost.
pub fn estimate(provider: Provider, tokens: Option<u64>, model: &str) -> f64 {
    match (provider, tokens) {
        (Provider::Llm, Some(t)) => llm_cost(t, model),
        (Provider::Research, Some(t)) => research_cost(t, model),
        // Token-billed providers with no token count: assume one default call.
        (Provider::Llm, None) => llm_cost(1_000, model),
        (Provider::Research, None) => research_cost(1_000, model),
        (Provider::Search, _) => search_cost(true),
        (Provider::Crawl, _) => crawl_cost(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn llm_cost_uses_model_rate() {
        assert_eq!(llm_cost(1_000_000, "gpt-4o"), 10.0);
        assert!(llm_cost(1_000_000, "gpt-4o-mini") < llm_cost(1_000_000, "gpt-4o"));
    }

    #[test]
    fn unknown_model_falls_back_to_provider_default() {
        assert_eq!(llm_cost(100, "some-future-model"), llm_cost(100, "gpt-4o"));
        assert_eq!(
            research_cost(100, "mystery"),
            100.0 * RESEARCH_DEFAULT_TOKEN_RATE
        );
    }

    #[test]
    fn prefixed_model_names_resolve() {
        assert_eq!(llm_cost(500, "llm/gpt-4o"), llm_cost(500, "gpt-4o"));
        assert_eq!(
            research_cost(500, "research/sonar"),
            research_cost(500, "sonar")
        );
    }

    #[test]
    fn per_operation_estimates() {
        assert_eq!(search_cost(false), 0.001);
        assert_eq!(search_cost(true), 0.002);
        assert_eq!(crawl_cost(5), 0.10);
    }

    #[test]
    fn estimate_is_deterministic() {
        for provider in [
            Provider::Search,
            Provider::Crawl,
            Provider::Llm,
            Provider::Research,
        ] {
            let a = estimate(provider, Some(1234), "gpt-4o");
            let b = estimate(provider, Some(1234), "gpt-4o");
            assert_eq!(a, b);
        }
    }

    #[test]
    fn provider_round_trips_through_strings() {
        for p in [
            Provider::Search,
            Provider::Crawl,
            Provider::Llm,
            Provider::Research,
        ] {
            assert_eq!(p.as_str().parse::<Provider>().unwrap(), p);
        }
    }
}
