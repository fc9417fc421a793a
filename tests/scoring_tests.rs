//! Cross-module behavior of the scoring framework, routing policy, and cost
//! ledger, exercised the way a full enrichment run composes them.

use lead_enrichment_api::config::{DEFAULT_MQL_THRESHOLD, DEFAULT_SQL_THRESHOLD};
use lead_enrichment_api::costs::{self, Provider};
use lead_enrichment_api::models::{Classification, Urgency};
use lead_enrichment_api::routing::{determine_routing, Priority, RoutingAction};
use lead_enrichment_api::scoring::{classify, weighted_total};
use lead_enrichment_api::tools::{fallback_intent, lexical_urgency};
use std::str::FromStr;

#[test]
fn mid_market_scenario_lands_in_nurture() {
    // A "51-200" prospect whose categories average out to 68 overall.
    let overall = weighted_total(75.0, 60.0, 70.0, 60.0);
    assert!((overall - 68.25).abs() < 1e-9);

    let classification = classify(overall, DEFAULT_SQL_THRESHOLD, DEFAULT_MQL_THRESHOLD);
    assert_eq!(classification, Classification::Mql);

    let decision = determine_routing(classification, overall.round() as i32, "Jane Smith");
    assert_eq!(decision.action, RoutingAction::MarketingNurture);
    assert_eq!(decision.priority, Priority::Standard);
    assert!(decision.message.contains("Jane Smith"));
    assert!(decision.message.contains("(Score: 68)"));
}

#[test]
fn high_scoring_lead_goes_to_sales() {
    let overall = weighted_total(90.0, 80.0, 95.0, 70.0);
    assert!(overall >= DEFAULT_SQL_THRESHOLD);

    let classification = classify(overall, DEFAULT_SQL_THRESHOLD, DEFAULT_MQL_THRESHOLD);
    let decision = determine_routing(classification, overall.round() as i32, "Ada");
    assert_eq!(decision.action, RoutingAction::SalesNotification);
    assert_eq!(decision.priority, Priority::Immediate);
    assert!(decision.message.contains("immediate follow-up"));
}

#[test]
fn low_scoring_lead_gets_newsletter() {
    let overall = weighted_total(30.0, 20.0, 25.0, 10.0);
    assert!(overall < DEFAULT_MQL_THRESHOLD);

    let classification = classify(overall, DEFAULT_SQL_THRESHOLD, DEFAULT_MQL_THRESHOLD);
    let decision = determine_routing(classification, overall.round() as i32, "Quiet Lead");
    assert_eq!(decision.action, RoutingAction::NewsletterSignup);
    assert_eq!(decision.priority, Priority::Low);
}

#[test]
fn classification_survives_string_round_trip() {
    for classification in [
        Classification::Sql,
        Classification::Mql,
        Classification::Unqualified,
    ] {
        let text = classification.as_str();
        assert_eq!(Classification::from_str(text).unwrap(), classification);
    }
    assert!(Classification::from_str("sql").is_err());
}

#[test]
fn cost_ledger_matches_published_rates() {
    // gpt-4o blends to $0.00001 per token.
    let cost = costs::llm_cost(10_000, "gpt-4o");
    assert!((cost - 0.1).abs() < 1e-9);

    // Unknown models fall back to the provider default rate.
    let fallback = costs::llm_cost(10_000, "some-new-model");
    assert!(fallback > 0.0);

    assert!((costs::search_cost(true) - 0.002).abs() < 1e-12);
    assert!((costs::search_cost(false) - 0.001).abs() < 1e-12);
    assert!((costs::crawl_cost(5) - 0.1).abs() < 1e-9);
}

#[test]
fn estimate_dispatches_per_provider() {
    assert!((costs::estimate(Provider::Search, None, "") - costs::search_cost(true)).abs() < 1e-12);
    let llm = costs::estimate(Provider::Llm, Some(1_000), "gpt-4o");
    assert!((llm - costs::llm_cost(1_000, "gpt-4o")).abs() < 1e-12);
}

#[test]
fn urgent_language_scores_high_even_in_fallback() {
    let signals = fallback_intent("This is urgent - we need the rollout done this quarter");
    assert!(signals.fallback);
    assert_eq!(signals.urgency, Urgency::High);
    assert!((signals.intent_score - 50.0).abs() < f64::EPSILON);
}

#[test]
fn relaxed_language_stays_low_urgency() {
    assert_eq!(
        lexical_urgency("We are casually comparing a few tools"),
        Urgency::Low
    );
    assert_eq!(
        lexical_urgency("Hoping to decide sometime next quarter"),
        Urgency::Medium
    );
}
