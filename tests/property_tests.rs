/// Property-based tests using proptest
/// Tests invariants and properties that should hold for all inputs
use lead_enrichment_api::config::{DEFAULT_MQL_THRESHOLD, DEFAULT_SQL_THRESHOLD};
use lead_enrichment_api::costs;
use lead_enrichment_api::models::Classification;
use lead_enrichment_api::routing::determine_routing;
use lead_enrichment_api::scoring::{classify, weighted_total};
use lead_enrichment_api::tools::{extract_domain, lexical_urgency};
use proptest::prelude::*;

// Property: the weighted sum stays inside the score range and matches the
// hand-computed combination for any category scores.
proptest! {
    #[test]
    fn weighted_total_stays_in_range(
        firmographic in 0.0f64..=100.0,
        behavioral in 0.0f64..=100.0,
        intent in 0.0f64..=100.0,
        technographic in 0.0f64..=100.0
    ) {
        let overall = weighted_total(firmographic, behavioral, intent, technographic);
        prop_assert!((0.0..=100.0).contains(&overall));

        let expected = firmographic * 0.35 + behavioral * 0.25 + intent * 0.25 + technographic * 0.15;
        prop_assert!((overall - expected).abs() < 1e-9);
    }

    #[test]
    fn classification_agrees_with_thresholds(score in 0.0f64..=100.0) {
        let classification = classify(score, DEFAULT_SQL_THRESHOLD, DEFAULT_MQL_THRESHOLD);
        match classification {
            Classification::Sql => prop_assert!(score >= 70.0),
            Classification::Mql => prop_assert!((40.0..70.0).contains(&score)),
            Classification::Unqualified => prop_assert!(score < 40.0),
        }
    }
}

// Property: routing is a pure function of its inputs.
proptest! {
    #[test]
    fn routing_is_pure(score in 0i32..=100, name in "[A-Za-z ]{1,30}") {
        for classification in [Classification::Sql, Classification::Mql, Classification::Unqualified] {
            let first = determine_routing(classification, score, &name);
            let second = determine_routing(classification, score, &name);
            prop_assert_eq!(&first, &second);
            let expected_score_fragment = format!("(Score: {})", score);
            prop_assert!(first.message.contains(&expected_score_fragment));
        }
    }
}

// Property: the cost ledger is deterministic, non-negative, and linear in
// token count.
proptest! {
    #[test]
    fn llm_cost_is_linear_and_non_negative(tokens in 0u64..=10_000_000, model in "[a-z0-9.-]{0,20}") {
        let one = costs::llm_cost(tokens, &model);
        prop_assert!(one >= 0.0);
        prop_assert!((costs::llm_cost(tokens, &model) - one).abs() < f64::EPSILON);

        let double = costs::llm_cost(tokens * 2, &model);
        prop_assert!((double - one * 2.0).abs() < 1e-9);
    }

    #[test]
    fn crawl_cost_scales_with_pages(pages in 0u32..=1000) {
        let cost = costs::crawl_cost(pages);
        prop_assert!(cost >= 0.0);
        prop_assert!((cost - 0.02 * pages as f64).abs() < 1e-9);
    }
}

// Property: text helpers never panic on arbitrary input.
proptest! {
    #[test]
    fn urgency_scan_never_panics(text in "\\PC*") {
        let _ = lexical_urgency(&text);
    }

    #[test]
    fn domain_extraction_never_panics(email in "\\PC*") {
        let _ = extract_domain(&email);
    }

    #[test]
    fn extracted_domains_look_like_domains(
        local in "[a-z]{1,10}",
        domain in "[a-z]{1,10}",
        tld in "[a-z]{2,4}"
    ) {
        let email = format!("{}@{}.{}", local, domain, tld);
        if let Some(extracted) = extract_domain(&email) {
            prop_assert!(extracted.contains('.'));
            prop_assert_eq!(extracted, format!("{}.{}", domain, tld));
        }
    }
}
