//! Classification-based routing. Pure functions so routing decisions can be
//! tested without a database.

use crate::models::Classification;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Downstream action for a classified lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingAction {
    SalesNotification,
    MarketingNurture,
    NewsletterSignup,
}

impl RoutingAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingAction::SalesNotification => "sales_notification",
            RoutingAction::MarketingNurture => "marketing_nurture",
            RoutingAction::NewsletterSignup => "newsletter_signup",
        }
    }
}

impl fmt::Display for RoutingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Follow-up priority attached to a routing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Immediate,
    Standard,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Immediate => "immediate",
            Priority::Standard => "standard",
            Priority::Low => "low",
        }
    }
}

/// The routing outcome for one lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub action: RoutingAction,
    pub message: String,
    pub priority: Priority,
}

/// Map a classification and score to a routing decision. Deterministic for
/// identical inputs.
pub fn determine_routing(
    classification: Classification,
    score: i32,
    contact_name: &str,
) -> RoutingDecision {
    match classification {
        Classification::Sql => RoutingDecision {
            action: RoutingAction::SalesNotification,
            message: format!(
                "High-priority lead {} routed to sales team - immediate follow-up recommended (Score: {})",
                contact_name, score
            ),
            priority: Priority::Immediate,
        },
        Classification::Mql => RoutingDecision {
            action: RoutingAction::MarketingNurture,
            message: format!(
                "Marketing qualified lead {} added to nurture sequence (Score: {})",
                contact_name, score
            ),
            priority: Priority::Standard,
        },
        Classification::Unqualified => RoutingDecision {
            action: RoutingAction::NewsletterSignup,
            message: format!(
                "Lead {} added to newsletter and long-term education flow (Score: {})",
                contact_name, score
            ),
            priority: Priority::Low,
        },
    }
}

/// Human-readable description of what an action triggers downstream.
pub fn action_description(action: RoutingAction) -> &'static str {
    match action {
        RoutingAction::SalesNotification => {
            "Immediate sales team notification and fast-track CRM workflow"
        }
        RoutingAction::MarketingNurture => {
            "Marketing automation sequence and lead scoring workflow"
        }
        RoutingAction::NewsletterSignup => "Newsletter signup and long-term nurture campaign",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sql_routes_to_sales_immediately() {
        let decision = determine_routing(Classification::Sql, 85, "Ada Lovelace");
        assert_eq!(decision.action, RoutingAction::SalesNotification);
        assert_eq!(decision.priority, Priority::Immediate);
        assert!(decision.message.contains("Ada Lovelace"));
        assert!(decision.message.contains("(Score: 85)"));
    }

    #[test]
    fn mql_routes_to_nurture() {
        let decision = determine_routing(Classification::Mql, 68, "Grace Hopper");
        assert_eq!(decision.action, RoutingAction::MarketingNurture);
        assert_eq!(decision.priority, Priority::Standard);
        assert!(decision.message.contains("nurture sequence"));
    }

    #[test]
    fn unqualified_routes_to_newsletter() {
        let decision = determine_routing(Classification::Unqualified, 22, "Alan Turing");
        assert_eq!(decision.action, RoutingAction::NewsletterSignup);
        assert_eq!(decision.priority, Priority::Low);
    }

    #[test]
    fn routing_is_deterministic() {
        let a = determine_routing(Classification::Sql, 91, "Sam");
        let b = determine_routing(Classification::Sql, 91, "Sam");
        assert_eq!(a, b);
    }

    #[test]
    fn descriptions_cover_every_action() {
        for action in [
            RoutingAction::SalesNotification,
            RoutingAction::MarketingNurture,
            RoutingAction::NewsletterSignup,
        ] {
            assert!(!action_description(action).is_empty());
        }
    }
}
