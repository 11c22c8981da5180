//! Importance rules for incoming messages.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Built-in urgency tokens checked after the configured keywords. These are
/// defaults for the deployment language, not policy; configured keywords
/// extend them.
pub const URGENCY_PATTERNS: &[&str] = &[
    "preciso",
    "agora",
    "urgente",
    "imediato",
    "emergência",
    "responda",
    "ajuda",
    "socorro",
    "rápido",
    "prazo",
];

/// Configured matching rules, extracted from the monitor configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassifierRules {
    /// Case-insensitive substrings matched against the message text.
    pub keywords: Vec<String>,
    /// Contact names matched exactly.
    pub important_contacts: Vec<String>,
}

/// Which rule marked a message as important.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleMatch {
    ImportantContact,
    Keyword(String),
    UrgencyPattern(&'static str),
}

impl fmt::Display for RuleMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleMatch::ImportantContact => write!(f, "important contact"),
            RuleMatch::Keyword(keyword) => write!(f, "keyword '{}'", keyword),
            RuleMatch::UrgencyPattern(pattern) => write!(f, "urgency pattern '{}'", pattern),
        }
    }
}

/// Classify a message, reporting the first rule that matched.
///
/// Pure and total: the same (contact, text, rules) always yields the same
/// verdict. Rule order only affects which match is reported, not whether
/// the message counts as important.
pub fn classify(contact: &str, text: &str, rules: &ClassifierRules) -> Option<RuleMatch> {
    if rules
        .important_contacts
        .iter()
        .any(|important| important == contact)
    {
        return Some(RuleMatch::ImportantContact);
    }

    let lowered = text.to_lowercase();
    for keyword in &rules.keywords {
        if keyword.is_empty() {
            continue;
        }
        if lowered.contains(&keyword.to_lowercase()) {
            return Some(RuleMatch::Keyword(keyword.clone()));
        }
    }

    for pattern in URGENCY_PATTERNS.iter().copied() {
        if lowered.contains(pattern) {
            return Some(RuleMatch::UrgencyPattern(pattern));
        }
    }

    None
}

pub fn is_important(contact: &str, text: &str, rules: &ClassifierRules) -> bool {
    classify(contact, text, rules).is_some()
}
