use std::sync::LazyLock;

use regex::Regex;

/// Keywords that point a task at an agent type.
pub struct KeywordRule {
    pub agent_type: &'static str,
    pub keywords: &'static [&'static str],
}

/// Checked in order; the first registered type with a matching keyword wins.
pub const KEYWORD_TABLE: &[KeywordRule] = &[
    KeywordRule {
        agent_type: "finance",
        keywords: &[
            "invoice", "invoices", "payment", "payments", "budget", "expense", "expenses",
            "billing", "revenue", "tax", "accounting", "ledger", "reconcile", "discrepancy",
            "discrepancies", "reimbursement",
        ],
    },
    KeywordRule {
        agent_type: "development",
        keywords: &[
            "bug", "bugs", "code", "deploy", "deployment", "api", "database", "server",
            "crash", "stack trace", "repository", "pull request", "release", "build",
        ],
    },
    KeywordRule {
        agent_type: "hr",
        keywords: &[
            "employee", "employees", "hiring", "hire", "leave", "vacation", "payroll",
            "onboarding", "performance review", "benefits", "recruiting", "training",
        ],
    },
    KeywordRule {
        agent_type: "sales",
        keywords: &[
            "lead", "leads", "deal", "deals", "quote", "prospect", "pipeline", "pricing",
            "proposal", "crm", "opportunity", "upsell",
        ],
    },
    KeywordRule {
        agent_type: "support",
        keywords: &[
            "ticket", "tickets", "help", "issue", "complaint", "customer service",
            "troubleshoot", "password reset", "not working", "refund",
        ],
    },
    KeywordRule {
        agent_type: "marketing",
        keywords: &[
            "campaign", "campaigns", "seo", "social media", "newsletter", "brand",
            "content", "advertising", "launch", "audience",
        ],
    },
];

static PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    KEYWORD_TABLE
        .iter()
        .map(|rule| {
            let alternatives: Vec<String> = rule.keywords.iter().map(|k| regex::escape(k)).collect();
            let pattern = format!(r"(?i)\b(?:{})\b", alternatives.join("|"));
            (rule.agent_type, Regex::new(&pattern).expect("static regex"))
        })
        .collect()
});

/// First `(agent_type, keyword)` match in table order, restricted to the
/// types accepted by `is_candidate`.
pub fn match_keywords<F>(task: &str, is_candidate: F) -> Option<(&'static str, String)>
where
    F: Fn(&str) -> bool,
{
    PATTERNS
        .iter()
        .filter(|(agent_type, _)| is_candidate(*agent_type))
        .find_map(|(agent_type, re)| re.find(task).map(|m| (*agent_type, m.as_str().to_lowercase())))
}
