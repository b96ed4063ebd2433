pub mod keywords;
pub mod router;

pub use keywords::{match_keywords, KeywordRule, KEYWORD_TABLE};
pub use router::{AgentRouter, RouteDecision, RouteMethod, DEFAULT_CONFIDENCE, KEYWORD_CONFIDENCE};
