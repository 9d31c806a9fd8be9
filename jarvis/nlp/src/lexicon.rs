//! Keyword tables for the command parser.
//!
//! Every pattern is compiled as `(?i)\b(?:<alternatives>)`: matching is
//! case-insensitive and anchored at the start of a word, so inflections
//! (`users`, `running`) match while embedded fragments (`api` in `rapid`)
//! do not. The tables are plain data and are compiled once per process.

use jarvis_model::{services, Intent, TestType};
use once_cell::sync::OnceCell;
use regex::Regex;

use crate::command::{
    Constraint, ContextPriority, ContextScope, ExecutionMode, ParseError, Timing, Urgency,
};

const INTENTS: &[(&str, Intent)] = &[
    (r"run|execut|start|launch", Intent::RunTests),
    (r"analy[sz]|investigat|debug|examin", Intent::AnalyzeFailures),
    (r"generat|create|write|build", Intent::GenerateTests),
    (r"optimi[sz]|improv|enhanc|tune", Intent::OptimizeTests),
    (r"health|status|check|monitor", Intent::HealthCheck),
    (r"status|state\b|info|details", Intent::GetStatus),
    (r"help|assist|support|guide", Intent::Help),
];

const SERVICES: &[(&str, &str)] = &[
    (r"user", services::USER_SERVICE),
    (r"product", services::PRODUCT_SERVICE),
    (r"order", services::ORDER_SERVICE),
    (r"notification", services::NOTIFICATION_SERVICE),
    (r"gateway|api", services::GATEWAY_SERVICE),
];

const ALL_SERVICES: &str = r"all\b|every(?:thing)?\b|entire|complete";

const SERVICE_PAIRS: &[(&str, [&str; 2])] = &[
    (
        r"user.*\border|order.*\buser",
        [services::USER_SERVICE, services::ORDER_SERVICE],
    ),
    (
        r"product.*\border|order.*\bproduct",
        [services::PRODUCT_SERVICE, services::ORDER_SERVICE],
    ),
];

const TEST_TYPES: &[(&str, TestType)] = &[
    (r"unit", TestType::UnitTest),
    (r"integration", TestType::IntegrationTest),
    (r"api", TestType::ApiTest),
    (r"performance|load|stress|benchmark", TestType::PerformanceTest),
    (r"security|penetration|vulnerabilit", TestType::SecurityTest),
    (r"chaos|resilien|failure|fault[\s-]*injection", TestType::ChaosTest),
    (r"contract|pact\b|agreement", TestType::ContractTest),
    (r"e2e|end[\s-]*to[\s-]*end", TestType::EndToEndTest),
    (r"smoke|basic|quick", TestType::SmokeTest),
    (r"regression", TestType::RegressionTest),
    (r"exploratory|ad[\s-]?hoc|manual", TestType::ExploratoryTest),
    (r"accessibility|a11y|wcag", TestType::AccessibilityTest),
    (
        r"compatibility|cross[\s-]?platform|browser",
        TestType::CompatibilityTest,
    ),
    (
        r"locali[sz]ation|i18n|internationali[sz]ation",
        TestType::LocalizationTest,
    ),
];

const TEST_TYPE_PAIRS: &[(&str, [TestType; 2])] = &[
    (
        r"unit.*\bintegration|integration.*\bunit",
        [TestType::UnitTest, TestType::IntegrationTest],
    ),
    (
        r"api.*\bperformance|performance.*\bapi",
        [TestType::ApiTest, TestType::PerformanceTest],
    ),
];

const TEST_TYPE_INFERENCE: &[(&str, &[TestType])] = &[
    (
        r"user|auth|login",
        &[TestType::UnitTest, TestType::SecurityTest],
    ),
    (
        r"order|payment|transaction",
        &[TestType::IntegrationTest, TestType::ApiTest],
    ),
    (r"performance|load|stress", &[TestType::PerformanceTest]),
    (r"chaos|failure|resilien", &[TestType::ChaosTest]),
];

const PRIORITY_PARAM: &[(&str, &str)] = &[
    (r"high\s+priority|urgent|critical", "HIGH"),
    (r"low\s+priority|background", "LOW"),
];

const SCOPE_PARAM: &[(&str, &str)] = &[
    (r"full|complete|comprehensive", "FULL"),
    (r"partial|limited|subset", "PARTIAL"),
];

const ENVIRONMENT_PARAM: &[(&str, &str)] = &[
    (r"production|prod\b", "PRODUCTION"),
    (r"staging|stage\b", "STAGING"),
    (r"development|dev\b", "DEVELOPMENT"),
];

const INTENSITY: &[(&str, &str)] = &[
    (r"low|minimal|light", "LOW"),
    (r"high|maximum|heavy|intense\b", "HIGH"),
];

const URGENCY: &[(&str, Urgency)] = &[
    (r"urgent|asap\b|immediate|now\b", Urgency::High),
    (r"when\s+possible|eventually|later\b", Urgency::Low),
];

const CONTEXT_SCOPE: &[(&str, ContextScope)] = &[
    (r"all\b|every(?:thing)?\b|entire|complete", ContextScope::Comprehensive),
    (r"specific|particular|targeted", ContextScope::Targeted),
];

const CONTEXT_PRIORITY: &[(&str, ContextPriority)] = &[
    (r"high\s+priority|critical|important", ContextPriority::High),
    (r"low\s+priority|background|optional", ContextPriority::Low),
];

const TIMING: &[(&str, Timing)] = &[(
    r"schedul|later\b|tomorrow|next\s+week",
    Timing::Scheduled,
)];

const CONSTRAINTS: &[(&str, Constraint)] = &[
    (r"(?:no|zero)\s+downtime", Constraint::NoDowntime),
    (r"(?:minimal|low)\s+impact", Constraint::MinimalImpact),
    (r"safe\s+mode|safety\s+first", Constraint::SafeMode),
];

const EXECUTION_MODE: &[(&str, ExecutionMode)] = &[
    (r"dry[\s-]?run|simulation|test\s+mode", ExecutionMode::DryRun),
    (r"production|live\b", ExecutionMode::Production),
];

fn keywords(alternatives: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(r"(?i)\b(?:{alternatives})"))
}

/// Ordered list of `pattern -> value` rules.
#[derive(Debug)]
pub struct Classifier<T> {
    rules: Vec<(Regex, T)>,
}

impl<T: Copy> Classifier<T> {
    fn compile(table: &[(&str, T)]) -> Result<Self, regex::Error> {
        let rules = table
            .iter()
            .map(|(pattern, value)| Ok((keywords(pattern)?, *value)))
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self { rules })
    }

    /// Value of the first matching rule.
    #[must_use]
    pub fn first(&self, text: &str) -> Option<T> {
        self.rules
            .iter()
            .find(|(pattern, _)| pattern.is_match(text))
            .map(|(_, value)| *value)
    }

    /// Values of every matching rule, in table order.
    pub fn all<'a>(&'a self, text: &'a str) -> impl Iterator<Item = T> + 'a {
        self.rules
            .iter()
            .filter(move |(pattern, _)| pattern.is_match(text))
            .map(|(_, value)| *value)
    }
}

/// Compiled keyword tables.
#[derive(Debug)]
pub struct Lexicon {
    /// Intent rules (all matches).
    pub intents: Classifier<Intent>,
    /// Service aliases (all matches).
    pub services: Classifier<&'static str>,
    /// "All services" shortcut.
    pub all_services: Regex,
    /// Pairwise service heuristics.
    pub service_pairs: Classifier<[&'static str; 2]>,
    /// Test-type synonyms (all matches).
    pub test_types: Classifier<TestType>,
    /// Pairwise test-type heuristics.
    pub test_type_pairs: Classifier<[TestType; 2]>,
    /// Fallback inference from domain words.
    pub test_type_inference: Classifier<&'static [TestType]>,
    /// Presence of a timeout request.
    pub timeout_trigger: Regex,
    /// Numeric timeout with unit.
    pub timeout_value: Regex,
    /// Presence of a retry request.
    pub retry_trigger: Regex,
    /// Numeric retry count.
    pub retry_value: Regex,
    /// Parallel execution request.
    pub parallel: Regex,
    /// Priority parameter (first match, default `NORMAL`).
    pub priority: Classifier<&'static str>,
    /// Scope parameter (first match, default `DEFAULT`).
    pub scope: Classifier<&'static str>,
    /// Environment parameter (first match, default `DEFAULT`).
    pub environment: Classifier<&'static str>,
    /// Presence of a chaos intensity request.
    pub chaos_level_trigger: Regex,
    /// Presence of a load intensity request.
    pub load_level_trigger: Regex,
    /// Intensity words (first match, default `MEDIUM`).
    pub intensity: Classifier<&'static str>,
    /// Urgency words.
    pub urgency: Classifier<Urgency>,
    /// Context scope words.
    pub context_scope: Classifier<ContextScope>,
    /// Context priority words.
    pub context_priority: Classifier<ContextPriority>,
    /// Timing words.
    pub timing: Classifier<Timing>,
    /// Constraint phrases (all matches).
    pub constraints: Classifier<Constraint>,
    /// Execution mode words.
    pub execution_mode: Classifier<ExecutionMode>,
}

static SHARED: OnceCell<Lexicon> = OnceCell::new();

impl Lexicon {
    /// Compiles every table.
    pub fn compile() -> Result<Self, ParseError> {
        Ok(Self {
            intents: Classifier::compile(INTENTS)?,
            services: Classifier::compile(SERVICES)?,
            all_services: keywords(ALL_SERVICES)?,
            service_pairs: Classifier::compile(SERVICE_PAIRS)?,
            test_types: Classifier::compile(TEST_TYPES)?,
            test_type_pairs: Classifier::compile(TEST_TYPE_PAIRS)?,
            test_type_inference: Classifier::compile(TEST_TYPE_INFERENCE)?,
            timeout_trigger: keywords(r"timeout|time\s+limit")?,
            timeout_value: Regex::new(
                r"(?i)(\d+)\s*(hours?|hrs?|minutes?|mins?|seconds?|secs?)\b",
            )?,
            retry_trigger: keywords(r"retry|retries")?,
            retry_value: Regex::new(r"(?i)(\d+)\s*retr(?:y|ies)\b|\bretry\s*(\d+)\s*times?\b")?,
            parallel: keywords(r"parallel|concurrent|simultaneous")?,
            priority: Classifier::compile(PRIORITY_PARAM)?,
            scope: Classifier::compile(SCOPE_PARAM)?,
            environment: Classifier::compile(ENVIRONMENT_PARAM)?,
            chaos_level_trigger: keywords(r"chaos.*\b(?:level|intensity)")?,
            load_level_trigger: keywords(r"load.*\b(?:level|intensity)")?,
            intensity: Classifier::compile(INTENSITY)?,
            urgency: Classifier::compile(URGENCY)?,
            context_scope: Classifier::compile(CONTEXT_SCOPE)?,
            context_priority: Classifier::compile(CONTEXT_PRIORITY)?,
            timing: Classifier::compile(TIMING)?,
            constraints: Classifier::compile(CONSTRAINTS)?,
            execution_mode: Classifier::compile(EXECUTION_MODE)?,
        })
    }

    /// Process-wide compiled tables.
    pub fn shared() -> Result<&'static Self, ParseError> {
        SHARED.get_or_try_init(Self::compile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_compile() {
        assert!(Lexicon::compile().is_ok());
        assert!(Lexicon::shared().is_ok());
    }

    #[test]
    fn matching_is_word_anchored() {
        let lexicon = Lexicon::shared().unwrap();
        assert_eq!(lexicon.test_types.first("rapid smoke"), Some(TestType::SmokeTest));
        assert_eq!(lexicon.test_types.first("API checks"), Some(TestType::ApiTest));
        assert_eq!(lexicon.environment.first("product service"), None);
        assert_eq!(lexicon.environment.first("deploy to prod"), Some("PRODUCTION"));
        assert_eq!(
            lexicon.services.all("users and orders").collect::<Vec<_>>(),
            vec![services::USER_SERVICE, services::ORDER_SERVICE]
        );
    }

    #[test]
    fn intents_collect_every_match_in_table_order() {
        let lexicon = Lexicon::shared().unwrap();
        let found: Vec<_> = lexicon.intents.all("check status and help").collect();
        assert_eq!(
            found,
            vec![Intent::HealthCheck, Intent::GetStatus, Intent::Help]
        );
    }
}
