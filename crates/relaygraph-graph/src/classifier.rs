//! Ordered keyword classification.
//!
//! Rules are evaluated in declaration order and the first rule with a
//! matching keyword wins, even if later rules would also match. Reordering
//! rules changes behavior.

use relaygraph_core::State;
use tracing::debug;

use crate::router::{Route, Router};

/// One classification rule: any of `keywords` selects `label`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordRule {
    pub label: String,
    keywords: Vec<String>,
}

impl KeywordRule {
    pub fn new<I, S>(label: impl Into<String>, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            label: label.into(),
            keywords: keywords
                .into_iter()
                .map(|k| k.into().to_lowercase())
                .collect(),
        }
    }

    fn matches(&self, text: &str) -> bool {
        self.keywords.iter().any(|k| text.contains(k.as_str()))
    }
}

/// First-match keyword classifier with a default label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordClassifier {
    rules: Vec<KeywordRule>,
    default_label: String,
}

impl KeywordClassifier {
    pub fn new(default_label: impl Into<String>) -> Self {
        Self {
            rules: Vec::new(),
            default_label: default_label.into(),
        }
    }

    /// Append a rule; it is consulted after every rule added before it.
    pub fn rule<I, S>(mut self, label: impl Into<String>, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rules.push(KeywordRule::new(label, keywords));
        self
    }

    /// Label of the first matching rule, or the default label.
    /// Matching is a case-insensitive substring test.
    pub fn classify(&self, text: &str) -> &str {
        let text = text.to_lowercase();
        for rule in &self.rules {
            if rule.matches(&text) {
                debug!(label = %rule.label, "Keyword rule matched");
                return &rule.label;
            }
        }
        &self.default_label
    }

    pub fn default_label(&self) -> &str {
        &self.default_label
    }

    /// Every label this classifier can return, in rule order, default last.
    pub fn labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = Vec::new();
        for label in self
            .rules
            .iter()
            .map(|r| &r.label)
            .chain(std::iter::once(&self.default_label))
        {
            if !labels.contains(label) {
                labels.push(label.clone());
            }
        }
        labels
    }
}

/// Router that classifies the latest user message.
#[derive(Debug, Clone)]
pub struct ClassifierRouter {
    classifier: KeywordClassifier,
}

impl ClassifierRouter {
    pub fn new(classifier: KeywordClassifier) -> Self {
        Self { classifier }
    }
}

impl Router for ClassifierRouter {
    fn labels(&self) -> Vec<String> {
        self.classifier.labels()
    }

    fn route(&self, state: &State) -> Route {
        Route::label(self.classifier.classify(state.latest_user_text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaygraph_core::Message;
    use rstest::rstest;

    fn refund_first() -> KeywordClassifier {
        KeywordClassifier::new("general")
            .rule("payment", ["환불"])
            .rule("tech", ["오류"])
    }

    #[test]
    fn test_first_match_wins() {
        let classifier = refund_first();
        assert_eq!(
            classifier.classify("환불 요청인데 결제 페이지에서 오류가 납니다"),
            "payment"
        );
    }

    #[test]
    fn test_order_is_significant() {
        let reordered = KeywordClassifier::new("general")
            .rule("tech", ["오류"])
            .rule("payment", ["환불"]);
        assert_eq!(reordered.classify("환불 중 오류"), "tech");
    }

    #[rstest]
    #[case("앱 설치 오류", "tech")]
    #[case("안녕하세요, 문의할 것이 있습니다.", "general")]
    #[case("", "general")]
    fn test_classify(#[case] text: &str, #[case] expected: &str) {
        assert_eq!(refund_first().classify(text), expected);
    }

    #[test]
    fn test_case_insensitive() {
        let classifier = KeywordClassifier::new("other").rule("weather", ["Weather"]);
        assert_eq!(classifier.classify("what's the WEATHER like"), "weather");
    }

    #[test]
    fn test_labels_deduplicated() {
        let classifier = KeywordClassifier::new("general")
            .rule("payment", ["환불"])
            .rule("payment", ["결제"])
            .rule("general", ["안녕"]);
        assert_eq!(classifier.labels(), vec!["payment", "general"]);
    }

    #[test]
    fn test_classifier_router_reads_latest_user_message() {
        let router = ClassifierRouter::new(refund_first());
        let state = State::from_message(Message::user("오류가 나요"))
            .with_message(Message::assistant("환불 안내"));
        assert_eq!(router.route(&state), Route::label("tech"));
    }
}
