use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{
    dates::DateScanner, DateWindow, Extractor, OverlapPolicy, ParsedQuery, Vocabulary,
};

/// Deterministic extractor built on pattern matching and reference lists.
///
/// Dates, countries, categories and the view are extracted by independent
/// passes over the raw utterance; one pass finding nothing never affects the
/// others.
pub struct RuleExtractor {
    vocabulary: Arc<Vocabulary>,
    window: DateWindow,
    overlap: OverlapPolicy,
    scanner: DateScanner,
}

impl RuleExtractor {
    pub fn new(vocabulary: Arc<Vocabulary>, window: DateWindow, overlap: OverlapPolicy) -> Self {
        Self {
            vocabulary,
            window,
            overlap,
            scanner: DateScanner::new(),
        }
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn window(&self) -> DateWindow {
        self.window
    }

    pub fn parse(&self, utterance: &str) -> ParsedQuery {
        debug!("Received user_input = {utterance:?}");
        let lowered = utterance.to_lowercase();

        let (start_date, end_date) = self.scanner.scan(utterance).resolve(self.window);
        let query = ParsedQuery {
            countries: self.vocabulary.match_countries(&lowered, self.overlap),
            categories: self.vocabulary.match_categories(&lowered, self.overlap),
            start_date,
            end_date,
            view: self.vocabulary.match_view(&lowered),
        };

        debug!("Final parsed query => {query:?}");
        query
    }
}

impl Default for RuleExtractor {
    fn default() -> Self {
        Self::new(
            Arc::new(Vocabulary::default()),
            DateWindow::default(),
            OverlapPolicy::default(),
        )
    }
}

#[async_trait]
impl Extractor for RuleExtractor {
    async fn extract(&self, utterance: &str) -> ParsedQuery {
        self.parse(utterance)
    }
}
