use serde::{Deserialize, Serialize};
use tracing::debug;

use super::View;

const COUNTRIES: &[&str] = &[
    "United States", "France", "Germany", "El Salvador", "Guatemala", "Nicaragua",
    "Belgium", "South Africa", "India", "Hong Kong", "Democratic Republic of the Congo",
    "Spain", "Russia", "China", "Niger", "Qatar", "New Zealand", "Mexico", "Malaysia",
    "Poland", "Madagascar", "Iraq", "Cuba", "Colombia", "Saudi Arabia", "Egypt", "Brazil",
    "Iran", "Ukraine", "Japan", "Morocco", "United Kingdom", "Cameroon", "Chile", "Ghana",
    "Trinidad and Tobago", "Canada", "Chad", "Bulgaria", "Bangladesh", "Djibouti",
    "Uruguay", "Singapore", "Italy", "Czech Republic", "Zambia", "Bolivia", "Angola",
    "Australia", "Tanzania", "Norway", "Sierra Leone", "Hungary", "Austria", "Uzbekistan",
    "Romania", "Kyrgyzstan", "Belarus", "Mongolia", "Georgia", "Syria", "Croatia", "Israel",
    "Guinea-Bissau", "Somalia", "Tunisia", "Mali", "Algeria", "Kenya", "Mozambique",
    "Senegal", "Guadeloupe", "Finland", "Taiwan", "Jamaica", "Switzerland", "Azerbaijan",
    "Lesotho", "Afghanistan", "Cote d'Ivoire", "Bahrain", "Benin", "Moldova", "Jordan",
    "Rwanda", "Libya", "Togo", "Nepal", "Estonia", "Albania", "Slovakia", "Sudan",
    "Guinea", "Republic of the Congo", "Liberia", "Eritrea", "Lebanon",
    "Bosnia and Herzegovina", "Barbados", "Martinique", "Namibia", "Cambodia", "Ecuador",
    "Central African Republic", "Paraguay", "Mauritania", "Armenia", "Gabon",
    "Sri Lanka", "Macedonia", "Ethiopia", "Turkey", "Nigeria", "Kazakhstan", "Lithuania",
    "Ireland", "Netherlands", "Pakistan", "South Korea", "Philippines", "Vietnam",
    "Indonesia", "Venezuela", "Panama", "Dominican Republic", "Zimbabwe",
    "Myanmar (Burma)", "Thailand", "Honduras", "United Arab Emirates", "Tajikistan",
];

const CATEGORIES: &[&str] = &["Furniture", "Technology", "Office Supplies"];

const VIEW_TRIGGERS: &[(&str, View)] = &[
    ("sales overview", View::SalesOverview),
    ("product performance", View::ProductPerformance),
    ("customer insights", View::CustomerInsights),
    ("sales forecasting", View::SalesForecasting),
    ("regional analysis", View::RegionalAnalysis),
    ("order analysis", View::OrderAnalysis),
];

/// How matches that sit inside longer matches are treated.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPolicy {
    /// Every term contained in the utterance matches, so "Guinea-Bissau"
    /// also yields "Guinea".
    #[default]
    Allow,
    /// A term is dropped when all of its occurrences lie inside occurrences
    /// of a longer matched term.
    Longest,
}

/// Maps a lowercase trigger phrase to the view it selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewRule {
    pub trigger: String,
    pub view: View,
}

impl ViewRule {
    pub fn new(trigger: &str, view: View) -> Self {
        Self {
            trigger: trigger.to_lowercase(),
            view,
        }
    }
}

/// The reference lists an utterance is matched against.
///
/// Order is part of the contract: matched countries and categories come back
/// in list order, and the first view rule whose trigger occurs wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    countries: Vec<String>,
    categories: Vec<String>,
    views: Vec<ViewRule>,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::new(
            COUNTRIES.iter().map(ToString::to_string).collect(),
            CATEGORIES.iter().map(ToString::to_string).collect(),
            VIEW_TRIGGERS
                .iter()
                .map(|(trigger, view)| ViewRule::new(trigger, *view))
                .collect(),
        )
    }
}

impl Vocabulary {
    pub fn new(countries: Vec<String>, categories: Vec<String>, views: Vec<ViewRule>) -> Self {
        Self {
            countries,
            categories,
            views,
        }
    }

    pub fn countries(&self) -> &[String] {
        &self.countries
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn views(&self) -> &[ViewRule] {
        &self.views
    }

    /// Countries contained in `lowered`, or `None` when there are none.
    pub(super) fn match_countries(&self, lowered: &str, policy: OverlapPolicy) -> Option<Vec<String>> {
        let matched = match_terms(&self.countries, lowered, policy);
        for country in &matched {
            debug!("Matched country => {country}");
        }
        if matched.is_empty() {
            debug!("No country specified. Resetting country filter.");
            None
        } else {
            Some(matched)
        }
    }

    /// Categories contained in `lowered`, or `None` when there are none.
    pub(super) fn match_categories(
        &self,
        lowered: &str,
        policy: OverlapPolicy,
    ) -> Option<Vec<String>> {
        let matched = match_terms(&self.categories, lowered, policy);
        for category in &matched {
            debug!("Matched category => {category}");
        }
        (!matched.is_empty()).then_some(matched)
    }

    pub(super) fn match_view(&self, lowered: &str) -> Option<View> {
        let view = self
            .views
            .iter()
            .find(|rule| lowered.contains(&rule.trigger))
            .map(|rule| rule.view);
        if let Some(view) = view {
            debug!("Matched tab => {view}");
        }
        view
    }

    /// Canonical spelling of `value` among the countries, ignoring case.
    pub(super) fn canonical_country(&self, value: &str) -> Option<&str> {
        canonical(&self.countries, value)
    }

    pub(super) fn canonical_category(&self, value: &str) -> Option<&str> {
        canonical(&self.categories, value)
    }

    pub(super) fn canonical_view(&self, value: &str) -> Option<View> {
        let value = value.trim().to_lowercase();
        self.views
            .iter()
            .find(|rule| rule.trigger == value)
            .map(|rule| rule.view)
    }
}

fn canonical<'a>(terms: &'a [String], value: &str) -> Option<&'a str> {
    let value = value.trim().to_lowercase();
    terms
        .iter()
        .find(|term| term.to_lowercase() == value)
        .map(String::as_str)
}

/// Terms whose lowercase form occurs in `lowered`, in `terms` order.
fn match_terms(terms: &[String], lowered: &str, policy: OverlapPolicy) -> Vec<String> {
    let hits: Vec<(&String, Vec<(usize, usize)>)> = terms
        .iter()
        .filter_map(|term| {
            let needle = term.to_lowercase();
            if needle.is_empty() {
                return None;
            }
            let spans: Vec<_> = lowered
                .match_indices(needle.as_str())
                .map(|(at, found)| (at, at + found.len()))
                .collect();
            (!spans.is_empty()).then_some((term, spans))
        })
        .collect();

    match policy {
        OverlapPolicy::Allow => hits.into_iter().map(|(term, _)| term.clone()).collect(),
        OverlapPolicy::Longest => hits
            .iter()
            .filter(|(term, spans)| {
                let covered = spans.iter().all(|&(start, end)| {
                    hits.iter().any(|(other, other_spans)| {
                        other.len() > term.len()
                            && other_spans
                                .iter()
                                .any(|&(s, e)| s <= start && end <= e)
                    })
                });
                if covered {
                    debug!("Dropped {term}: only occurs inside a longer match");
                }
                !covered
            })
            .map(|(term, _)| (*term).clone())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> Vocabulary {
        Vocabulary::new(
            vec!["Niger".to_string(), "Nigeria".to_string(), "Chad".to_string()],
            vec!["Toys".to_string()],
            vec![
                ViewRule::new("Order Analysis", View::OrderAnalysis),
                ViewRule::new("analysis", View::RegionalAnalysis),
            ],
        )
    }

    #[test]
    fn default_lists_have_expected_sizes() {
        let vocabulary = Vocabulary::default();
        assert_eq!(vocabulary.countries().len(), 131);
        assert_eq!(
            vocabulary.categories(),
            ["Furniture", "Technology", "Office Supplies"]
        );
        assert_eq!(vocabulary.views().len(), 6);
    }

    #[test]
    fn substring_matches_overlap_by_default() {
        let matched = small().match_countries("sales in nigeria", OverlapPolicy::Allow);
        assert_eq!(
            matched,
            Some(vec!["Niger".to_string(), "Nigeria".to_string()])
        );
    }

    #[test]
    fn longest_policy_drops_contained_terms() {
        let vocabulary = small();
        assert_eq!(
            vocabulary.match_countries("sales in nigeria", OverlapPolicy::Longest),
            Some(vec!["Nigeria".to_string()])
        );
        // A standalone occurrence keeps the shorter term.
        assert_eq!(
            vocabulary.match_countries("niger vs nigeria", OverlapPolicy::Longest),
            Some(vec!["Niger".to_string(), "Nigeria".to_string()])
        );
    }

    #[test]
    fn no_match_is_none() {
        let vocabulary = small();
        assert_eq!(vocabulary.match_countries("hello", OverlapPolicy::Allow), None);
        assert_eq!(vocabulary.match_categories("hello", OverlapPolicy::Allow), None);
    }

    #[test]
    fn first_view_rule_wins() {
        let vocabulary = small();
        assert_eq!(
            vocabulary.match_view("the order analysis tab"),
            Some(View::OrderAnalysis)
        );
        assert_eq!(
            vocabulary.match_view("some analysis"),
            Some(View::RegionalAnalysis)
        );
    }

    #[test]
    fn canonical_lookup_ignores_case() {
        let vocabulary = Vocabulary::default();
        assert_eq!(vocabulary.canonical_country(" germany "), Some("Germany"));
        assert_eq!(
            vocabulary.canonical_category("OFFICE SUPPLIES"),
            Some("Office Supplies")
        );
        assert_eq!(
            vocabulary.canonical_view("Sales Forecasting"),
            Some(View::SalesForecasting)
        );
        assert_eq!(vocabulary.canonical_country("Atlantis"), None);
    }
}
