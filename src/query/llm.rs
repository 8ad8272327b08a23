use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use ollama_rs::{
    generation::chat::{request::ChatMessageRequest, ChatMessage},
    Ollama,
};
use serde::Deserialize;
use tracing::{error, info, warn};

use super::{Extractor, ParsedQuery, RuleExtractor, Vocabulary};

/// A language model answering one system instruction plus one user prompt.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String>;
}

/// [`ChatModel`] served by a local Ollama instance.
pub struct OllamaModel {
    client: Ollama,
    model: String,
}

impl OllamaModel {
    pub fn new(host: &str, port: u16, model: &str) -> Self {
        Self {
            client: Ollama::new(host.to_string(), port),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl ChatModel for OllamaModel {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        let request = ChatMessageRequest::new(
            self.model.clone(),
            vec![
                ChatMessage::system(system.to_string()),
                ChatMessage::user(prompt.to_string()),
            ],
        );
        let response = self
            .client
            .send_chat_messages(request)
            .await
            .with_context(|| format!("chat request to model {} failed", self.model))?;
        Ok(response.message.content)
    }
}

/// The JSON object the model is asked to produce.
#[derive(Debug, Default, Deserialize)]
struct ModelAnswer {
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    product_category: Option<String>,
    #[serde(default)]
    start_date: Option<String>,
    #[serde(default)]
    end_date: Option<String>,
    #[serde(default)]
    tab: Option<String>,
}

/// Extractor that asks a language model for the filter and re-prompts until
/// every value belongs to the reference lists.
///
/// After `max_attempts` rejected answers, or when the model cannot be
/// reached, the utterance is handed to the wrapped [`RuleExtractor`].
pub struct LlmExtractor<M> {
    model: M,
    fallback: RuleExtractor,
    max_attempts: usize,
}

impl<M: ChatModel> LlmExtractor<M> {
    pub fn new(model: M, fallback: RuleExtractor, max_attempts: usize) -> Self {
        Self {
            model,
            fallback,
            max_attempts,
        }
    }

    /// Accepts the answer or returns the sentence to append to the question.
    fn validate(&self, answer: &ModelAnswer) -> Result<ParsedQuery, String> {
        let vocabulary = self.fallback.vocabulary();

        let countries = match present(answer.country.as_deref()) {
            None => None,
            Some(value) => match vocabulary.canonical_country(value) {
                Some(country) => Some(vec![country.to_string()]),
                None => return Err(format!("{value} is not a valid country. Please try again.")),
            },
        };

        let categories = match present(answer.product_category.as_deref()) {
            None => None,
            Some(value) => match vocabulary.canonical_category(value) {
                Some(category) => Some(vec![category.to_string()]),
                None => {
                    return Err(format!(
                        "{value} is not a valid product category. Please try again. Select between {}",
                        vocabulary.categories().join(", ")
                    ))
                }
            },
        };

        let view = match present(answer.tab.as_deref()) {
            None => None,
            Some(value) => match vocabulary.canonical_view(value) {
                Some(view) => Some(view),
                None => {
                    return Err(format!(
                        "{value} is not a valid tab. Please try again. Select between {}",
                        view_names(vocabulary)
                    ))
                }
            },
        };

        let mut dates = ParsedQuery::unrestricted(self.fallback.window());
        let start = present(answer.start_date.as_deref()).and_then(day);
        let end = present(answer.end_date.as_deref()).and_then(day);
        match (start, end) {
            (None, None) => {}
            (None, Some(end)) => dates.end_date = Some(end),
            (Some(start), end) => {
                dates.start_date = start;
                dates.end_date = end;
            }
        }

        Ok(ParsedQuery {
            countries,
            categories,
            view,
            ..dates
        })
    }
}

#[async_trait]
impl<M: ChatModel> Extractor for LlmExtractor<M> {
    async fn extract(&self, utterance: &str) -> ParsedQuery {
        let system = instruction(self.fallback.vocabulary());
        let mut question = utterance.to_string();

        for attempt in 1..=self.max_attempts {
            let raw = match self.model.complete(&system, &question).await {
                Ok(raw) => raw,
                Err(e) => {
                    error!("Problem while querying the language model. {e:#}");
                    break;
                }
            };
            let answer = match parse_answer(&raw) {
                Ok(answer) => answer,
                Err(e) => {
                    warn!(attempt, "Unusable model answer: {e:#}");
                    question.push_str(" Respond with a single JSON object only.");
                    continue;
                }
            };
            match self.validate(&answer) {
                Ok(query) => {
                    info!(attempt, "Model answer accepted");
                    return query;
                }
                Err(correction) => {
                    warn!(attempt, "Model answer rejected: {correction}");
                    question.push(' ');
                    question.push_str(&correction);
                }
            }
        }

        warn!("Falling back to rule-based extraction");
        self.fallback.parse(utterance)
    }
}

fn instruction(vocabulary: &Vocabulary) -> String {
    format!(
        "You translate questions about a sales dashboard into dashboard filters.\n\n\
        Respond ONLY with a JSON object with these keys:\n\
        - \"country\": one of the countries listed below, or null.\n\
        - \"product_category\": one of the categories listed below, or null.\n\
        - \"start_date\": start date in YYYY-MM-DD format, or null.\n\
        - \"end_date\": end date in YYYY-MM-DD format, or null.\n\
        - \"tab\": one of the tabs listed below, or null.\n\n\
        Use null for anything the question does not mention. Don't explain the answer.\n\n\
        Countries: {}\n\n\
        Categories: {}\n\n\
        Tabs: {}\n",
        vocabulary.countries().join(", "),
        vocabulary.categories().join(", "),
        view_names(vocabulary),
    )
}

fn view_names(vocabulary: &Vocabulary) -> String {
    let mut names: Vec<&str> = Vec::new();
    for view in vocabulary.views().iter().map(|rule| rule.view.as_str()) {
        if !names.contains(&view) {
            names.push(view);
        }
    }
    names.join(", ")
}

/// Extracts the outermost JSON object, tolerating code fences around it.
fn parse_answer(raw: &str) -> Result<ModelAnswer> {
    let start = raw.find('{').ok_or_else(|| anyhow!("no JSON object in {raw:?}"))?;
    let end = raw.rfind('}').ok_or_else(|| anyhow!("no JSON object in {raw:?}"))?;
    if end < start {
        return Err(anyhow!("no JSON object in {raw:?}"));
    }
    serde_json::from_str(&raw[start..=end]).context("invalid JSON answer")
}

fn present(value: Option<&str>) -> Option<&str> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("null"))
}

fn day(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, sync::Mutex};

    use super::*;
    use crate::query::{DateWindow, View};

    struct Scripted {
        replies: Mutex<VecDeque<Result<String>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn ok(replies: &[&str]) -> Self {
            Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatModel for Scripted {
        async fn complete(&self, _system: &str, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow!("script exhausted")))
        }
    }

    fn extractor(model: Scripted, max_attempts: usize) -> LlmExtractor<Scripted> {
        LlmExtractor::new(model, RuleExtractor::default(), max_attempts)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn valid_answer_is_accepted() {
        let model = Scripted::ok(&[r#"```json
            {"country": "germany", "product_category": "Technology",
             "start_date": "2021-01-01", "end_date": "2021-06-30", "tab": "Sales Overview"}
            ```"#]);
        let llm = extractor(model, 3);
        let query = llm.extract("german tech sales in the first half of 2021").await;
        assert_eq!(query.countries, Some(vec!["Germany".to_string()]));
        assert_eq!(query.categories, Some(vec!["Technology".to_string()]));
        assert_eq!(query.start_date, date(2021, 1, 1));
        assert_eq!(query.end_date, Some(date(2021, 6, 30)));
        assert_eq!(query.view, Some(View::SalesOverview));
    }

    #[tokio::test]
    async fn nulls_mean_no_restriction() {
        let model = Scripted::ok(&[r#"{"country": null, "product_category": null,
            "start_date": null, "end_date": null, "tab": null}"#]);
        let query = extractor(model, 3).extract("anything").await;
        assert_eq!(query, ParsedQuery::unrestricted(DateWindow::default()));
    }

    #[tokio::test]
    async fn invalid_country_is_corrected_by_reprompt() {
        let model = Scripted::ok(&[
            r#"{"country": "Atlantis"}"#,
            r#"{"country": "Spain", "tab": "order analysis"}"#,
        ]);
        let llm = extractor(model, 3);
        let query = llm.extract("orders in atlantis").await;
        assert_eq!(query.countries, Some(vec!["Spain".to_string()]));
        assert_eq!(query.view, Some(View::OrderAnalysis));

        let prompts = llm.model.prompts();
        assert_eq!(prompts.len(), 2);
        assert_eq!(
            prompts[1],
            "orders in atlantis Atlantis is not a valid country. Please try again."
        );
    }

    #[tokio::test]
    async fn invalid_category_and_tab_list_the_choices() {
        let model = Scripted::ok(&[
            r#"{"product_category": "Toys"}"#,
            r#"{"tab": "Inventory"}"#,
            r#"{"tab": "Regional Analysis"}"#,
        ]);
        let llm = extractor(model, 3);
        let query = llm.extract("toys").await;
        assert_eq!(query.view, Some(View::RegionalAnalysis));

        let prompts = llm.model.prompts();
        assert!(prompts[1].ends_with(
            "Toys is not a valid product category. Please try again. \
             Select between Furniture, Technology, Office Supplies"
        ));
        assert!(prompts[2].contains("Inventory is not a valid tab."));
        assert!(prompts[2].contains("Sales Overview, Product Performance"));
    }

    #[tokio::test]
    async fn start_without_end_is_open_ended() {
        let model = Scripted::ok(&[r#"{"start_date": "2022-03-01"}"#]);
        let query = extractor(model, 1).extract("since march 2022").await;
        assert_eq!(query.start_date, date(2022, 3, 1));
        assert_eq!(query.end_date, None);
    }

    #[tokio::test]
    async fn end_without_start_uses_default_start() {
        let model = Scripted::ok(&[r#"{"start_date": null, "end_date": "2021-06-30"}"#]);
        let query = extractor(model, 1).extract("everything until july 2021").await;
        assert_eq!(query.start_date, DateWindow::default().start);
        assert_eq!(query.end_date, Some(date(2021, 6, 30)));
        assert!(query.countries.is_none());
    }

    #[tokio::test]
    async fn non_json_answer_is_retried() {
        let model = Scripted::ok(&["I think you mean France.", r#"{"country": "France"}"#]);
        let llm = extractor(model, 2);
        let query = llm.extract("french sales").await;
        assert_eq!(query.countries, Some(vec!["France".to_string()]));
        assert!(llm.model.prompts()[1].ends_with("Respond with a single JSON object only."));
    }

    #[tokio::test]
    async fn exhausted_attempts_fall_back_to_rules() {
        let model = Scripted::ok(&[r#"{"country": "Atlantis"}"#, r#"{"country": "Narnia"}"#]);
        let llm = extractor(model, 2);
        let query = llm.extract("Show me 2020-2022 sales in Japan").await;
        assert_eq!(query.countries, Some(vec!["Japan".to_string()]));
        assert_eq!(query.start_date, date(2020, 1, 1));
        assert_eq!(query.end_date, Some(date(2022, 12, 31)));
        assert_eq!(llm.model.prompts().len(), 2);
    }

    #[tokio::test]
    async fn transport_error_falls_back_immediately() {
        let model = Scripted::new(vec![Err(anyhow!("connection refused"))]);
        let llm = extractor(model, 3);
        let query = llm.extract("customer insights").await;
        assert_eq!(query.view, Some(View::CustomerInsights));
        assert_eq!(llm.model.prompts().len(), 1);
    }

    #[test]
    fn instruction_lists_reference_values() {
        let text = instruction(&Vocabulary::default());
        assert!(text.contains("Guinea-Bissau"));
        assert!(text.contains("Office Supplies"));
        assert!(text.contains("Order Analysis"));
    }
}
