//! Response selection.
//!
//! Decides which example response a request receives: the first declared
//! variant by default, or whichever variant the control client names when
//! interactive selection is enabled.

use crate::model::{Header, ResponseVariant};
use crate::session::{Arbiter, Question};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// The possible responses of one example, plus the resource model they may reference.
#[derive(Debug, Clone)]
pub struct ExampleResponses {
    /// Never empty; the first entry is the happy path.
    variants: Vec<ResponseVariant>,
    model_body: String,
}

impl ExampleResponses {
    /// Returns `None` when there is nothing to serve.
    pub fn new(variants: Vec<ResponseVariant>, model_body: impl Into<String>) -> Option<Self> {
        if variants.is_empty() {
            return None;
        }
        Some(Self {
            variants,
            model_body: model_body.into(),
        })
    }

    pub fn variants(&self) -> &[ResponseVariant] {
        &self.variants
    }

    pub fn happy_path(&self) -> &ResponseVariant {
        &self.variants[0]
    }

    pub fn is_interactive(&self) -> bool {
        self.variants.len() > 1
    }

    fn find(&self, name: &str) -> Option<&ResponseVariant> {
        self.variants.iter().find(|v| v.name == name)
    }
}

/// How the served variant was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// The example has a single response.
    Only,
    /// Interactive selection is disabled.
    HappyPath,
    /// The control client named this variant.
    Chosen,
    /// The control client's answer was unusable, late, or missing.
    Default,
}

/// Everything needed to write the HTTP response.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedResponse {
    pub status: u16,
    pub headers: Vec<Header>,
    pub body: String,
    /// Name of the chosen variant.
    pub variant: String,
    pub selection: Selection,
}

pub struct ResponseResolver {
    arbiter: Arc<dyn Arbiter>,
    stick_to_happy_path: bool,
}

impl ResponseResolver {
    pub fn new(arbiter: Arc<dyn Arbiter>, stick_to_happy_path: bool) -> Self {
        Self {
            arbiter,
            stick_to_happy_path,
        }
    }

    pub async fn resolve(
        &self,
        responses: &ExampleResponses,
        method: &str,
        uri: &str,
    ) -> ResolvedResponse {
        let default = responses.happy_path();

        let (reply, selection) = if !responses.is_interactive() {
            (default, Selection::Only)
        } else if self.stick_to_happy_path {
            (default, Selection::HappyPath)
        } else {
            let answers: BTreeMap<String, String> = responses
                .variants()
                .iter()
                .map(|v| (v.name.clone(), v.body.clone()))
                .collect();
            let question = Question::new(method, uri, default.name.clone(), answers);

            let answer = self.arbiter.ask(question).await;
            match answer.text().and_then(|text| responses.find(text)) {
                Some(chosen) => (chosen, Selection::Chosen),
                None => {
                    debug!(uri = %uri, answer = ?answer, "No variant selected, serving default");
                    (default, Selection::Default)
                }
            }
        };

        let body = if reply.uses_resource_model {
            responses.model_body.clone()
        } else {
            reply.body.clone()
        };

        info!(
            method = %method,
            uri = %uri,
            status = reply.status,
            variant = %reply.name,
            selection = ?selection,
            "Serving mock response"
        );
        debug!(uri = %uri, body = %body, "Sending body");

        ResolvedResponse {
            status: reply.status,
            headers: reply.headers.clone(),
            body,
            variant: reply.name.clone(),
            selection,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Payload;
    use crate::session::Answer;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Answers every question with a fixed reply and records what it was asked.
    struct ScriptedArbiter {
        answer: Answer,
        asked: AtomicU32,
        last_question: Mutex<Option<Question>>,
    }

    impl ScriptedArbiter {
        fn new(answer: Answer) -> Arc<Self> {
            Arc::new(Self {
                answer,
                asked: AtomicU32::new(0),
                last_question: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl Arbiter for ScriptedArbiter {
        async fn ask(&self, question: Question) -> Answer {
            self.asked.fetch_add(1, Ordering::SeqCst);
            *self.last_question.lock().unwrap() = Some(question);
            self.answer.clone()
        }
    }

    fn variant(name: &str, body: &str) -> ResponseVariant {
        let payload = Payload {
            name: name.to_string(),
            body: body.to_string(),
            headers: vec![Header {
                name: "Content-Type".to_string(),
                value: "application/json".to_string(),
            }],
            ..Default::default()
        };
        ResponseVariant::new(&payload, name.parse().unwrap_or(200))
    }

    fn two_variants() -> ExampleResponses {
        ExampleResponses::new(
            vec![variant("200", r#"{"ok":true}"#), variant("404", r#"{"err":true}"#)],
            "",
        )
        .unwrap()
    }

    #[test]
    fn test_empty_example_is_rejected() {
        assert!(ExampleResponses::new(vec![], "").is_none());
    }

    #[tokio::test]
    async fn test_single_variant_never_asks() {
        let arbiter = ScriptedArbiter::new(Answer::Text("404".to_string()));
        let resolver = ResponseResolver::new(arbiter.clone(), false);
        let responses = ExampleResponses::new(vec![variant("200", r#"{"ok":true}"#)], "").unwrap();

        let resolved = resolver.resolve(&responses, "GET", "/widgets").await;

        assert_eq!(resolved.status, 200);
        assert_eq!(resolved.body, r#"{"ok":true}"#);
        assert_eq!(resolved.selection, Selection::Only);
        assert_eq!(resolved.headers[0].value, "application/json");
        assert_eq!(arbiter.asked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_happy_path_mode_never_asks() {
        let arbiter = ScriptedArbiter::new(Answer::Text("404".to_string()));
        let resolver = ResponseResolver::new(arbiter.clone(), true);

        let resolved = resolver.resolve(&two_variants(), "GET", "/widgets").await;

        assert_eq!(resolved.status, 200);
        assert_eq!(resolved.selection, Selection::HappyPath);
        assert_eq!(arbiter.asked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_answer_selects_variant() {
        let arbiter = ScriptedArbiter::new(Answer::Text("404".to_string()));
        let resolver = ResponseResolver::new(arbiter.clone(), false);

        let resolved = resolver.resolve(&two_variants(), "GET", "/widgets").await;

        assert_eq!(resolved.status, 404);
        assert_eq!(resolved.body, r#"{"err":true}"#);
        assert_eq!(resolved.variant, "404");
        assert_eq!(resolved.selection, Selection::Chosen);

        let question = arbiter.last_question.lock().unwrap().clone().unwrap();
        assert_eq!(question.uri, "/widgets");
        assert_eq!(question.default, "200");
        assert_eq!(question.answers.len(), 2);
        assert_eq!(question.answers["200"], r#"{"ok":true}"#);
    }

    #[tokio::test]
    async fn test_unknown_answer_serves_default() {
        for answer in [
            Answer::Text("418".to_string()),
            Answer::Text(String::new()),
            Answer::TimedOut,
            Answer::Abandoned,
        ] {
            let resolver = ResponseResolver::new(ScriptedArbiter::new(answer), false);
            let resolved = resolver.resolve(&two_variants(), "GET", "/widgets").await;
            assert_eq!(resolved.status, 200);
            assert_eq!(resolved.body, r#"{"ok":true}"#);
            assert_eq!(resolved.selection, Selection::Default);
        }
    }

    #[tokio::test]
    async fn test_model_reference_uses_resource_model() {
        let arbiter = ScriptedArbiter::new(Answer::TimedOut);
        let resolver = ResponseResolver::new(arbiter, false);
        let responses = ExampleResponses::new(
            vec![variant("200", "[Notes Collection][]")],
            r#"[{"id":1}]"#,
        )
        .unwrap();

        let resolved = resolver.resolve(&responses, "GET", "/notes").await;

        assert_eq!(resolved.body, r#"[{"id":1}]"#);
    }
}
