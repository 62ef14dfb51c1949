//! Route table.
//!
//! Flattens loaded descriptions into one route per (URI template, method,
//! example). Routes are consulted in registration order, so when several
//! examples describe the same endpoint the first one is served.

use crate::error::LoadError;
use crate::matcher::{MatchContext, UriTemplate};
use crate::model::{parse_status, Blueprint, Resource, ResponseVariant, FALLBACK_STATUS};
use crate::resolver::ExampleResponses;
use axum::http::Method;
use std::sync::Arc;
use tracing::{debug, warn};

/// Load-time options for building the table.
#[derive(Debug, Clone, Copy, Default)]
pub struct RouteOptions {
    /// Generate an `OPTIONS` preflight route per template.
    pub cors: bool,
    /// Reject response names that are not status codes instead of falling back.
    pub strict_status: bool,
}

/// One registered endpoint.
#[derive(Debug, Clone)]
pub struct Route {
    pub template: UriTemplate,
    pub method: Method,
    pub responses: Arc<ExampleResponses>,
}

/// Outcome of looking up a request.
#[derive(Debug)]
pub enum Lookup<'a> {
    Found {
        route: &'a Route,
        context: MatchContext,
    },
    /// CORS preflight for a described template.
    Preflight,
    /// The path is described, the method is not.
    MethodNotAllowed { allowed: Vec<Method> },
    NotFound,
}

#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
    preflights: Vec<UriTemplate>,
}

impl RouteTable {
    pub fn build<'a>(
        blueprints: impl IntoIterator<Item = &'a Blueprint>,
        options: RouteOptions,
    ) -> Result<Self, LoadError> {
        let mut table = Self::default();

        for blueprint in blueprints {
            for resource in blueprint.resources() {
                table.add_resource(resource, options)?;
            }
        }

        Ok(table)
    }

    fn add_resource(&mut self, resource: &Resource, options: RouteOptions) -> Result<(), LoadError> {
        let uri_template = resource.uri_template.as_str();

        for action in &resource.actions {
            let method = Method::from_bytes(action.method.trim().as_bytes()).map_err(|_| {
                LoadError::InvalidMethod {
                    uri_template: uri_template.to_string(),
                    method: action.method.clone(),
                }
            })?;

            for example in &action.examples {
                let mut variants = Vec::with_capacity(example.responses.len());
                for payload in &example.responses {
                    let status = match parse_status(&payload.name) {
                        Some(status) => status,
                        None if options.strict_status => {
                            return Err(LoadError::InvalidStatus {
                                uri_template: uri_template.to_string(),
                                method: method.to_string(),
                                name: payload.name.clone(),
                            });
                        }
                        None => {
                            warn!(
                                uri_template = %uri_template,
                                method = %method,
                                name = %payload.name,
                                fallback = FALLBACK_STATUS,
                                "Response name is not an HTTP status code, using fallback"
                            );
                            FALLBACK_STATUS
                        }
                    };
                    variants.push(ResponseVariant::new(payload, status));
                }

                let Some(responses) = ExampleResponses::new(variants, resource.model.body.clone())
                else {
                    warn!(
                        uri_template = %uri_template,
                        method = %method,
                        example = %example.name,
                        "Example has no responses, skipping"
                    );
                    continue;
                };

                if self
                    .routes
                    .iter()
                    .any(|r| r.method == method && r.template.as_str() == uri_template)
                {
                    warn!(
                        uri_template = %uri_template,
                        method = %method,
                        example = %example.name,
                        "Endpoint already registered, this example is shadowed"
                    );
                }

                debug!(
                    uri_template = %uri_template,
                    method = %method,
                    variants = responses.variants().len(),
                    "Registered route"
                );
                self.routes.push(Route {
                    template: UriTemplate::parse(uri_template),
                    method: method.clone(),
                    responses: Arc::new(responses),
                });

                if options.cors && !self.preflights.iter().any(|t| t.as_str() == uri_template) {
                    self.preflights.push(UriTemplate::parse(uri_template));
                }
            }
        }

        Ok(())
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Find what should answer `method path`.
    pub fn lookup(&self, method: &Method, path: &str) -> Lookup<'_> {
        let mut allowed = Vec::new();

        for route in &self.routes {
            if let Some(context) = route.template.matches(path) {
                if route.method == *method {
                    return Lookup::Found { route, context };
                }
                if !allowed.contains(&route.method) {
                    allowed.push(route.method.clone());
                }
            }
        }

        if self.preflights.iter().any(|t| t.matches(path).is_some()) {
            if *method == Method::OPTIONS {
                return Lookup::Preflight;
            }
            allowed.push(Method::OPTIONS);
        }

        if allowed.is_empty() {
            Lookup::NotFound
        } else {
            Lookup::MethodNotAllowed { allowed }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Action, Example, Payload, ResourceGroup};

    fn response(name: &str, body: &str) -> Payload {
        Payload {
            name: name.to_string(),
            body: body.to_string(),
            ..Default::default()
        }
    }

    fn action(method: &str, examples: Vec<Vec<Payload>>) -> Action {
        Action {
            method: method.to_string(),
            examples: examples
                .into_iter()
                .map(|responses| Example {
                    responses,
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    fn blueprint(uri_template: &str, actions: Vec<Action>) -> Blueprint {
        Blueprint {
            resource_groups: vec![ResourceGroup {
                resources: vec![Resource {
                    uri_template: uri_template.to_string(),
                    actions,
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn cors() -> RouteOptions {
        RouteOptions {
            cors: true,
            strict_status: false,
        }
    }

    #[test]
    fn test_one_route_per_method() {
        let bp = blueprint(
            "/widgets",
            vec![
                action("GET", vec![vec![response("200", "[]")]]),
                action("POST", vec![vec![response("201", "{}")]]),
            ],
        );
        let table = RouteTable::build([&bp], cors()).unwrap();
        assert_eq!(table.len(), 2);

        match table.lookup(&Method::POST, "/widgets") {
            Lookup::Found { route, .. } => assert_eq!(route.responses.happy_path().status, 201),
            other => panic!("expected route, got {:?}", other),
        }
    }

    #[test]
    fn test_first_example_wins() {
        let bp = blueprint(
            "/widgets",
            vec![action(
                "GET",
                vec![vec![response("200", "first")], vec![response("200", "second")]],
            )],
        );
        let table = RouteTable::build([&bp], cors()).unwrap();
        assert_eq!(table.len(), 2);

        match table.lookup(&Method::GET, "/widgets") {
            Lookup::Found { route, .. } => assert_eq!(route.responses.happy_path().body, "first"),
            other => panic!("expected route, got {:?}", other),
        }
    }

    #[test]
    fn test_path_params_are_captured() {
        let bp = blueprint(
            "/widgets/{id}{?fields}",
            vec![action("GET", vec![vec![response("200", "{}")]])],
        );
        let table = RouteTable::build([&bp], cors()).unwrap();

        match table.lookup(&Method::GET, "/widgets/42") {
            Lookup::Found { context, .. } => {
                assert_eq!(context.path_params.get("id"), Some(&"42".to_string()))
            }
            other => panic!("expected route, got {:?}", other),
        }
    }

    #[test]
    fn test_preflight_only_with_cors() {
        let bp = blueprint("/widgets", vec![action("GET", vec![vec![response("200", "")]])]);

        let table = RouteTable::build([&bp], cors()).unwrap();
        assert!(matches!(table.lookup(&Method::OPTIONS, "/widgets"), Lookup::Preflight));

        let table = RouteTable::build([&bp], RouteOptions::default()).unwrap();
        assert!(matches!(
            table.lookup(&Method::OPTIONS, "/widgets"),
            Lookup::MethodNotAllowed { .. }
        ));
    }

    #[test]
    fn test_described_options_beats_preflight() {
        let bp = blueprint(
            "/widgets",
            vec![action("OPTIONS", vec![vec![response("204", "")]])],
        );
        let table = RouteTable::build([&bp], cors()).unwrap();
        assert!(matches!(
            table.lookup(&Method::OPTIONS, "/widgets"),
            Lookup::Found { .. }
        ));
    }

    #[test]
    fn test_method_not_allowed_lists_methods() {
        let bp = blueprint("/widgets", vec![action("GET", vec![vec![response("200", "")]])]);
        let table = RouteTable::build([&bp], cors()).unwrap();

        match table.lookup(&Method::DELETE, "/widgets") {
            Lookup::MethodNotAllowed { allowed } => {
                assert_eq!(allowed, vec![Method::GET, Method::OPTIONS])
            }
            other => panic!("expected 405, got {:?}", other),
        }
        assert!(matches!(table.lookup(&Method::GET, "/gadgets"), Lookup::NotFound));
    }

    #[test]
    fn test_other_method_on_path_is_not_allowed_rather_than_missing() {
        let bp = blueprint("/ws", vec![action("POST", vec![vec![response("201", "")]])]);
        let table = RouteTable::build([&bp], RouteOptions::default()).unwrap();

        match table.lookup(&Method::GET, "/ws") {
            Lookup::MethodNotAllowed { allowed } => assert_eq!(allowed, vec![Method::POST]),
            other => panic!("expected 405, got {:?}", other),
        }
    }

    #[test]
    fn test_example_without_responses_is_skipped() {
        let bp = blueprint("/widgets", vec![action("GET", vec![vec![]])]);
        let table = RouteTable::build([&bp], cors()).unwrap();
        assert!(table.is_empty());
        assert!(matches!(table.lookup(&Method::GET, "/widgets"), Lookup::NotFound));
    }

    #[test]
    fn test_non_numeric_name_falls_back() {
        let bp = blueprint("/widgets", vec![action("GET", vec![vec![response("OK", "")]])]);
        let table = RouteTable::build([&bp], cors()).unwrap();
        assert_eq!(table.routes()[0].responses.happy_path().status, FALLBACK_STATUS);
    }

    #[test]
    fn test_non_numeric_name_rejected_when_strict() {
        let bp = blueprint("/widgets", vec![action("GET", vec![vec![response("OK", "")]])]);
        let options = RouteOptions {
            cors: true,
            strict_status: true,
        };
        let err = RouteTable::build([&bp], options).unwrap_err();
        assert!(matches!(err, LoadError::InvalidStatus { .. }));
    }

    #[test]
    fn test_invalid_method_is_a_load_error() {
        let bp = blueprint("/widgets", vec![action("", vec![vec![response("200", "")]])]);
        let err = RouteTable::build([&bp], cors()).unwrap_err();
        assert!(matches!(err, LoadError::InvalidMethod { .. }));
    }
}
