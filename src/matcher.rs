//! URI template matching.
//!
//! Matches request paths against the RFC 6570 templates used in descriptions,
//! e.g. `/notes/{id}{?limit}`. Query (`{?..}`, `{&..}`) and fragment (`{#..}`)
//! expressions never constrain the path and are dropped when compiling.

use std::collections::HashMap;

/// Path parameters captured while matching.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchContext {
    pub path_params: HashMap<String, String>,
}

/// A compiled URI template.
#[derive(Debug, Clone)]
pub struct UriTemplate {
    source: String,
    segments: Vec<TemplateSegment>,
}

#[derive(Debug, Clone, PartialEq)]
enum TemplateSegment {
    Literal(String),
    /// `{name}`: one or more characters up to the next `/`.
    Param(String),
    /// `{+name}`: may span `/`.
    Reserved(String),
}

impl UriTemplate {
    pub fn parse(template: &str) -> Self {
        let mut segments = Vec::new();
        let mut current = String::new();
        let mut expression = String::new();
        let mut in_expression = false;

        for ch in template.chars() {
            if ch == '{' && !in_expression {
                if !current.is_empty() {
                    segments.push(TemplateSegment::Literal(std::mem::take(&mut current)));
                }
                in_expression = true;
                expression.clear();
            } else if ch == '}' && in_expression {
                segments.extend(compile_expression(&expression));
                in_expression = false;
            } else if in_expression {
                expression.push(ch);
            } else {
                current.push(ch);
            }
        }

        // An unterminated expression is kept as literal text.
        if in_expression {
            current.push('{');
            current.push_str(&expression);
        }
        if !current.is_empty() {
            segments.push(TemplateSegment::Literal(current));
        }

        Self {
            source: template.to_string(),
            segments,
        }
    }

    /// The template as written in the description.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Match a request path (without query string).
    pub fn matches(&self, path: &str) -> Option<MatchContext> {
        let mut params = HashMap::new();
        let mut remaining = path;

        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                TemplateSegment::Literal(lit) => {
                    remaining = remaining.strip_prefix(lit.as_str())?;
                }
                TemplateSegment::Param(name) | TemplateSegment::Reserved(name) => {
                    let reserved = matches!(segment, TemplateSegment::Reserved(_));
                    // A parameter stops at a `/` unless reserved expansion allows it.
                    let limit = if reserved {
                        remaining.len()
                    } else {
                        remaining.find('/').unwrap_or(remaining.len())
                    };

                    let end = match self.segments.get(i + 1) {
                        Some(TemplateSegment::Literal(next)) => {
                            let end = remaining.find(next.as_str())?;
                            if end > limit {
                                return None;
                            }
                            end
                        }
                        _ => limit,
                    };

                    if end == 0 {
                        return None;
                    }

                    params.insert(name.clone(), remaining[..end].to_string());
                    remaining = &remaining[end..];
                }
            }
        }

        // Must consume entire path
        if remaining.is_empty() {
            Some(MatchContext {
                path_params: params,
            })
        } else {
            None
        }
    }
}

/// Compile the inside of a `{...}` expression into path segments.
fn compile_expression(expression: &str) -> Vec<TemplateSegment> {
    let Some(operator) = expression.chars().next() else {
        return Vec::new();
    };
    let (prefix, reserved, names) = match operator {
        '?' | '&' | '#' => return Vec::new(),
        '+' => (None, true, &expression[1..]),
        '.' | '/' | ';' => (Some(operator), false, &expression[1..]),
        _ => (None, false, expression),
    };

    // Strip explode (`*`) and prefix (`:3`) modifiers; the first variable names the capture.
    let name = names
        .split(',')
        .next()
        .unwrap_or_default()
        .trim_end_matches('*');
    let name = name.split(':').next().unwrap_or_default().to_string();
    if name.is_empty() {
        return Vec::new();
    }

    let mut segments = Vec::with_capacity(2);
    // The operator's expansion prefix is literal text in the path.
    match prefix {
        Some(';') => segments.push(TemplateSegment::Literal(format!(";{}=", name))),
        Some(ch) => segments.push(TemplateSegment::Literal(ch.to_string())),
        None => {}
    }
    segments.push(if reserved {
        TemplateSegment::Reserved(name)
    } else {
        TemplateSegment::Param(name)
    });
    segments
}
