//! Endpoint matching
//!
//! The endpoint registry is populated by the startup prologue and is
//! read-only afterwards, so hosts may read it without locking. Between
//! overlapping templates (`/users/:id` vs `/users/new`) the match with
//! more literal segments wins; ties break by registration order.

use droe_core::schema::{EndpointEntry, HttpMethod};

/// A matched endpoint with its bound path parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointMatch<'a> {
    pub index: usize,
    pub entry: &'a EndpointEntry,
    /// `(name, value)` pairs in segment order
    pub params: Vec<(String, String)>,
}

/// Find the endpoint for a request path. Longest-literal-prefix wins.
pub fn match_endpoint<'a>(
    endpoints: &'a [EndpointEntry],
    method: HttpMethod,
    path: &str,
) -> Option<EndpointMatch<'a>> {
    let segments: Vec<&str> = split_segments(path);
    let mut best: Option<(usize, EndpointMatch<'a>)> = None;
    for (index, entry) in endpoints.iter().enumerate() {
        if entry.method != method {
            continue;
        }
        if let Some(params) = bind_segments(&entry.path_template, &segments) {
            let literals = entry.literal_segments();
            let better = match &best {
                Some((best_literals, _)) => literals > *best_literals,
                None => true,
            };
            if better {
                best = Some((
                    literals,
                    EndpointMatch {
                        index,
                        entry,
                        params,
                    },
                ));
            }
        }
    }
    best.map(|(_, matched)| matched)
}

fn split_segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Match a template against request segments, binding `:param` segments.
fn bind_segments(template: &str, segments: &[&str]) -> Option<Vec<(String, String)>> {
    let pattern: Vec<&str> = split_segments(template);
    if pattern.len() != segments.len() {
        return None;
    }
    let mut params = Vec::new();
    for (expected, actual) in pattern.iter().zip(segments) {
        match expected.strip_prefix(':') {
            Some(name) => params.push((name.to_string(), (*actual).to_string())),
            None => {
                if expected != actual {
                    return None;
                }
            }
        }
    }
    Some(params)
}
