use std::collections::HashMap;

use serde::Deserialize;
use url::Url;

use crate::error::RuleError;
use crate::rule::RuleEvaluator;
use crate::source::BookSource;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Method {
    #[default]
    Get,
    Post,
}

/// Fully resolved description of one fetch. Transient: built, handed to
/// a fetch capability, dropped.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    /// Always absolute by the time a fetch capability sees it.
    pub url: Url,
    pub method: Method,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
    pub page: u32,
    /// Whether this request must go through the rendered-page fetcher.
    pub use_rendered: bool,
}

/// Trailing option object of a rule URL: everything after the first
/// `,{` is a JSON object refining the request.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UrlOptions {
    method: Option<String>,
    body: Option<String>,
    headers: HashMap<String, String>,
    #[serde(rename = "webView")]
    web_view: bool,
}

impl RequestDescriptor {
    /// Build a descriptor from a templated rule URL.
    ///
    /// Interpolates `{{key}}` (form-URL-encoded) and `{{page}}`, parses
    /// the optional trailing option object, resolves against `base_url`
    /// when relative, and evaluates the source's header rule. Pure
    /// transformation; a malformed template means the caller must not
    /// proceed to fetch.
    pub fn build(
        template: &str,
        page: u32,
        key: Option<&str>,
        base_url: &str,
        source: &BookSource,
        evaluator: &dyn RuleEvaluator,
    ) -> Result<Self, RuleError> {
        let (url_part, options) = split_options(template)?;
        let url_part = interpolate(url_part.trim(), page, key);
        let url = join_url(base_url, &url_part)?;

        let mut headers = build_headers(source.header_rule.as_deref(), evaluator, &source.source_url);
        for (name, value) in options.headers {
            headers.insert(name, value);
        }

        let method = match options.method.as_deref() {
            Some(raw) if raw.eq_ignore_ascii_case("post") => Method::Post,
            _ => Method::Get,
        };
        let body = options.body.map(|body| interpolate(&body, page, key));

        Ok(Self {
            url,
            method,
            headers,
            body,
            page,
            use_rendered: options.web_view || source.rendered,
        })
    }
}

fn split_options(template: &str) -> Result<(&str, UrlOptions), RuleError> {
    let Some(idx) = template.find(",{") else {
        return Ok((template, UrlOptions::default()));
    };
    let options = serde_json::from_str(&template[idx + 1..])
        .map_err(|err| RuleError(format!("invalid url options in {template:?}: {err}")))?;
    Ok((&template[..idx], options))
}

fn interpolate(input: &str, page: u32, key: Option<&str>) -> String {
    let mut out = input.replace("{{page}}", &page.to_string());
    if let Some(key) = key {
        let encoded: String = url::form_urlencoded::byte_serialize(key.as_bytes()).collect();
        out = out.replace("{{key}}", &encoded);
    }
    out
}

/// Resolve `target` to an absolute URL, joining against `base` when
/// relative.
pub fn join_url(base: &str, target: &str) -> Result<Url, RuleError> {
    if let Ok(url) = Url::parse(target) {
        return Ok(url);
    }
    let base =
        Url::parse(base).map_err(|err| RuleError(format!("invalid base url {base:?}: {err}")))?;
    base.join(target)
        .map_err(|err| RuleError(format!("cannot resolve {target:?} against {base}: {err}")))
}

/// Resolve an extracted href against the page's effective base,
/// yielding `None` instead of an error for unusable values.
pub(crate) fn resolve_href(base: &str, target: &str) -> Option<String> {
    let target = target.trim();
    if target.is_empty() {
        return None;
    }
    match join_url(base, target) {
        Ok(url) => Some(url.to_string()),
        Err(err) => {
            tracing::debug!(%base, %target, %err, "dropping unresolvable href");
            None
        }
    }
}

fn normalize_url(url: &Url) -> Url {
    let mut normalized = url.clone();
    normalized.set_fragment(None);
    normalized
}

/// Canonical form used as the dedup key for pagination cycle guards:
/// fragment stripped, trailing slashes trimmed.
pub(crate) fn canonical_url(url: &Url) -> Url {
    let mut canonical = normalize_url(url);
    let mut path = canonical.path().to_owned();
    while path.len() > 1 && path.ends_with('/') {
        path.pop();
    }
    canonical.set_path(&path);
    canonical
}

/// Cycle-guard key for an already-absolute URL string. Unparsable input
/// falls back to the raw string so the guard still terminates.
pub(crate) fn cycle_key(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => canonical_url(&parsed).to_string(),
        Err(_) => url.trim().to_owned(),
    }
}

/// Evaluate the source's header-generation rule.
///
/// The rule is either an inline JSON map or an evaluator expression
/// yielding one. Any failure degrades to empty headers; a broken header
/// rule must not sink the whole operation.
pub(crate) fn build_headers(
    rule: Option<&str>,
    evaluator: &dyn RuleEvaluator,
    context: &str,
) -> HashMap<String, String> {
    let Some(rule) = rule.map(str::trim).filter(|r| !r.is_empty()) else {
        return HashMap::new();
    };

    let raw = if rule.starts_with('{') {
        Some(rule.to_owned())
    } else {
        match evaluator.eval_text(rule, context) {
            Ok(value) => value,
            Err(err) => {
                tracing::debug!(%err, "header rule evaluation failed; using empty headers");
                return HashMap::new();
            }
        }
    };
    let Some(raw) = raw else {
        return HashMap::new();
    };

    match serde_json::from_str(&raw) {
        Ok(headers) => headers,
        Err(err) => {
            tracing::debug!(%err, "header rule produced invalid json; using empty headers");
            HashMap::new()
        }
    }
}
