use crate::error::RuleError;

/// External selector-language capability.
///
/// Rule expressions are opaque to the engine: the evaluator owns the
/// micro-language (CSS/XPath/JSON-path style) and is invoked against a
/// document body or one of its list-item sub-documents. An absent or
/// non-matching rule MUST yield `Ok(None)` / an empty list; only a
/// structurally malformed expression is a [`RuleError`].
pub trait RuleEvaluator: Send + Sync {
    /// Evaluate a rule, yielding the first extracted value.
    fn eval_text(&self, rule: &str, doc: &str) -> Result<Option<String>, RuleError>;

    /// Evaluate a rule, yielding every match as a sub-document that
    /// per-field rules are then evaluated against.
    fn eval_list(&self, rule: &str, doc: &str) -> Result<Vec<String>, RuleError>;
}

/// Evaluate an optional per-field rule.
///
/// A `None` or blank rule is an absent-value outcome, not an error, and
/// a blank extracted value counts as a miss.
pub(crate) fn eval_field(
    evaluator: &dyn RuleEvaluator,
    rule: Option<&str>,
    doc: &str,
) -> Result<Option<String>, RuleError> {
    let Some(rule) = non_blank(rule) else {
        return Ok(None);
    };
    let value = evaluator.eval_text(rule, doc)?;
    Ok(value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty()))
}

/// Interpret an extracted marker value as a boolean flag.
pub(crate) fn truthy(value: &str) -> bool {
    !matches!(value.trim().to_ascii_lowercase().as_str(), "" | "0" | "false" | "no")
}

pub(crate) fn non_blank(rule: Option<&str>) -> Option<&str> {
    rule.map(str::trim).filter(|r| !r.is_empty())
}

/// Deterministic line-protocol evaluator used by unit tests.
///
/// Documents are plain text lines; supported rules:
/// - `rows:<prefix>` — every line starting with `<prefix>`, prefix kept
/// - `col:<n>` — the n-th `|`-separated field of the document
/// - `line:<prefix>` — the remainder of the first line starting with `<prefix>`
/// - `const:<value>` — `<value>` verbatim
/// - `missing` — always `None`
/// - `bad!` — a malformed expression
#[cfg(test)]
pub(crate) mod testing {
    use super::RuleEvaluator;
    use crate::error::RuleError;

    pub(crate) struct LineEvaluator;

    impl RuleEvaluator for LineEvaluator {
        fn eval_text(&self, rule: &str, doc: &str) -> Result<Option<String>, RuleError> {
            if rule == "bad!" {
                return Err(RuleError("bad!".to_owned()));
            }
            if rule == "missing" {
                return Ok(None);
            }
            if let Some(value) = rule.strip_prefix("const:") {
                return Ok(Some(value.to_owned()));
            }
            if let Some(index) = rule.strip_prefix("col:") {
                let index: usize = index.parse().map_err(|_| RuleError(rule.to_owned()))?;
                return Ok(doc.split('|').nth(index).map(str::to_owned));
            }
            if let Some(prefix) = rule.strip_prefix("line:") {
                return Ok(doc
                    .lines()
                    .find_map(|line| line.strip_prefix(prefix))
                    .map(str::to_owned));
            }
            Ok(None)
        }

        fn eval_list(&self, rule: &str, doc: &str) -> Result<Vec<String>, RuleError> {
            if rule == "bad!" {
                return Err(RuleError("bad!".to_owned()));
            }
            let Some(prefix) = rule.strip_prefix("rows:") else {
                return Ok(Vec::new());
            };
            Ok(doc
                .lines()
                .filter(|line| line.starts_with(prefix))
                .map(str::to_owned)
                .collect())
        }
    }
}
