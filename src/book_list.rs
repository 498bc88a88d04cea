use crate::entities::SearchResult;
use crate::error::Error;
use crate::request::resolve_href;
use crate::rule::{RuleEvaluator, eval_field, non_blank};
use crate::source::{BookListRules, BookSource};

/// Which rule group a list page is parsed with. Search is the
/// key-interpolated group; parsing is otherwise identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListMode {
    Search,
    Explore,
}

/// Parse a search or explore list page into partial book records.
///
/// An absent rule group or a page with zero matches is a normal empty
/// outcome, never an error. Entries missing a name or a usable URL are
/// dropped: partial records must not propagate.
pub fn resolve_book_list(
    body: &str,
    source: &BookSource,
    base_url: &str,
    mode: ListMode,
    evaluator: &dyn RuleEvaluator,
) -> Result<Vec<SearchResult>, Error> {
    let rules: &BookListRules = match mode {
        ListMode::Search => &source.search,
        ListMode::Explore => &source.explore,
    };
    let Some(list_rule) = non_blank(rules.book_list.as_deref()) else {
        return Ok(Vec::new());
    };

    let items = evaluator.eval_list(list_rule, body)?;
    let mut results = Vec::with_capacity(items.len());
    for item in &items {
        let name = eval_field(evaluator, rules.name.as_deref(), item)?;
        let href = eval_field(evaluator, rules.book_url.as_deref(), item)?;
        let (Some(name), Some(href)) = (name, href) else {
            tracing::debug!(base_url, "list item missing name or url; dropped");
            continue;
        };
        let Some(url) = resolve_href(base_url, &href) else {
            tracing::debug!(base_url, %href, "list item url unresolvable; dropped");
            continue;
        };

        let cover_url = eval_field(evaluator, rules.cover_url.as_deref(), item)?
            .and_then(|cover| resolve_href(base_url, &cover));

        results.push(SearchResult {
            name,
            author: eval_field(evaluator, rules.author.as_deref(), item)?.unwrap_or_default(),
            url,
            kind: eval_field(evaluator, rules.kind.as_deref(), item)?,
            cover_url,
            intro: eval_field(evaluator, rules.intro.as_deref(), item)?,
            last_chapter: eval_field(evaluator, rules.last_chapter.as_deref(), item)?,
            source_kind: source.kind,
        });
    }

    tracing::debug!(
        base_url,
        items = items.len(),
        kept = results.len(),
        "resolved book list page"
    );
    Ok(results)
}
