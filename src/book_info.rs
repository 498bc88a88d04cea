use crate::entities::Book;
use crate::error::Error;
use crate::request::resolve_href;
use crate::rule::{RuleEvaluator, eval_field};
use crate::source::BookSource;

/// Parse a detail page, merging extracted fields onto `book` in place.
///
/// Every field rule evaluates independently; an absent rule or a miss
/// leaves the field unchanged, so a partial record from a list page is
/// enriched rather than overwritten. Never constructs a new book
/// identity.
pub fn resolve_book_info(
    book: &mut Book,
    body: &str,
    source: &BookSource,
    base_url: &str,
    evaluator: &dyn RuleEvaluator,
) -> Result<(), Error> {
    let rules = &source.info;

    if let Some(name) = eval_field(evaluator, rules.name.as_deref(), body)? {
        book.name = name;
    }
    if let Some(author) = eval_field(evaluator, rules.author.as_deref(), body)? {
        book.author = author;
    }
    if let Some(intro) = eval_field(evaluator, rules.intro.as_deref(), body)? {
        book.intro = Some(intro);
    }
    if let Some(kind) = eval_field(evaluator, rules.kind.as_deref(), body)? {
        book.kind = Some(kind);
    }
    if let Some(last_chapter) = eval_field(evaluator, rules.last_chapter.as_deref(), body)? {
        book.last_chapter = Some(last_chapter);
    }
    if let Some(cover) = eval_field(evaluator, rules.cover_url.as_deref(), body)?
        && let Some(cover_url) = resolve_href(base_url, &cover)
    {
        book.cover_url = Some(cover_url);
    }

    if let Some(toc) = eval_field(evaluator, rules.toc_url.as_deref(), body)? {
        match resolve_href(base_url, &toc) {
            Some(toc_url) => book.toc_url = toc_url,
            None => tracing::debug!(%toc, "extracted toc url unresolvable; keeping previous"),
        }
    }
    if book.toc_url.trim().is_empty() {
        // The detail page doubles as the toc page.
        book.toc_url = book.url.clone();
    }

    book.info_html = Some(body.to_owned());

    tracing::debug!(url = %book.url, name = %book.name, toc_url = %book.toc_url, "resolved book info");
    Ok(())
}
