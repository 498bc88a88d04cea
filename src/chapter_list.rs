use std::collections::HashSet;

use crate::entities::{Book, Chapter};
use crate::error::{Error, Stage};
use crate::fetch::SourceClient;
use crate::request::{cycle_key, resolve_href};
use crate::rule::{RuleEvaluator, eval_field, non_blank, truthy};
use crate::source::TocRules;

/// Resolve a book's full chapter list, following the next-toc-page rule
/// across physical pages.
///
/// The chain is an explicit loop guarded by a visited set keyed on
/// canonical URLs: a repeated page terminates the chain silently with
/// whatever was accumulated. Contiguous indices are assigned only after
/// the whole chain completes. An empty final list is abnormal and
/// surfaces as a resolve error.
pub(crate) async fn resolve_chapter_list(
    book: &mut Book,
    first_body: String,
    base_url: &str,
    client: &SourceClient,
) -> Result<Vec<Chapter>, Error> {
    let rules = &client.source.toc;

    let mut chapters: Vec<Chapter> = Vec::new();
    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(cycle_key(base_url));

    book.toc_html = Some(first_body.clone());

    let mut body = first_body;
    let mut page_base = base_url.to_owned();
    let mut pages = 1_usize;
    loop {
        let next = parse_toc_page(
            &body,
            rules,
            &page_base,
            client.evaluator.as_ref(),
            &mut chapters,
        )?;
        let Some(next_url) = next else {
            break;
        };
        if !visited.insert(cycle_key(&next_url)) {
            tracing::debug!(url = %next_url, "toc pagination revisited a page; stopping");
            break;
        }

        let fetched = client.fetch_template(&next_url, &page_base, 1, None).await?;
        body = fetched.body;
        page_base = fetched.effective_url;
        pages += 1;
    }

    if chapters.is_empty() {
        return Err(Error::resolve(Stage::ChapterList, "no chapters extracted"));
    }
    for (index, chapter) in chapters.iter_mut().enumerate() {
        chapter.index = index as u32;
    }

    tracing::debug!(
        toc_url = %book.toc_url,
        pages,
        chapters = chapters.len(),
        "resolved chapter list"
    );
    Ok(chapters)
}

/// Parse one toc page, appending its chapters and returning the next
/// page's absolute URL, if any.
fn parse_toc_page(
    body: &str,
    rules: &TocRules,
    base_url: &str,
    evaluator: &dyn RuleEvaluator,
    chapters: &mut Vec<Chapter>,
) -> Result<Option<String>, Error> {
    if let Some(list_rule) = non_blank(rules.chapter_list.as_deref()) {
        for item in evaluator.eval_list(list_rule, body)? {
            let title = eval_field(evaluator, rules.chapter_name.as_deref(), &item)?;
            let href = eval_field(evaluator, rules.chapter_url.as_deref(), &item)?;
            let (Some(title), Some(href)) = (title, href) else {
                tracing::debug!(base_url, "toc item missing title or url; dropped");
                continue;
            };
            let Some(url) = resolve_href(base_url, &href) else {
                tracing::debug!(base_url, %href, "toc item url unresolvable; dropped");
                continue;
            };
            let is_volume = eval_field(evaluator, rules.is_volume.as_deref(), &item)?
                .is_some_and(|mark| truthy(&mark));

            chapters.push(Chapter {
                index: 0,
                title,
                url,
                is_volume,
            });
        }
    }

    let next = eval_field(evaluator, rules.next_toc_url.as_deref(), body)?
        .and_then(|next| resolve_href(base_url, &next));
    Ok(next)
}
