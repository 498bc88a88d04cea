use std::collections::HashSet;

use regex::Regex;

use crate::entities::Chapter;
use crate::error::{Error, RuleError};
use crate::fetch::SourceClient;
use crate::request::{cycle_key, resolve_href};
use crate::rule::{eval_field, non_blank};

/// Paragraph boundary inserted between physical pages of one chapter.
const PAGE_BOUNDARY: &str = "\n\n";

/// Resolve a chapter's full text, following the next-content-page rule
/// across physical pages.
///
/// Pagination stops on a previously visited page (canonical-URL cycle
/// guard) or when the next-page rule reaches `next_chapter_url` — a
/// next-page rule that accidentally points at the next chapter must not
/// drag that chapter's text in. Returns the fully assembled text, never
/// a partial page set.
pub(crate) async fn resolve_content(
    chapter: &Chapter,
    first_body: String,
    base_url: &str,
    next_chapter_url: Option<&str>,
    client: &SourceClient,
) -> Result<String, Error> {
    let rules = &client.source.content;
    let Some(content_rule) = non_blank(rules.content.as_deref()) else {
        // Degenerate mode: no content rule means the chapter URL itself
        // is the content (e.g. an external reader link).
        return Ok(chapter.url.clone());
    };
    let replacements = compile_replacements(&rules.replace_regex)?;

    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(cycle_key(&chapter.url));
    let next_chapter_key = next_chapter_url.map(cycle_key);

    let mut assembled = extract_page(content_rule, &first_body, &replacements, client)?;
    let mut body = first_body;
    let mut page_base = base_url.to_owned();
    let mut pages = 1_usize;
    loop {
        let next = eval_field(client.evaluator.as_ref(), rules.next_content_url.as_deref(), &body)?
            .and_then(|next| resolve_href(&page_base, &next));
        let Some(next_url) = next else {
            break;
        };
        let key = cycle_key(&next_url);
        if next_chapter_key.as_ref() == Some(&key) {
            tracing::debug!(url = %next_url, "next-page rule reached the next chapter; stopping");
            break;
        }
        if !visited.insert(key) {
            tracing::debug!(url = %next_url, "content pagination revisited a page; stopping");
            break;
        }

        let fetched = client.fetch_template(&next_url, &page_base, 1, None).await?;
        let text = extract_page(content_rule, &fetched.body, &replacements, client)?;
        if !text.is_empty() {
            if !assembled.is_empty() {
                assembled.push_str(PAGE_BOUNDARY);
            }
            assembled.push_str(&text);
        }
        body = fetched.body;
        page_base = fetched.effective_url;
        pages += 1;
    }

    tracing::debug!(url = %chapter.url, pages, chars = assembled.len(), "resolved chapter content");
    Ok(assembled)
}

fn extract_page(
    content_rule: &str,
    body: &str,
    replacements: &[(Regex, String)],
    client: &SourceClient,
) -> Result<String, Error> {
    let raw = client
        .evaluator
        .eval_text(content_rule, body)?
        .unwrap_or_default();
    let mut text = raw.trim().to_owned();
    for (pattern, replacement) in replacements {
        text = pattern.replace_all(&text, replacement.as_str()).into_owned();
    }
    Ok(text)
}

/// Compile the source's ordered `pattern##replacement` entries. A
/// missing `##` strips the pattern; an unparsable pattern is a rule
/// error.
fn compile_replacements(entries: &[String]) -> Result<Vec<(Regex, String)>, RuleError> {
    entries
        .iter()
        .map(|entry| {
            let (pattern, replacement) = entry.split_once("##").unwrap_or((entry.as_str(), ""));
            let regex = Regex::new(pattern)
                .map_err(|err| RuleError(format!("invalid replace pattern {pattern:?}: {err}")))?;
            Ok((regex, replacement.to_owned()))
        })
        .collect()
}
