use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::book_info::resolve_book_info;
use crate::book_list::{ListMode, resolve_book_list};
use crate::chapter_list::resolve_chapter_list;
use crate::content::resolve_content;
use crate::entities::{Book, Chapter, SearchResult};
use crate::error::Error;
use crate::fetch::{Fetcher, RenderedFetcher, SourceClient};
use crate::rule::{RuleEvaluator, non_blank};
use crate::source::BookSource;

const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// How an operation ended. Cancellation is a first-class outcome, not
/// an error.
#[derive(Debug)]
pub enum Outcome<T> {
    Finished(Result<T, Error>),
    Cancelled,
}

/// Handle to one in-flight operation.
///
/// `cancel` may be called at any time: the task is raced against its
/// cancellation token, so an in-flight fetch is abandoned rather than
/// awaited. Entity mutations committed before the cancellation took
/// effect are not rolled back.
pub struct OpTask<T> {
    handle: JoinHandle<Option<Result<T, Error>>>,
    token: CancellationToken,
}

impl<T> OpTask<T> {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub async fn join(self) -> Outcome<T> {
        match self.handle.await {
            Ok(Some(result)) => Outcome::Finished(result),
            Ok(None) => Outcome::Cancelled,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(_) => Outcome::Cancelled,
        }
    }
}

/// Semaphore-gated spawner: operations share a bounded pool sized for
/// I/O-bound work.
#[derive(Clone)]
struct OpPool {
    semaphore: Arc<Semaphore>,
}

impl OpPool {
    fn new(max_concurrency: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrency.max(1))),
        }
    }

    fn spawn<T, F>(&self, fut: F) -> OpTask<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, Error>> + Send + 'static,
    {
        let token = CancellationToken::new();
        let guard = token.clone();
        let semaphore = Arc::clone(&self.semaphore);
        let handle = tokio::spawn(async move {
            let work = async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("operation pool semaphore is closed");
                fut.await
            };
            tokio::select! {
                _ = guard.cancelled() => None,
                result = work => Some(result),
            }
        });
        OpTask { handle, token }
    }
}

/// Façade over one source: builds requests, picks the fetch strategy,
/// and hands fetched bodies to the stage resolvers. Every operation is
/// an independently cancellable task.
pub struct WebBook {
    client: SourceClient,
    pool: OpPool,
}

impl WebBook {
    pub fn new(
        source: Arc<BookSource>,
        fetcher: Arc<dyn Fetcher>,
        evaluator: Arc<dyn RuleEvaluator>,
    ) -> Self {
        Self {
            client: SourceClient {
                source,
                fetcher,
                rendered: None,
                evaluator,
            },
            pool: OpPool::new(DEFAULT_MAX_CONCURRENCY),
        }
    }

    /// Attach the rendered-page fetch capability for sources whose
    /// pages are generated client-side.
    pub fn with_rendered_fetcher(mut self, rendered: Arc<dyn RenderedFetcher>) -> Self {
        self.client.rendered = Some(rendered);
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.pool = OpPool::new(max_concurrency);
        self
    }

    pub fn source_url(&self) -> &str {
        &self.client.source.source_url
    }

    /// Search the source for `key`. A source without a search URL
    /// resolves to an empty list without fetching.
    pub fn search(&self, key: &str, page: u32) -> OpTask<Vec<SearchResult>> {
        let client = self.client.clone();
        let key = key.to_owned();
        self.pool.spawn(async move {
            let Some(search_url) =
                non_blank(client.source.search_url.as_deref()).map(str::to_owned)
            else {
                return Ok(Vec::new());
            };
            let fetched = client
                .fetch_template(&search_url, &client.source.source_url, page, Some(&key))
                .await?;
            resolve_book_list(
                &fetched.body,
                &client.source,
                &fetched.effective_url,
                ListMode::Search,
                client.evaluator.as_ref(),
            )
        })
    }

    /// Resolve one of the source's explore (discovery) pages.
    pub fn explore(&self, explore_url: &str, page: u32) -> OpTask<Vec<SearchResult>> {
        let client = self.client.clone();
        let explore_url = explore_url.to_owned();
        self.pool.spawn(async move {
            let fetched = client
                .fetch_template(&explore_url, &client.source.source_url, page, None)
                .await?;
            resolve_book_list(
                &fetched.body,
                &client.source,
                &fetched.effective_url,
                ListMode::Explore,
                client.evaluator.as_ref(),
            )
        })
    }

    /// Fetch and resolve the book's detail page, enriching `book` and
    /// returning it. Reuses the cached detail body when present.
    pub fn get_book_info(&self, mut book: Book) -> OpTask<Book> {
        let client = self.client.clone();
        self.pool.spawn(async move {
            book.source_kind = client.source.kind;
            let (body, base) = match book.cached_info_html() {
                Some(cached) => {
                    tracing::debug!(url = %book.url, "reusing cached detail page");
                    (cached.to_owned(), book.url.clone())
                }
                None => {
                    let fetched = client
                        .fetch_template(&book.url, &client.source.source_url, 1, None)
                        .await?;
                    (fetched.body, fetched.effective_url)
                }
            };
            resolve_book_info(&mut book, &body, &client.source, &base, client.evaluator.as_ref())?;
            Ok(book)
        })
    }

    /// Fetch and resolve the book's full chapter list, following toc
    /// pagination. Reuses the cached toc body when the detail page
    /// doubles as the toc page.
    pub fn get_chapter_list(&self, mut book: Book) -> OpTask<(Book, Vec<Chapter>)> {
        let client = self.client.clone();
        self.pool.spawn(async move {
            book.source_kind = client.source.kind;
            if book.toc_url.trim().is_empty() {
                book.toc_url = book.url.clone();
            }
            let toc_url = book.toc_url.clone();
            let (body, base) = if toc_url == book.url
                && let Some(cached) = book.cached_toc_html()
            {
                tracing::debug!(url = %toc_url, "reusing cached toc page");
                (cached.to_owned(), toc_url)
            } else {
                let fetched = client.fetch_template(&toc_url, &book.url, 1, None).await?;
                (fetched.body, fetched.effective_url)
            };
            let chapters = resolve_chapter_list(&mut book, body, &base, &client).await?;
            Ok((book, chapters))
        })
    }

    /// Fetch and resolve one chapter's full text, following content
    /// pagination. `next_chapter_url` lets the resolver tell a genuine
    /// next page apart from a link to the next chapter.
    pub fn get_content(
        &self,
        book: &Book,
        chapter: &Chapter,
        next_chapter_url: Option<&str>,
    ) -> OpTask<String> {
        let client = self.client.clone();
        let book = book.clone();
        let chapter = chapter.clone();
        let next_chapter_url = next_chapter_url.map(str::to_owned);
        self.pool.spawn(async move {
            if non_blank(client.source.content.content.as_deref()).is_none() {
                tracing::debug!(url = %chapter.url, "no content rule; chapter url is the content");
                return Ok(chapter.url.clone());
            }
            let (body, base) = if chapter.url == book.url
                && let Some(cached) = book.cached_toc_html()
            {
                tracing::debug!(url = %chapter.url, "reusing cached toc page as content");
                (cached.to_owned(), chapter.url.clone())
            } else {
                let base = if book.toc_url.trim().is_empty() {
                    book.url.clone()
                } else {
                    book.toc_url.clone()
                };
                let fetched = client.fetch_template(&chapter.url, &base, 1, None).await?;
                (fetched.body, fetched.effective_url)
            };
            resolve_content(&chapter, body, &base, next_chapter_url.as_deref(), &client).await
        })
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::error::FetchError;
    use crate::fetch::FetchResult;
    use crate::fetch::testing::MapFetcher;
    use crate::request::RequestDescriptor;
    use crate::rule::testing::LineEvaluator;
    use crate::source::{BookListRules, ContentRules, InfoRules, SourceKind};

    fn source() -> BookSource {
        BookSource {
            source_url: "https://books.example".to_owned(),
            source_name: "example".to_owned(),
            search_url: Some("/search?q={{key}}&p={{page}}".to_owned()),
            search: BookListRules {
                book_list: Some("rows:book|".to_owned()),
                name: Some("col:1".to_owned()),
                book_url: Some("col:2".to_owned()),
                ..BookListRules::default()
            },
            info: InfoRules {
                name: Some("line:title:".to_owned()),
                author: Some("line:author:".to_owned()),
                toc_url: Some("line:toc:".to_owned()),
                ..InfoRules::default()
            },
            content: ContentRules {
                content: Some("line:text:".to_owned()),
                ..ContentRules::default()
            },
            ..BookSource::default()
        }
    }

    fn web_book(fetcher: Arc<MapFetcher>, source: BookSource) -> WebBook {
        WebBook::new(Arc::new(source), fetcher, Arc::new(LineEvaluator))
    }

    fn finished<T>(outcome: Outcome<T>) -> T {
        match outcome {
            Outcome::Finished(Ok(value)) => value,
            Outcome::Finished(Err(err)) => panic!("operation failed: {err}"),
            Outcome::Cancelled => panic!("operation cancelled"),
        }
    }

    #[tokio::test]
    async fn search_interpolates_key_and_resolves_entries() {
        let fetcher = Arc::new(MapFetcher::new().page(
            "https://books.example/search?q=dune&p=1",
            "book|Dune|/b/1\n",
        ));
        let web_book = web_book(Arc::clone(&fetcher), source());

        let results = finished(web_book.search("dune", 1).join().await);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "https://books.example/b/1");
    }

    #[tokio::test]
    async fn search_without_search_url_is_empty_and_fetchless() {
        let fetcher = Arc::new(MapFetcher::new());
        let mut source = source();
        source.search_url = None;
        let web_book = web_book(Arc::clone(&fetcher), source);

        let results = finished(web_book.search("dune", 1).join().await);
        assert!(results.is_empty());
        assert_eq!(fetcher.request_count(), 0);
    }

    #[tokio::test]
    async fn search_resolves_relative_urls_against_redirect_target() {
        let fetcher = Arc::new(
            MapFetcher::new()
                .redirect(
                    "https://books.example/search?q=dune&p=1",
                    "https://mirror.example/search",
                )
                .page("https://mirror.example/search", "book|Dune|/b/1\n"),
        );
        let web_book = web_book(Arc::clone(&fetcher), source());

        let results = finished(web_book.search("dune", 1).join().await);
        assert_eq!(results[0].url, "https://mirror.example/b/1");
    }

    #[tokio::test]
    async fn book_info_reuses_cached_detail_page() {
        let fetcher = Arc::new(MapFetcher::new());
        let web_book = web_book(Arc::clone(&fetcher), source());
        let book = Book {
            url: "https://books.example/b/1".to_owned(),
            info_html: Some("title:Dune\nauthor:Herbert\n".to_owned()),
            ..Book::default()
        };

        let book = finished(web_book.get_book_info(book).join().await);
        assert_eq!(book.name, "Dune");
        assert_eq!(book.author, "Herbert");
        assert_eq!(fetcher.request_count(), 0);
    }

    #[tokio::test]
    async fn book_info_stamps_the_source_kind() {
        let fetcher = Arc::new(
            MapFetcher::new().page("https://books.example/b/1", "title:Dune\n"),
        );
        let mut source = source();
        source.kind = SourceKind::Audio;
        let web_book = web_book(Arc::clone(&fetcher), source);
        let book = Book {
            url: "https://books.example/b/1".to_owned(),
            ..Book::default()
        };

        let book = finished(web_book.get_book_info(book).join().await);
        assert_eq!(book.source_kind, SourceKind::Audio);
    }

    #[tokio::test]
    async fn content_reuses_cached_toc_page_when_chapter_is_the_book_page() {
        let fetcher = Arc::new(MapFetcher::new());
        let web_book = web_book(Arc::clone(&fetcher), source());
        let book = Book {
            url: "https://books.example/b/1".to_owned(),
            toc_url: "https://books.example/b/1".to_owned(),
            toc_html: Some("text:whole story.\n".to_owned()),
            ..Book::default()
        };
        let chapter = Chapter {
            index: 0,
            title: "One".to_owned(),
            url: "https://books.example/b/1".to_owned(),
            is_volume: false,
        };

        let text = finished(web_book.get_content(&book, &chapter, None).join().await);
        assert_eq!(text, "whole story.");
        assert_eq!(fetcher.request_count(), 0);
    }

    #[tokio::test]
    async fn content_without_content_rule_returns_chapter_url_without_fetching() {
        let fetcher = Arc::new(MapFetcher::new());
        let mut source = source();
        source.content.content = None;
        let web_book = web_book(Arc::clone(&fetcher), source);
        let book = Book {
            url: "https://books.example/b/1".to_owned(),
            ..Book::default()
        };
        let chapter = Chapter {
            index: 0,
            title: "One".to_owned(),
            url: "https://reader.example/c/1".to_owned(),
            is_volume: false,
        };

        let text = finished(web_book.get_content(&book, &chapter, None).join().await);
        assert_eq!(text, "https://reader.example/c/1");
        assert_eq!(fetcher.request_count(), 0);
    }

    struct HangingFetcher;

    #[async_trait]
    impl Fetcher for HangingFetcher {
        async fn fetch(&self, _request: &RequestDescriptor) -> Result<FetchResult, FetchError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn cancel_abandons_an_in_flight_fetch() {
        let web_book = WebBook::new(
            Arc::new(source()),
            Arc::new(HangingFetcher),
            Arc::new(LineEvaluator),
        );

        let task = web_book.search("dune", 1);
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        task.cancel();

        assert!(matches!(task.join().await, Outcome::Cancelled));
    }

    #[tokio::test]
    async fn rendered_source_without_rendered_fetcher_fails_with_fetch_error() {
        let fetcher = Arc::new(MapFetcher::new());
        let mut source = source();
        source.rendered = true;
        let web_book = web_book(Arc::clone(&fetcher), source);

        let outcome = web_book.search("dune", 1).join().await;
        match outcome {
            Outcome::Finished(Err(Error::Fetch(FetchError::RenderedUnavailable))) => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(fetcher.request_count(), 0);
    }

    struct CannedRendered(&'static str);

    #[async_trait]
    impl RenderedFetcher for CannedRendered {
        async fn fetch_rendered(
            &self,
            _request: &RequestDescriptor,
            _execution_base: &str,
        ) -> Result<String, FetchError> {
            Ok(self.0.to_owned())
        }
    }

    #[tokio::test]
    async fn rendered_source_bypasses_the_plain_fetcher() {
        let fetcher = Arc::new(MapFetcher::new());
        let mut source = source();
        source.rendered = true;
        let web_book = web_book(Arc::clone(&fetcher), source)
            .with_rendered_fetcher(Arc::new(CannedRendered("book|Dune|/b/1\n")));

        let results = finished(web_book.search("dune", 1).join().await);
        assert_eq!(results.len(), 1);
        // Rendered fetch has no redirect notion; the request url is the base.
        assert_eq!(
            results[0].url,
            "https://books.example/b/1"
        );
        assert_eq!(fetcher.request_count(), 0);
    }
}
