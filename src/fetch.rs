use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, FetchError};
use crate::request::{Method, RequestDescriptor};
use crate::rule::RuleEvaluator;
use crate::source::BookSource;

/// Body plus the final URL after redirects; the effective URL is the
/// base for all subsequent relative resolution in an operation.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub body: String,
    pub effective_url: String,
}

/// Plain HTTP fetch capability.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &RequestDescriptor) -> Result<FetchResult, FetchError>;
}

/// Rendered-page fetch capability: full script execution in a headless
/// browser, for pages whose content is generated client-side. Invoked
/// as a black box; no default implementation is shipped.
#[async_trait]
pub trait RenderedFetcher: Send + Sync {
    /// Fetch `request` with `execution_base` as the execution context,
    /// returning the final document as executed.
    async fn fetch_rendered(
        &self,
        request: &RequestDescriptor,
        execution_base: &str,
    ) -> Result<String, FetchError>;
}

/// Default [`Fetcher`] backed by `reqwest`.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent("websource/0.1")
            .build()
            .map_err(|err| FetchError::Client(err.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &RequestDescriptor) -> Result<FetchResult, FetchError> {
        let mut builder = match request.method {
            Method::Get => self.client.get(request.url.clone()),
            Method::Post => self.client.post(request.url.clone()),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|err| FetchError::Transport {
            url: request.url.to_string(),
            message: err.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: request.url.to_string(),
                status: status.as_u16(),
            });
        }

        let effective_url = response.url().to_string();
        let body = response.text().await.map_err(|err| FetchError::Transport {
            url: request.url.to_string(),
            message: err.to_string(),
        })?;

        Ok(FetchResult {
            body,
            effective_url,
        })
    }
}

/// One source plus the capabilities needed to fetch and parse its
/// pages. Strategy selection for every fetch in an operation lives
/// here: rendered fetch when the descriptor asks for it, plain HTTP
/// otherwise.
#[derive(Clone)]
pub(crate) struct SourceClient {
    pub(crate) source: Arc<BookSource>,
    pub(crate) fetcher: Arc<dyn Fetcher>,
    pub(crate) rendered: Option<Arc<dyn RenderedFetcher>>,
    pub(crate) evaluator: Arc<dyn RuleEvaluator>,
}

impl SourceClient {
    /// Build a descriptor from a rule URL and fetch it.
    pub(crate) async fn fetch_template(
        &self,
        template: &str,
        base_url: &str,
        page: u32,
        key: Option<&str>,
    ) -> Result<FetchResult, Error> {
        let request = RequestDescriptor::build(
            template,
            page,
            key,
            base_url,
            &self.source,
            self.evaluator.as_ref(),
        )?;
        self.fetch_descriptor(&request).await
    }

    pub(crate) async fn fetch_descriptor(
        &self,
        request: &RequestDescriptor,
    ) -> Result<FetchResult, Error> {
        if request.use_rendered {
            let Some(rendered) = &self.rendered else {
                return Err(FetchError::RenderedUnavailable.into());
            };
            let body = rendered
                .fetch_rendered(request, &self.source.source_url)
                .await?;
            // Rendered fetch returns the document as executed; the
            // request URL itself is the effective base.
            return Ok(FetchResult {
                body,
                effective_url: request.url.to_string(),
            });
        }
        Ok(self.fetcher.fetch(request).await?)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::{FetchResult, Fetcher};
    use crate::error::FetchError;
    use crate::request::RequestDescriptor;

    /// In-memory fetcher mapping URLs to bodies, with optional redirect
    /// remapping and a request log.
    #[derive(Default)]
    pub(crate) struct MapFetcher {
        pages: HashMap<String, String>,
        redirects: HashMap<String, String>,
        pub(crate) requests: Mutex<Vec<String>>,
    }

    impl MapFetcher {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn page(mut self, url: &str, body: &str) -> Self {
            self.pages.insert(url.to_owned(), body.to_owned());
            self
        }

        pub(crate) fn redirect(mut self, from: &str, to: &str) -> Self {
            self.redirects.insert(from.to_owned(), to.to_owned());
            self
        }

        pub(crate) fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Fetcher for MapFetcher {
        async fn fetch(&self, request: &RequestDescriptor) -> Result<FetchResult, FetchError> {
            let requested = request.url.to_string();
            self.requests.lock().unwrap().push(requested.clone());

            let effective = self
                .redirects
                .get(&requested)
                .cloned()
                .unwrap_or_else(|| requested.clone());
            match self.pages.get(&effective) {
                Some(body) => Ok(FetchResult {
                    body: body.clone(),
                    effective_url: effective,
                }),
                None => Err(FetchError::Status {
                    url: requested,
                    status: 404,
                }),
            }
        }
    }
}
