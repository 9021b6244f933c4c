use std::io;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use reqwest::{Method, Request, Url};
use tracing::debug;

use crate::constant::{CONTINUATION_TOKEN_PARAM, EMPTY_PAYLOAD_SHA256};
use crate::error::{Error, Result};
use crate::s3_document::Document;
use crate::s3_error_detector::check_error;
use crate::s3_signer::Signer;
use crate::s3_string_to_sign::append_query;
use crate::transport::Transport;

pub type Measurer = Box<dyn Fn(&Document) -> usize + Send + Sync>;
pub type ItemReader<T> = Box<dyn Fn(&Document, usize) -> Result<T> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct PageRequest {
    url: Url,
    limit_param: String,
    limit: usize,
}

impl PageRequest {
    #[inline]
    pub fn new(url: Url, limit_param: impl Into<String>, limit: usize) -> Self {
        Self {
            url,
            limit_param: limit_param.into(),
            limit,
        }
    }

    /// Unsigned GET for the page after `token`.
    pub fn build(&self, token: Option<&str>) -> Request {
        let mut url = self.url.clone();
        let limit = self.limit.to_string();

        let mut params = Vec::with_capacity(2);
        if let Some(token) = token {
            params.push((CONTINUATION_TOKEN_PARAM, token));
        }
        params.push((self.limit_param.as_str(), limit.as_str()));
        append_query(&mut url, &params);

        Request::new(Method::GET, url)
    }
}

enum PageCursor {
    NotStarted,
    Buffered {
        document: Document,
        index: usize,
        size: usize,
        token: Option<String>,
    },
    Exhausted,
}

/// Pull-based walk over a paginated listing, one buffered page at a time.
///
/// `has_next` is `true` before the first fetch, so an empty listing costs one
/// request and yields nothing.
pub struct Paginator<T> {
    signer: Signer,
    transport: Arc<dyn Transport>,
    template: PageRequest,
    token_element: String,
    measurer: Measurer,
    reader: ItemReader<T>,
    cursor: PageCursor,
    pages: usize,
}

impl<T> Paginator<T> {
    pub fn new(
        signer: Signer,
        transport: Arc<dyn Transport>,
        template: PageRequest,
        token_element: impl Into<String>,
        measurer: impl Fn(&Document) -> usize + Send + Sync + 'static,
        reader: impl Fn(&Document, usize) -> Result<T> + Send + Sync + 'static,
    ) -> Self {
        Self {
            signer,
            transport,
            template,
            token_element: token_element.into(),
            measurer: Box::new(measurer),
            reader: Box::new(reader),
            cursor: PageCursor::NotStarted,
            pages: 0,
        }
    }

    pub fn has_next(&self) -> bool {
        match &self.cursor {
            PageCursor::NotStarted => true,
            PageCursor::Buffered {
                index, size, token, ..
            } => index < size || token.is_some(),
            PageCursor::Exhausted => false,
        }
    }

    /// Whether an item can be returned without a fetch.
    pub fn has_buffered(&self) -> bool {
        matches!(&self.cursor, PageCursor::Buffered { index, size, .. } if index < size)
    }

    #[inline]
    pub fn pages_fetched(&self) -> usize {
        self.pages
    }

    /// A failed fetch or an error document ends the walk. A failed item read
    /// skips that item.
    pub fn next_item(&mut self) -> Result<Option<T>> {
        loop {
            match &mut self.cursor {
                PageCursor::NotStarted => self.fetch_page(None)?,
                PageCursor::Buffered {
                    document,
                    index,
                    size,
                    token,
                } => {
                    if *index < *size {
                        if let Err(e) = check_error(document) {
                            self.cursor = PageCursor::Exhausted;
                            return Err(e);
                        }
                        let current = *index;
                        *index += 1;
                        return (self.reader)(document, current).map(Some);
                    }

                    match token.take() {
                        Some(token) => self.fetch_page(Some(token))?,
                        None => {
                            self.cursor = PageCursor::Exhausted;
                            return Ok(None);
                        }
                    }
                }
                PageCursor::Exhausted => return Ok(None),
            }
        }
    }

    pub fn into_async(self) -> AsyncPaginator<T> {
        AsyncPaginator {
            inner: Arc::new(Mutex::new(self)),
        }
    }

    fn fetch_page(&mut self, token: Option<String>) -> Result<()> {
        self.pages += 1;
        match self.load_page(token.as_deref()) {
            Ok(cursor) => {
                self.cursor = cursor;
                Ok(())
            }
            Err(e) => {
                self.cursor = PageCursor::Exhausted;
                Err(e)
            }
        }
    }

    fn load_page(&self, token: Option<&str>) -> Result<PageCursor> {
        let mut request = self.template.build(token);
        self.signer
            .sign(&mut request, EMPTY_PAYLOAD_SHA256, Utc::now())?;
        debug!(
            page = self.pages,
            url = %request.url(),
            continued = token.is_some(),
            "fetching listing page"
        );

        let body = self.transport.execute(request)?;
        let document = Document::from_reader(body)?;
        check_error(&document)?;

        let size = (self.measurer)(&document);
        let token = document
            .find(&self.token_element)
            .map(|e| e.text().to_string())
            .filter(|t| !t.is_empty());
        debug!(
            page = self.pages,
            size,
            has_token = token.is_some(),
            "buffered listing page"
        );

        Ok(PageCursor::Buffered {
            document,
            index: 0,
            size,
            token,
        })
    }
}

impl<T> Iterator for Paginator<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.has_next() {
            return None;
        }
        self.next_item().transpose()
    }
}

impl<T> std::fmt::Debug for Paginator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.cursor {
            PageCursor::NotStarted => "NotStarted",
            PageCursor::Buffered { .. } => "Buffered",
            PageCursor::Exhausted => "Exhausted",
        };
        f.debug_struct("Paginator")
            .field("template", &self.template)
            .field("token_element", &self.token_element)
            .field("state", &state)
            .field("pages", &self.pages)
            .finish()
    }
}

/// Dropping a pending `next_future` does not cancel its fetch; the page still
/// lands in the shared cursor.
pub struct AsyncPaginator<T> {
    inner: Arc<Mutex<Paginator<T>>>,
}

impl<T: Send + 'static> AsyncPaginator<T> {
    pub fn has_next(&self) -> bool {
        self.inner.lock().has_next()
    }

    pub async fn next_future(&mut self) -> Result<Option<T>> {
        {
            let mut paginator = self.inner.lock();
            if paginator.has_buffered() || !paginator.has_next() {
                return paginator.next_item();
            }
        }

        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let mut paginator = inner.lock();
            let item = paginator.next_item();
            // Blocking-pool workers outlive the walk; do not leave keys behind.
            paginator.signer.release();
            item
        })
        .await
        .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::Other, e)))?
    }

    /// Back to blocking mode. `None` while a detached fetch still holds the
    /// cursor.
    pub fn into_blocking(self) -> Option<Paginator<T>> {
        Arc::try_unwrap(self.inner).ok().map(Mutex::into_inner)
    }
}

impl<T> std::fmt::Debug for AsyncPaginator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncPaginator").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io::{Cursor, Read};

    use super::*;
    use crate::credentials::Credentials;

    struct Pages {
        bodies: Mutex<VecDeque<String>>,
        requests: Mutex<Vec<Request>>,
    }

    impl Pages {
        fn new(bodies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                bodies: Mutex::new(bodies.iter().map(|b| b.to_string()).collect()),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    impl Transport for Pages {
        fn execute(&self, request: Request) -> Result<Box<dyn Read + Send>> {
            self.requests.lock().push(request);
            let body = self.bodies.lock().pop_front().ok_or_else(|| {
                Error::Io(io::Error::new(io::ErrorKind::ConnectionRefused, "no more pages"))
            })?;
            Ok(Box::new(Cursor::new(body.into_bytes())))
        }
    }

    fn paginator(pages: Arc<Pages>) -> Paginator<String> {
        let signer = Signer::new(Credentials::new("AKID", "secret"), "us-east-1");
        let template = PageRequest::new(
            Url::parse("http://localhost:9000/").unwrap(),
            "max-buckets",
            1000,
        );
        Paginator::new(
            signer,
            pages,
            template,
            "ContinuationToken",
            |doc: &Document| doc.root().children_named("Item").count(),
            |doc: &Document, index: usize| {
                Ok(doc
                    .root()
                    .children_named("Item")
                    .nth(index)
                    .map(|e| e.text().to_string())
                    .unwrap_or_default())
            },
        )
    }

    #[test]
    fn test_should_walk_two_pages_in_order() {
        let pages = Pages::new(&[
            "<R><Item>a</Item><Item>b</Item><ContinuationToken>X</ContinuationToken></R>",
            "<R><Item>c</Item></R>",
        ]);
        let mut p = paginator(pages.clone());

        assert!(p.has_next());
        assert_eq!(p.next_item().unwrap(), Some("a".to_string()));
        assert_eq!(p.next_item().unwrap(), Some("b".to_string()));
        assert!(p.has_next());
        assert_eq!(p.next_item().unwrap(), Some("c".to_string()));
        assert!(!p.has_next());
        assert_eq!(p.next_item().unwrap(), None);
        assert_eq!(p.pages_fetched(), 2);

        let requests = pages.requests.lock();
        assert_eq!(requests[0].url().query(), Some("max-buckets=1000"));
        assert_eq!(
            requests[1].url().query(),
            Some("continuation-token=X&max-buckets=1000")
        );
        assert!(requests[1].headers().contains_key("authorization"));
    }

    #[test]
    fn test_should_stop_after_one_fetch_for_empty_listing() {
        let pages = Pages::new(&["<R/>"]);
        let mut p = paginator(pages.clone());

        assert!(p.has_next());
        assert_eq!(p.next_item().unwrap(), None);
        assert!(!p.has_next());
        assert_eq!(p.next_item().unwrap(), None);
        assert_eq!(p.pages_fetched(), 1);
        assert_eq!(pages.requests.lock().len(), 1);
    }

    #[test]
    fn test_should_skip_empty_page_carrying_token() {
        let pages = Pages::new(&[
            "<R><ContinuationToken>T1</ContinuationToken></R>",
            "<R><Item>only</Item></R>",
        ]);
        let items: Vec<String> = paginator(pages).map(|r| r.unwrap()).collect();
        assert_eq!(items, vec!["only".to_string()]);
    }

    #[test]
    fn test_should_raise_protocol_error_and_stop() {
        let pages = Pages::new(&[
            "<Error><Code>NoSuchBucket</Code><Message>m</Message><Resource>r</Resource>\
             <RequestId>id1</RequestId><HostId>id2</HostId></Error>",
        ]);
        let mut p = paginator(pages);

        match p.next_item() {
            Err(Error::Protocol(response)) => {
                assert_eq!(response.code, "NoSuchBucket");
                assert_eq!(response.message, "m");
                assert_eq!(response.resource, "r");
                assert_eq!(response.request_id, "id1");
                assert_eq!(response.host_id, "id2");
            }
            other => panic!("expected protocol error, got {:?}", other),
        }
        assert!(!p.has_next());
        assert_eq!(p.next_item().unwrap(), None);
    }

    #[test]
    fn test_should_end_walk_on_transport_failure() {
        let pages = Pages::new(&[
            "<R><Item>a</Item><ContinuationToken>X</ContinuationToken></R>",
        ]);
        let mut p = paginator(pages);

        assert_eq!(p.next_item().unwrap(), Some("a".to_string()));
        let err = p.next_item().unwrap_err();
        assert!(matches!(err, Error::Io(ref e) if e.kind() == io::ErrorKind::ConnectionRefused));
        assert!(!p.has_next());
    }

    #[test]
    fn test_should_treat_empty_token_as_last_page() {
        let pages = Pages::new(&["<R><Item>a</Item><ContinuationToken/></R>"]);
        let items: Vec<String> = paginator(pages.clone()).map(|r| r.unwrap()).collect();
        assert_eq!(items, vec!["a".to_string()]);
        assert_eq!(pages.requests.lock().len(), 1);
    }

    #[test]
    fn test_should_recheck_buffered_document_for_error() {
        let pages = Pages::new(&[]);
        let mut p = paginator(pages.clone());
        p.cursor = PageCursor::Buffered {
            document: "<Error><Code>SlowDown</Code><Item>a</Item></Error>".parse().unwrap(),
            index: 0,
            size: 1,
            token: Some("X".to_string()),
        };
        assert!(p.has_next());

        let err = p.next_item().unwrap_err();
        assert_eq!(err.code(), Some("SlowDown"));
        assert!(matches!(p.cursor, PageCursor::Exhausted));
        assert!(!p.has_next());
        assert!(pages.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn test_should_fetch_pages_on_blocking_pool() {
        let pages = Pages::new(&[
            "<R><Item>a</Item><Item>b</Item><ContinuationToken>X</ContinuationToken></R>",
            "<R><Item>c</Item></R>",
        ]);
        let mut p = paginator(pages.clone()).into_async();

        let mut items = Vec::new();
        while p.has_next() {
            match p.next_future().await.unwrap() {
                Some(item) => items.push(item),
                None => break,
            }
        }
        assert_eq!(items, vec!["a", "b", "c"]);
        assert_eq!(pages.requests.lock().len(), 2);

        let blocking = p.into_blocking().unwrap();
        assert_eq!(blocking.pages_fetched(), 2);
        assert!(blocking.signer.pool().is_empty());
    }
}
