use std::{ops::Deref, sync::Arc};

use reqwest::{Client, ClientBuilder};
use reqwest_cookie_store::{CookieStore, CookieStoreMutex};

use crate::error::MirrorResult;

/// A [`Client`] sharing one cookie jar between all of its clones.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    cookies_store: Arc<CookieStoreMutex>,
}

impl HttpClient {
    pub fn new(builder: ClientBuilder) -> MirrorResult<Self> {
        let cookies_store = Arc::new(CookieStoreMutex::new(CookieStore::default()));
        let client = builder.cookie_provider(cookies_store.clone()).build()?;

        Ok(Self {
            client,
            cookies_store,
        })
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        let cookies_store = Arc::new(CookieStoreMutex::new(CookieStore::default()));
        let client = Client::builder()
            .cookie_provider(cookies_store.clone())
            .build()
            .unwrap_or_default();

        Self {
            client,
            cookies_store,
        }
    }
}

impl Deref for HttpClient {
    type Target = Client;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}
