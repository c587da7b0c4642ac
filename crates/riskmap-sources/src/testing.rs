//! A canned HTTP/1.1 server on loopback for adapter tests.

use std::{
  collections::{HashMap, VecDeque},
  sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
  },
};

use tokio::{
  io::{AsyncReadExt, AsyncWriteExt},
  net::TcpListener,
};

use crate::{config::HttpConfig, http::HttpFetcher};

type Routes = HashMap<String, VecDeque<(u16, String)>>;

pub struct TestServer {
  base: String,
  hits: Arc<AtomicUsize>,
}

impl TestServer {
  pub fn url(&self, path: &str) -> String { format!("{}{path}", self.base) }

  pub fn base(&self) -> &str { &self.base }

  pub fn hits(&self) -> usize { self.hits.load(Ordering::SeqCst) }
}

/// Serve `routes`: each path answers its responses in order, repeating the
/// last one. Unknown paths answer 404.
pub async fn serve(routes: Vec<(&str, Vec<(u16, &str)>)>) -> TestServer {
  let routes: Routes = routes
    .into_iter()
    .map(|(path, responses)| {
      let queue = responses.into_iter().map(|(s, b)| (s, b.to_owned())).collect();
      (path.to_owned(), queue)
    })
    .collect();
  let routes = Arc::new(Mutex::new(routes));
  let hits = Arc::new(AtomicUsize::new(0));

  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  let base = format!("http://{}", listener.local_addr().unwrap());

  let counter = hits.clone();
  tokio::spawn(async move {
    while let Ok((mut sock, _)) = listener.accept().await {
      let routes = routes.clone();
      let counter = counter.clone();
      tokio::spawn(async move {
        let mut buf = vec![0u8; 16 * 1024];
        let mut read = 0;
        while read < buf.len() {
          let n = sock.read(&mut buf[read..]).await.unwrap_or(0);
          if n == 0 {
            break;
          }
          read += n;
          if buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
            break;
          }
        }

        let head = String::from_utf8_lossy(&buf[..read]);
        let path = head.split_whitespace().nth(1).unwrap_or("/").to_owned();
        counter.fetch_add(1, Ordering::SeqCst);

        let (status, body) = {
          let mut routes = routes.lock().unwrap();
          match routes.get_mut(&path) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue.front().cloned().unwrap_or((404, String::new())),
            None => (404, String::new()),
          }
        };

        let response = format!(
          "HTTP/1.1 {status} Canned\r\ncontent-type: text/html\r\ncontent-length: {}\r\n\
           connection: close\r\n\r\n{body}",
          body.len()
        );
        let _ = sock.write_all(response.as_bytes()).await;
        let _ = sock.shutdown().await;
      });
    }
  });

  TestServer { base, hits }
}

/// A fetcher with fast retries that ignores proxy settings.
pub fn fetcher() -> HttpFetcher {
  HttpFetcher::new(&HttpConfig {
    timeout_secs: 5,
    retries: 2,
    backoff_ms: 10,
    concurrency: 4,
    system_proxy: false,
    ..HttpConfig::default()
  })
  .unwrap()
}
