//! Remote tile download on cache miss.

use std::io::Write;
use std::time::Duration;

use reqwest::blocking::Client;
use tracing::debug;

use super::tile::TileCoord;
use crate::error::TileError;

/// Default timeout for one tile download.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Downloads tiles for the streamer's worker thread.
///
/// Calls are blocking and made from the worker thread only.
pub trait TileFetcher: Send + 'static {
    /// Write the encoded tile verbatim to `dest`, returning the byte count.
    fn fetch(&mut self, coord: TileCoord, dest: &mut dyn Write) -> Result<u64, TileError>;
}

/// [`TileFetcher`] for slippy-map servers laid out as `<base>/<zoom>/<x>/<y>.png`.
#[derive(Debug)]
pub struct HttpTileFetcher {
    base_url: String,
    timeout: Duration,
    client: Option<Client>,
}

impl HttpTileFetcher {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeout(base_url, DEFAULT_FETCH_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            timeout,
            client: None,
        }
    }

    pub fn tile_url(&self, coord: TileCoord) -> String {
        format!(
            "{}/{}/{}/{}.png",
            self.base_url.trim_end_matches('/'),
            coord.zoom,
            coord.x,
            coord.y
        )
    }

    // The blocking client runs its own runtime, so it is built lazily on the
    // worker thread rather than wherever the fetcher was constructed.
    fn client(&mut self, url: &str) -> Result<&Client, TileError> {
        if self.client.is_none() {
            let client = Client::builder()
                .timeout(self.timeout)
                .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
                .build()
                .map_err(|e| TileError::Fetch {
                    url: url.to_string(),
                    message: e.to_string(),
                })?;
            self.client = Some(client);
        }
        self.client.as_ref().ok_or_else(|| TileError::Fetch {
            url: url.to_string(),
            message: "HTTP client unavailable".to_string(),
        })
    }
}

impl TileFetcher for HttpTileFetcher {
    fn fetch(&mut self, coord: TileCoord, dest: &mut dyn Write) -> Result<u64, TileError> {
        let url = self.tile_url(coord);
        debug!(url = %url, "Downloading tile");

        let mut response = self
            .client(&url)?
            .get(&url)
            .send()
            .map_err(|e| TileError::Fetch {
                url: url.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TileError::Status {
                status: status.as_u16(),
                url,
            });
        }

        std::io::copy(&mut response, dest).map_err(|e| TileError::Fetch {
            url,
            message: e.to_string(),
        })
    }
}
