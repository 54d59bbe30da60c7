//! Asynchronously loaded source metadata.
//!
//! Sources such as TileJSON and Bing only learn their tile URLs after a
//! metadata document has been downloaded. [`MetadataCell`] holds the current
//! snapshot and swaps it in one step, so readers always see either the
//! defaults or the complete loaded document, never a mix.
//! [`RemoteMetadata`] performs the download on a background thread and
//! retries lazily after a failure.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::types::{SourceError, SourceMetadata};
use crate::provider::HttpClient;

#[derive(Clone)]
enum MetadataState {
    Unconfigured(Arc<SourceMetadata>),
    Configured(Arc<SourceMetadata>),
}

/// Atomic holder of a metadata snapshot.
pub struct MetadataCell {
    state: RwLock<MetadataState>,
}

impl MetadataCell {
    /// A cell that starts unconfigured with `defaults`.
    pub fn unconfigured(defaults: SourceMetadata) -> Self {
        Self {
            state: RwLock::new(MetadataState::Unconfigured(Arc::new(defaults))),
        }
    }

    /// A cell that is configured from the start.
    pub fn configured(metadata: SourceMetadata) -> Self {
        Self {
            state: RwLock::new(MetadataState::Configured(Arc::new(metadata))),
        }
    }

    pub fn snapshot(&self) -> Arc<SourceMetadata> {
        match &*self.state.read() {
            MetadataState::Unconfigured(m) | MetadataState::Configured(m) => Arc::clone(m),
        }
    }

    pub fn is_configured(&self) -> bool {
        matches!(&*self.state.read(), MetadataState::Configured(_))
    }

    /// Replace the snapshot and mark the cell configured.
    pub fn configure(&self, metadata: SourceMetadata) {
        *self.state.write() = MetadataState::Configured(Arc::new(metadata));
    }
}

/// Parses a downloaded document into metadata, given the current snapshot.
pub type MetadataParser =
    Box<dyn Fn(&[u8], &SourceMetadata) -> Result<SourceMetadata, SourceError> + Send + Sync>;

/// Downloads a metadata document and configures a [`MetadataCell`].
pub struct RemoteMetadata {
    label: String,
    url: String,
    http: Arc<dyn HttpClient>,
    parse: MetadataParser,
    cell: MetadataCell,
    loading: AtomicBool,
}

impl RemoteMetadata {
    /// # Arguments
    ///
    /// * `label` - Source name, used for the loader thread and logs
    /// * `url` - Metadata document URL
    /// * `http` - Shared HTTP client
    /// * `parse` - Document parser
    /// * `defaults` - Snapshot served until the document is loaded
    pub fn new(
        label: impl Into<String>,
        url: impl Into<String>,
        http: Arc<dyn HttpClient>,
        parse: MetadataParser,
        defaults: SourceMetadata,
    ) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            url: url.into(),
            http,
            parse,
            cell: MetadataCell::unconfigured(defaults),
            loading: AtomicBool::new(false),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn snapshot(&self) -> Arc<SourceMetadata> {
        self.cell.snapshot()
    }

    pub fn is_configured(&self) -> bool {
        self.cell.is_configured()
    }

    /// Start a background load unless the metadata is already present or a
    /// load is running.
    pub fn ensure_configured(self: &Arc<Self>) {
        if self.cell.is_configured() || self.loading.swap(true, Ordering::AcqRel) {
            return;
        }

        let this = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("tilestream-meta-{}", self.label))
            .spawn(move || {
                // Failure is already logged; the next request retries
                let _ = this.load_now();
                this.loading.store(false, Ordering::Release);
            });

        if let Err(e) = spawned {
            self.loading.store(false, Ordering::Release);
            warn!(source = %self.label, error = %e, "Failed to spawn metadata loader");
        }
    }

    /// Download and apply the metadata on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns the [`SourceError`] that left the source unconfigured.
    pub fn load_now(&self) -> Result<(), SourceError> {
        debug!(source = %self.label, url = %self.url, "Loading source metadata");

        let result = self
            .http
            .get(&self.url)
            .map_err(SourceError::from)
            .and_then(|body| (self.parse)(&body, &self.cell.snapshot()));

        match result {
            Ok(metadata) => {
                info!(
                    source = %self.label,
                    name = %metadata.name,
                    min_zoom = metadata.zoom.min,
                    max_zoom = metadata.zoom.max,
                    "Source configured"
                );
                self.cell.configure(metadata);
                Ok(())
            }
            Err(e) => {
                warn!(source = %self.label, error = %e, "Source metadata unavailable");
                Err(e)
            }
        }
    }
}
