//! Tile sources: where a layer's tiles live.
//!
//! A [`TileSource`] turns a [`TileKey`](crate::coord::TileKey) into an
//! ordered list of [`FetchLocation`]s and describes the layer through
//! [`SourceMetadata`]. Fetching and decoding is left to
//! [`TileFetcher`](crate::provider::TileFetcher).
//!
//! | Source | Locations |
//! |--------|-----------|
//! | [`UrlTemplateSource`] | fixed URL templates |
//! | [`TileJsonSource`] | URL from a TileJSON document (also hosted Mapbox maps) |
//! | [`BingSource`] | quadkey URL from Bing imagery metadata |
//! | [`ArchiveSource`] | local archives, first hit wins |
//! | [`CompositeSource`] | all of its children, composited |

mod archive;
mod bing;
mod composite;
mod metadata;
mod template;
mod tilejson;
mod types;

pub use archive::{ArchiveSource, DirectoryArchive, MbTilesArchive, MemoryArchive, TileArchive};
pub use bing::{parse_imagery_metadata, BingImagery, BingSource, BING_DEFAULT_ZOOM};
pub use composite::CompositeSource;
pub use metadata::{MetadataCell, MetadataParser, RemoteMetadata};
pub use template::{apply_ssl, expand_template, UrlTemplateSource};
pub use tilejson::{parse_tilejson, TileJsonSource, MAPBOX_BASE_URL};
pub use types::{BoundingBox, Center, FetchLocation, SourceError, SourceMetadata, TileSource};
