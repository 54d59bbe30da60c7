//! Several sources shown as one layer.

use std::sync::Arc;

use super::types::{FetchLocation, SourceMetadata, TileSource};
use crate::coord::{TileKey, ZoomBounds};

/// Stacks sources; their tiles are composited in order.
pub struct CompositeSource {
    sources: Vec<Arc<dyn TileSource>>,
}

impl CompositeSource {
    pub fn new(sources: Vec<Arc<dyn TileSource>>) -> Self {
        Self { sources }
    }

    pub fn sources(&self) -> &[Arc<dyn TileSource>] {
        &self.sources
    }
}

impl TileSource for CompositeSource {
    fn cache_key_prefix(&self) -> String {
        self.sources
            .iter()
            .map(|s| s.cache_key_prefix())
            .collect::<Vec<_>>()
            .join("+")
    }

    /// Locations of every child that serves the key's zoom, in stacking order.
    fn locations_for(&self, key: &TileKey, high_density: bool) -> Vec<FetchLocation> {
        self.sources
            .iter()
            .filter(|s| s.bounds().contains(key.zoom()))
            .flat_map(|s| s.locations_for(key, high_density))
            .collect()
    }

    fn metadata(&self) -> Arc<SourceMetadata> {
        let snapshots: Vec<Arc<SourceMetadata>> = self.sources.iter().map(|s| s.metadata()).collect();
        Arc::new(SourceMetadata {
            name: join_field(&snapshots, |m| m.name.as_str()),
            description: join_field(&snapshots, |m| m.description.as_str()),
            attribution: join_field(&snapshots, |m| m.attribution.as_str()),
            legend: join_field(&snapshots, |m| m.legend.as_str()),
            center: snapshots.iter().find_map(|m| m.center),
            bounding_box: snapshots.iter().find_map(|m| m.bounding_box),
            zoom: self.bounds(),
            tile_templates: snapshots
                .iter()
                .flat_map(|m| m.tile_templates.iter().cloned())
                .collect(),
        })
    }

    fn bounds(&self) -> ZoomBounds {
        self.sources
            .iter()
            .map(|s| s.bounds())
            .reduce(|a, b| a.union(&b))
            .unwrap_or_default()
    }

    fn is_configured(&self) -> bool {
        self.sources.iter().all(|s| s.is_configured())
    }

    fn initialize(&self) {
        for source in &self.sources {
            source.initialize();
        }
    }
}

fn join_field(snapshots: &[Arc<SourceMetadata>], field: impl Fn(&SourceMetadata) -> &str) -> String {
    snapshots
        .iter()
        .map(|m| field(m.as_ref()))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" / ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::UrlTemplateSource;

    fn composite() -> CompositeSource {
        let base = UrlTemplateSource::new("base", "http://base/{z}/{x}/{y}.png", true)
            .with_zoom(ZoomBounds::new(0, 14))
            .with_attribution("Base");
        let labels = UrlTemplateSource::new("labels", "http://labels/{z}/{x}/{y}.png", true)
            .with_zoom(ZoomBounds::new(4, 18))
            .with_attribution("Labels");
        CompositeSource::new(vec![
            Arc::new(base) as Arc<dyn TileSource>,
            Arc::new(labels) as Arc<dyn TileSource>,
        ])
    }

    #[test]
    fn test_prefix_joined() {
        assert_eq!(composite().cache_key_prefix(), "base+labels");
    }

    fn urls(source: &CompositeSource, zoom: u8) -> Vec<String> {
        source
            .locations_for(&TileKey::new("c", zoom, 1, 0), false)
            .into_iter()
            .filter_map(|l| match l {
                FetchLocation::Remote(url) => Some(url),
                FetchLocation::Archive(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_locations_concatenated_in_order() {
        assert_eq!(
            urls(&composite(), 6),
            vec!["http://base/6/1/0.png", "http://labels/6/1/0.png"]
        );
    }

    #[test]
    fn test_children_outside_their_zoom_are_skipped() {
        let source = composite();
        assert_eq!(urls(&source, 2), vec!["http://base/2/1/0.png"]);
        assert_eq!(urls(&source, 16), vec!["http://labels/16/1/0.png"]);
        assert!(urls(&source, 20).is_empty());
    }

    #[test]
    fn test_bounds_union_and_metadata() {
        let source = composite();
        assert_eq!(source.bounds(), ZoomBounds::new(0, 18));

        let meta = source.metadata();
        assert_eq!(meta.attribution, "Base / Labels");
        assert_eq!(meta.tile_templates.len(), 2);
        assert!(source.is_configured());
    }
}
