//! Type-keyed feature storage.

use http::Extensions;

/// A set of features keyed by their type.
///
/// At most one value per type is stored. Every `set` or `remove` bumps the
/// revision, which lets holders of cached lookups notice changes.
#[derive(Debug, Clone, Default)]
pub struct FeatureCollection {
    features: Extensions,
    revision: u64,
}

impl FeatureCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a feature, returning the one it replaced.
    pub fn set<T: Clone + Send + Sync + 'static>(&mut self, feature: T) -> Option<T> {
        self.revision += 1;
        self.features.insert(feature)
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.features.get::<T>()
    }

    pub fn get_mut<T: Send + Sync + 'static>(&mut self) -> Option<&mut T> {
        self.features.get_mut::<T>()
    }

    pub fn remove<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        let removed = self.features.remove::<T>();
        if removed.is_some() {
            self.revision += 1;
        }
        removed
    }

    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.features.get::<T>().is_some()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Marker(&'static str);

    #[test]
    fn set_get_replace_remove() {
        let mut features = FeatureCollection::new();
        assert!(features.is_empty());

        assert_eq!(features.set(Marker("a")), None);
        assert_eq!(features.get::<Marker>(), Some(&Marker("a")));
        assert_eq!(features.set(Marker("b")), Some(Marker("a")));
        assert_eq!(features.len(), 1);

        features.get_mut::<Marker>().unwrap().0 = "c";
        assert_eq!(features.remove::<Marker>(), Some(Marker("c")));
        assert!(!features.contains::<Marker>());
    }

    #[test]
    fn revision_tracks_changes() {
        let mut features = FeatureCollection::new();
        assert_eq!(features.revision(), 0);
        features.set(Marker("a"));
        features.set(Marker("b"));
        assert_eq!(features.revision(), 2);

        features.remove::<u32>();
        assert_eq!(features.revision(), 2);
        features.remove::<Marker>();
        assert_eq!(features.revision(), 3);
    }
}
