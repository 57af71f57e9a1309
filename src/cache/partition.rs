//! Versioned partition naming.
//!
//! Partition names embed the worker version: `{base}-{version}` for the main
//! partition and `{base}-{version}-api`, `-images`, `-static` for the
//! per-class sub-partitions. A version bump is the only supported
//! invalidation mechanism; activation purges every partition whose name no
//! longer matches the active set.

use crate::classify::ResourceClass;

/// The active set of partition names for one worker version.
#[derive(Debug, Clone)]
pub struct PartitionSet {
  base: String,
  version: String,
}

impl PartitionSet {
  pub fn new(base: impl Into<String>, version: impl Into<String>) -> Self {
    Self {
      base: base.into(),
      version: version.into(),
    }
  }

  pub fn version(&self) -> &str {
    &self.version
  }

  /// Main partition: navigations and passthrough fallbacks.
  pub fn main(&self) -> String {
    format!("{}-{}", self.base, self.version)
  }

  pub fn api(&self) -> String {
    format!("{}-{}-api", self.base, self.version)
  }

  pub fn images(&self) -> String {
    format!("{}-{}-images", self.base, self.version)
  }

  pub fn statics(&self) -> String {
    format!("{}-{}-static", self.base, self.version)
  }

  /// All partitions belonging to the active version.
  pub fn active(&self) -> [String; 4] {
    [self.main(), self.api(), self.images(), self.statics()]
  }

  /// Whether a partition name belongs to this worker at all, any version.
  pub fn is_ours(&self, name: &str) -> bool {
    name.starts_with(&format!("{}-", self.base))
  }

  /// Whether a partition name is part of the active set.
  pub fn is_current(&self, name: &str) -> bool {
    self.active().iter().any(|n| n == name)
  }

  /// The partition a strategy for the given class writes into.
  ///
  /// Ignored requests never touch the cache.
  pub fn for_class(&self, class: ResourceClass) -> Option<String> {
    match class {
      ResourceClass::Api => Some(self.api()),
      ResourceClass::Image => Some(self.images()),
      ResourceClass::Static => Some(self.statics()),
      ResourceClass::Navigation | ResourceClass::Passthrough => Some(self.main()),
      ResourceClass::Ignored => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_names_embed_base_and_version() {
    let set = PartitionSet::new("jihyung", "v2.0.0");
    assert_eq!(set.main(), "jihyung-v2.0.0");
    assert_eq!(set.api(), "jihyung-v2.0.0-api");
    assert_eq!(set.images(), "jihyung-v2.0.0-images");
    assert_eq!(set.statics(), "jihyung-v2.0.0-static");
  }

  #[test]
  fn test_is_ours_matches_any_version() {
    let set = PartitionSet::new("jihyung", "v2.0.0");
    assert!(set.is_ours("jihyung-v1.0.0"));
    assert!(set.is_ours("jihyung-v1.0.0-images"));
    assert!(!set.is_ours("other-app-v1"));
  }

  #[test]
  fn test_is_current() {
    let set = PartitionSet::new("jihyung", "v2.0.0");
    assert!(set.is_current("jihyung-v2.0.0"));
    assert!(set.is_current("jihyung-v2.0.0-static"));
    assert!(!set.is_current("jihyung-v1.0.0"));
    assert!(!set.is_current("jihyung-v1.0.0-api"));
  }

  #[test]
  fn test_for_class_targets_one_partition() {
    let set = PartitionSet::new("jihyung", "v2.0.0");
    assert_eq!(set.for_class(ResourceClass::Api), Some(set.api()));
    assert_eq!(set.for_class(ResourceClass::Image), Some(set.images()));
    assert_eq!(set.for_class(ResourceClass::Static), Some(set.statics()));
    assert_eq!(set.for_class(ResourceClass::Navigation), Some(set.main()));
    assert_eq!(set.for_class(ResourceClass::Ignored), None);
  }
}
