//! Key/value tags and the explicit vs. default tag layering.
//!
//! Remote objects carry a single flat tag set. Locally that set is exposed
//! twice: `tags_all` is everything the remote reports (minus reserved and
//! ignored keys), while `tags` drops any entry inherited unchanged from the
//! provider-level default tags. Downstream diffing relies on being able to
//! tell those two apart.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Key prefix reserved by the provider; such tags are never exposed.
pub const RESERVED_PREFIX: &str = "aws:";

/// An ordered, key-unique tag set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyValueTags(BTreeMap<String, String>);

/// Tag keys the caller asked to never manage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoreTagsConfig {
    /// Exact keys to ignore.
    #[serde(default)]
    pub keys: Vec<String>,
    /// Key prefixes to ignore.
    #[serde(default)]
    pub key_prefixes: Vec<String>,
}

/// Tags applied to every resource unless overridden explicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DefaultTagsConfig {
    /// Default tag set.
    pub tags: KeyValueTags,
}

/// Tag settings injected into every reconciler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSettings {
    /// Provider default tags.
    pub default_tags: DefaultTagsConfig,
    /// Ignore rules.
    pub ignore_tags: IgnoreTagsConfig,
}

/// The two exposed views of a remote tag set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagViews {
    /// Explicitly configured tags.
    pub tags: KeyValueTags,
    /// All tags including inherited defaults.
    pub tags_all: KeyValueTags,
}

impl KeyValueTags {
    /// Creates an empty tag set.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Returns the number of tags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no tags.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Gets a tag value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Inserts a tag, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Iterates over the tags in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    /// Returns the underlying map.
    #[must_use]
    pub const fn as_map(&self) -> &BTreeMap<String, String> {
        &self.0
    }

    /// Drops tags carrying the provider-reserved prefix.
    #[must_use]
    pub fn ignore_reserved(self) -> Self {
        self.retain(|k, _| !k.starts_with(RESERVED_PREFIX))
    }

    /// Drops tags matched by the caller's ignore configuration.
    #[must_use]
    pub fn ignore_config(self, config: &IgnoreTagsConfig) -> Self {
        self.retain(|k, _| {
            !config.keys.iter().any(|ignored| ignored == k)
                && !config.key_prefixes.iter().any(|p| k.starts_with(p.as_str()))
        })
    }

    /// Drops tags present in the defaults with an equal value.
    ///
    /// A key that is also a default but carries a different value was set
    /// explicitly and is kept.
    #[must_use]
    pub fn remove_default_config(self, defaults: &DefaultTagsConfig) -> Self {
        self.retain(|k, v| defaults.tags.get(k) != Some(v.as_str()))
    }

    fn retain(mut self, mut keep: impl FnMut(&String, &String) -> bool) -> Self {
        self.0.retain(|k, v| keep(k, v));
        self
    }
}

impl DefaultTagsConfig {
    /// Creates a default tag configuration.
    #[must_use]
    pub const fn new(tags: KeyValueTags) -> Self {
        Self { tags }
    }

    /// Merges explicit tags over the defaults; explicit values win on collision.
    #[must_use]
    pub fn merge_tags(&self, explicit: &KeyValueTags) -> KeyValueTags {
        let mut merged = self.tags.clone();
        for (k, v) in explicit.iter() {
            merged.insert(k.clone(), v.clone());
        }
        merged
    }
}

impl TagSettings {
    /// Creates tag settings.
    #[must_use]
    pub const fn new(default_tags: DefaultTagsConfig, ignore_tags: IgnoreTagsConfig) -> Self {
        Self {
            default_tags,
            ignore_tags,
        }
    }

    /// Builds the full tag set sent on a create request.
    #[must_use]
    pub fn tags_for_create(&self, explicit: &KeyValueTags) -> KeyValueTags {
        self.default_tags.merge_tags(explicit)
    }

    /// Splits remote tags into the `tags` and `tags_all` views.
    #[must_use]
    pub fn views(&self, remote: KeyValueTags) -> TagViews {
        let tags_all = remote.ignore_reserved().ignore_config(&self.ignore_tags);
        let tags = tags_all.clone().remove_default_config(&self.default_tags);
        TagViews { tags, tags_all }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for KeyValueTags {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl From<BTreeMap<String, String>> for KeyValueTags {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}
