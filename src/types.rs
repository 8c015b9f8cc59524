//! Shared post types used by the catalog, the draft, and the archive.
//!
//! Catalog posts store tags as a flat list of labels (`["T", "A", "SMOKE"]`).
//! Inside the crate every tag lives on its own axis ([`TagAxes`]) so a post can
//! never carry two sides, two sites or two utilities at once; the flat form
//! only exists at the serialization boundary.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind} label: {label:?}")]
pub struct ParseLabelError {
    pub kind: &'static str,
    pub label: String,
}

/// Declares a closed label vocabulary: an enum whose declaration order is its
/// canonical order, with `as_str`, `ALL`, `Display`, `FromStr` and string serde.
macro_rules! labels {
    ($(#[$meta:meta])* $name:ident, $kind:literal { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $label)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseLabelError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let wanted = s.trim();
                $name::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str().eq_ignore_ascii_case(wanted))
                    .ok_or_else(|| ParseLabelError {
                        kind: $kind,
                        label: s.to_string(),
                    })
            }
        }
    };
}

labels! {
    /// Team side a lineup is thrown from.
    Side, "side" { Ct => "CT", T => "T" }
}

labels! {
    /// Grenade type.
    Utility, "utility" { Smoke => "SMOKE", Molo => "MOLO", Flash => "FLASH", Nade => "NADE" }
}

labels! {
    /// Throwing technique. Declaration order is the canonical display order,
    /// so a `BTreeSet<Method>` always iterates canonically.
    Method, "method" {
        Crouch => "CROUCH",
        Jump => "JUMP",
        Throw => "THROW",
        Double => "DOUBLE",
        Walk => "WALK",
        Run => "RUN",
        WTap => "W TAP",
    }
}

/// Bombsite or map area label. Map-specific, so an open set; stored uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Site(String);

impl Site {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Site {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim();
        if label.is_empty() || !label.chars().all(|c| c.is_ascii_alphanumeric() || c == ' ') {
            return Err(ParseLabelError {
                kind: "site",
                label: s.to_string(),
            });
        }
        Ok(Site(label.to_ascii_uppercase()))
    }
}

impl TryFrom<String> for Site {
    type Error = ParseLabelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Site> for String {
    fn from(site: Site) -> Self {
        site.0
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One optional label per tag axis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagAxes {
    pub side: Option<Side>,
    pub site: Option<Site>,
    pub utility: Option<Utility>,
}

impl TagAxes {
    pub fn is_empty(&self) -> bool {
        self.side.is_none() && self.site.is_none() && self.utility.is_none()
    }

    /// Flatten to labels in axis order: side, site, utility. Absent axes are skipped.
    pub fn flatten(&self) -> Vec<String> {
        let side = self.side.map(|s| s.as_str().to_string());
        let site = self.site.as_ref().map(|s| s.as_str().to_string());
        let utility = self.utility.map(|u| u.as_str().to_string());
        [side, site, utility].into_iter().flatten().collect()
    }

    /// Split a flat label list into axes.
    ///
    /// Side and utility labels are recognized by vocabulary; everything else
    /// is taken as a site. The first label seen on an axis wins; later ones are
    /// returned as ignored.
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> (Self, Vec<String>) {
        let mut axes = TagAxes::default();
        let mut ignored = Vec::new();

        for label in labels.iter().map(AsRef::as_ref) {
            let placed = if let Ok(side) = label.parse::<Side>() {
                *axes.side.get_or_insert(side) == side
            } else if let Ok(utility) = label.parse::<Utility>() {
                *axes.utility.get_or_insert(utility) == utility
            } else if let Ok(site) = label.parse::<Site>() {
                *axes.site.get_or_insert_with(|| site.clone()) == site
            } else {
                false
            };
            if !placed {
                ignored.push(label.to_string());
            }
        }
        (axes, ignored)
    }
}

/// A finalized post as stored in the catalog.
///
/// `tags` and `method` stay as plain labels so legacy catalog entries with
/// unexpected labels still load; [`PostFields::from_post`] does the typed split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub map_id: String,
    pub title: String,
    pub images: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub method: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tip: Option<String>,
}

impl Post {
    /// Method labels in canonical order; unknown labels keep their relative
    /// order after the known ones.
    pub fn sorted_method(&self) -> Vec<String> {
        sort_method_labels(&self.method)
    }

    pub fn has_tag(&self, label: &str) -> bool {
        self.tags.iter().any(|t| t == label)
    }
}

/// Sort method labels into canonical order.
pub fn sort_method_labels<S: AsRef<str>>(labels: &[S]) -> Vec<String> {
    let mut keyed: Vec<(usize, String)> = labels
        .iter()
        .map(|l| {
            let l = l.as_ref();
            let rank = l
                .parse::<Method>()
                .map(|m| m as usize)
                .unwrap_or(Method::ALL.len());
            (rank, l.to_string())
        })
        .collect();
    keyed.sort_by_key(|(rank, _)| *rank);
    keyed.into_iter().map(|(_, l)| l).collect()
}

/// Post metadata shared by the editable draft and the finalized manifest.
///
/// The draft mutates one of these; submission validates it and hands it to
/// the archive assembler unchanged. There is no second field set to keep in sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostFields {
    pub title: String,
    pub map_id: Option<String>,
    pub method: BTreeSet<Method>,
    pub tags: TagAxes,
}

impl PostFields {
    /// Copy a catalog post's metadata. Labels that do not fit the typed model
    /// are returned so the caller can report them.
    pub fn from_post(post: &Post) -> (Self, Vec<String>) {
        let (tags, mut ignored) = TagAxes::from_labels(&post.tags);
        let mut method = BTreeSet::new();
        for label in &post.method {
            match label.parse::<Method>() {
                Ok(m) => {
                    method.insert(m);
                }
                Err(_) => ignored.push(label.clone()),
            }
        }
        let fields = PostFields {
            title: post.title.clone(),
            map_id: Some(post.map_id.clone()),
            method,
            tags,
        };
        (fields, ignored)
    }

    /// Method labels in canonical order.
    pub fn method_labels(&self) -> Vec<String> {
        self.method.iter().map(|m| m.as_str().to_string()).collect()
    }
}
