//! Equivalent upstream mirrors and URL templating.

use rand::Rng;

use crate::error::UpstreamError;
use crate::tile::TileIndex;

/// The OpenStreetMap tile hosts, all serving identical tiles.
pub const DEFAULT_MIRRORS: &[&str] = &[
    "https://tile.openstreetmap.org/{z}/{x}/{y}.png",
    "https://a.tile.openstreetmap.org/{z}/{x}/{y}.png",
    "https://b.tile.openstreetmap.org/{z}/{x}/{y}.png",
    "https://c.tile.openstreetmap.org/{z}/{x}/{y}.png",
];

const PLACEHOLDERS: [&str; 3] = ["{z}", "{x}", "{y}"];

/// A URL template with `{z}`, `{x}` and `{y}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mirror {
    template: String,
}

impl Mirror {
    /// Validate and wrap a template.
    pub fn new(template: impl Into<String>) -> Result<Self, UpstreamError> {
        let template = template.into();
        for placeholder in PLACEHOLDERS {
            if !template.contains(placeholder) {
                return Err(UpstreamError::InvalidTemplate(format!(
                    "{} is missing {}",
                    template, placeholder
                )));
            }
        }
        Ok(Self { template })
    }

    /// Render the URL for `tile`.
    pub fn url_for(&self, tile: TileIndex) -> String {
        self.template
            .replace("{z}", &tile.zoom.to_string())
            .replace("{x}", &tile.x.to_string())
            .replace("{y}", &tile.y.to_string())
    }

    pub fn template(&self) -> &str {
        &self.template
    }
}

/// A non-empty set of equivalent mirrors, picked uniformly at random per fetch.
#[derive(Debug, Clone)]
pub struct MirrorSet {
    mirrors: Vec<Mirror>,
}

impl MirrorSet {
    /// Build a set from templates. At least one template is required.
    pub fn new<I, T>(templates: I) -> Result<Self, UpstreamError>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let mirrors = templates
            .into_iter()
            .map(Mirror::new)
            .collect::<Result<Vec<_>, _>>()?;

        if mirrors.is_empty() {
            return Err(UpstreamError::InvalidTemplate(
                "at least one mirror is required".to_string(),
            ));
        }

        Ok(Self { mirrors })
    }

    /// The OpenStreetMap mirror set.
    pub fn openstreetmap() -> Self {
        Self {
            mirrors: DEFAULT_MIRRORS
                .iter()
                .map(|t| Mirror {
                    template: (*t).to_string(),
                })
                .collect(),
        }
    }

    /// Pick a mirror uniformly at random.
    pub fn choose(&self) -> &Mirror {
        let index = rand::rng().random_range(0..self.mirrors.len());
        &self.mirrors[index]
    }

    pub fn len(&self) -> usize {
        self.mirrors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mirrors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mirror> {
        self.mirrors.iter()
    }
}

impl Default for MirrorSet {
    fn default() -> Self {
        Self::openstreetmap()
    }
}
