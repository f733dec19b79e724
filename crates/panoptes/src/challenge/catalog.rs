//! Static challenge pools: category labels and the glyph code table.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use argus_common::constants::OPTION_COUNT;
use argus_common::{ArgusError, ChallengeKind};

use crate::config::CatalogConfig;

/// A category option and the term sent to the media provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryEntry {
    pub label: String,
    pub query: String,
}

impl CategoryEntry {
    pub fn new(label: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            query: label.clone(),
            label,
        }
    }
}

/// Glyph image identifier and the code it displays
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlyphEntry {
    pub id: String,
    pub code: String,
}

/// Immutable option pools, validated once at startup
#[derive(Debug, Clone)]
pub struct ChallengeCatalog {
    image: Vec<CategoryEntry>,
    gif: Vec<CategoryEntry>,
    glyphs: Vec<GlyphEntry>,
    code_length: usize,
    glyph_asset_base: String,
}

impl ChallengeCatalog {
    pub fn new(
        image: Vec<String>,
        gif: Vec<String>,
        glyphs: BTreeMap<String, String>,
        code_length: usize,
        glyph_asset_base: impl Into<String>,
    ) -> Self {
        Self {
            image: image.into_iter().map(CategoryEntry::new).collect(),
            gif: gif.into_iter().map(CategoryEntry::new).collect(),
            glyphs: glyphs
                .into_iter()
                .map(|(id, code)| GlyphEntry { id, code })
                .collect(),
            code_length,
            glyph_asset_base: glyph_asset_base.into(),
        }
    }

    /// Build and validate the catalog for the enabled kinds.
    ///
    /// The glyph table is only read when glyph rounds are enabled.
    pub fn from_config(config: &CatalogConfig) -> Result<Self, ArgusError> {
        let glyphs = if config.enabled_kinds.contains(&ChallengeKind::GlyphCode) {
            load_glyph_table(&config.glyph_table_path)?
        } else {
            BTreeMap::new()
        };

        let catalog = Self::new(
            config.image_categories.clone(),
            config.gif_categories.clone(),
            glyphs,
            config.code_length,
            config.glyph_asset_base.clone(),
        );
        catalog.validate(&config.enabled_kinds)?;

        tracing::info!(
            image_categories = catalog.image.len(),
            gif_categories = catalog.gif.len(),
            glyphs = catalog.glyphs.len(),
            "Challenge catalog loaded"
        );

        Ok(catalog)
    }

    /// Reject pools that cannot produce a valid round
    pub fn validate(&self, enabled: &[ChallengeKind]) -> Result<(), ArgusError> {
        for kind in enabled {
            match kind {
                ChallengeKind::CategoryImage | ChallengeKind::CategoryGif => {
                    validate_pool(*kind, self.categories(*kind))?;
                }
                ChallengeKind::GlyphCode => self.validate_glyphs()?,
                ChallengeKind::ScratchReveal => {}
            }
        }
        Ok(())
    }

    fn validate_glyphs(&self) -> Result<(), ArgusError> {
        if self.code_length == 0 {
            return Err(ArgusError::Config("glyph code length must be positive".into()));
        }
        if self.glyphs.is_empty() {
            return Err(ArgusError::Config("glyph code table is empty".into()));
        }
        for glyph in &self.glyphs {
            if glyph.code.len() != self.code_length
                || !glyph.code.chars().all(|c| c.is_ascii_digit())
            {
                return Err(ArgusError::Config(format!(
                    "glyph '{}' code '{}' is not {} digits",
                    glyph.id, glyph.code, self.code_length
                )));
            }
        }
        Ok(())
    }

    /// Category pool for a category kind (empty for other kinds)
    pub fn categories(&self, kind: ChallengeKind) -> &[CategoryEntry] {
        match kind {
            ChallengeKind::CategoryImage => &self.image,
            ChallengeKind::CategoryGif => &self.gif,
            _ => &[],
        }
    }

    pub fn glyphs(&self) -> &[GlyphEntry] {
        &self.glyphs
    }

    pub fn code_length(&self) -> usize {
        self.code_length
    }

    /// Static display asset for a glyph id
    pub fn glyph_asset(&self, id: &str) -> String {
        format!("{}/{}.png", self.glyph_asset_base.trim_end_matches('/'), id)
    }
}

fn validate_pool(kind: ChallengeKind, pool: &[CategoryEntry]) -> Result<(), ArgusError> {
    if pool.len() < OPTION_COUNT {
        return Err(ArgusError::Config(format!(
            "{} pool needs at least {} labels, found {}",
            kind,
            OPTION_COUNT,
            pool.len()
        )));
    }

    let mut seen = HashSet::new();
    for entry in pool {
        if entry.label.trim().is_empty() {
            return Err(ArgusError::Config(format!("{} pool contains an empty label", kind)));
        }
        if !seen.insert(entry.label.as_str()) {
            return Err(ArgusError::Config(format!(
                "{} pool contains duplicate label '{}'",
                kind, entry.label
            )));
        }
    }
    Ok(())
}

/// Load the glyph id to code table (a flat JSON object)
pub fn load_glyph_table(path: impl AsRef<Path>) -> Result<BTreeMap<String, String>, ArgusError> {
    let path = path.as_ref();
    let data = std::fs::read_to_string(path).map_err(|e| {
        ArgusError::Config(format!("cannot read glyph table {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&data).map_err(|e| {
        ArgusError::Config(format!("cannot parse glyph table {}: {}", path.display(), e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn glyphs(items: &[(&str, &str)]) -> BTreeMap<String, String> {
        items
            .iter()
            .map(|(id, code)| (id.to_string(), code.to_string()))
            .collect()
    }

    #[test]
    fn test_valid_catalog() {
        let catalog = ChallengeCatalog::new(
            labels(&["Nature", "Food", "Art", "Space"]),
            labels(&["vehicles", "animals", "sports", "actions"]),
            glyphs(&[("ka", "4821")]),
            4,
            "/assets/glyphs/",
        );
        assert!(catalog.validate(&ChallengeKind::ALL).is_ok());
        assert_eq!(catalog.glyph_asset("ka"), "/assets/glyphs/ka.png");
        assert_eq!(catalog.categories(ChallengeKind::ScratchReveal).len(), 0);
    }

    #[test]
    fn test_undersized_pool_is_fatal() {
        let catalog = ChallengeCatalog::new(labels(&["Nature", "Food"]), vec![], glyphs(&[]), 4, "");
        let err = catalog.validate(&[ChallengeKind::CategoryImage]).unwrap_err();
        assert!(matches!(err, ArgusError::Config(_)));

        // Disabled kinds are not checked
        assert!(catalog.validate(&[ChallengeKind::ScratchReveal]).is_ok());
    }

    #[test]
    fn test_duplicate_labels_are_fatal() {
        let catalog = ChallengeCatalog::new(
            labels(&["Nature", "Food", "Art", "Nature"]),
            vec![],
            glyphs(&[]),
            4,
            "",
        );
        assert!(catalog.validate(&[ChallengeKind::CategoryImage]).is_err());
    }

    #[test]
    fn test_glyph_table_rules() {
        let empty = ChallengeCatalog::new(vec![], vec![], glyphs(&[]), 4, "");
        assert!(empty.validate(&[ChallengeKind::GlyphCode]).is_err());

        let short = ChallengeCatalog::new(vec![], vec![], glyphs(&[("ka", "482")]), 4, "");
        assert!(short.validate(&[ChallengeKind::GlyphCode]).is_err());

        let alpha = ChallengeCatalog::new(vec![], vec![], glyphs(&[("ka", "48a1")]), 4, "");
        assert!(alpha.validate(&[ChallengeKind::GlyphCode]).is_err());
    }

    #[test]
    fn test_bundled_glyph_table_is_valid() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../assets/glyphs/codes.json");
        let catalog = ChallengeCatalog::new(vec![], vec![], load_glyph_table(path).unwrap(), 4, "");
        assert!(catalog.validate(&[ChallengeKind::GlyphCode]).is_ok());
        assert!(catalog.glyphs().iter().any(|g| g.id == "ka" && g.code == "4821"));
    }

    #[test]
    fn test_load_glyph_table_from_disk() {
        let path = std::env::temp_dir().join(format!("argus-glyphs-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"ka": "4821", "kha": "1937"}"#).unwrap();

        let table = load_glyph_table(&path).unwrap();
        assert_eq!(table.get("ka").map(String::as_str), Some("4821"));
        assert_eq!(table.len(), 2);

        std::fs::remove_file(&path).unwrap();
        assert!(load_glyph_table(&path).is_err());
    }
}
