//! Challenge materialisation.
//!
//! Loading is split in two: `plan` makes every random choice synchronously
//! (options, correct answer, glyph), `resolve` performs the provider call.
//! `resolve` never fails; provider errors and timeouts degrade the round to a
//! fallback media reference or to no media at all.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use rand::seq::{IndexedRandom, SliceRandom};

use argus_common::ChallengeKind;
use argus_common::constants::OPTION_COUNT;

use super::catalog::ChallengeCatalog;
use super::media::MediaProvider;

/// What the user is asked
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    /// Pick one of the labels
    Category { options: Vec<String> },
    /// Type the code shown by the glyph
    Glyph { id: String },
    /// The scratch surface is the whole challenge
    Scratch,
}

/// The materialised challenge for one round. Replaced wholesale on refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveChallenge {
    pub kind: ChallengeKind,
    pub prompt: Prompt,
    /// None for scratch rounds, which are graded by coverage
    pub correct_answer: Option<String>,
    pub media: Option<String>,
}

impl ActiveChallenge {
    pub fn options(&self) -> &[String] {
        match &self.prompt {
            Prompt::Category { options } => options,
            _ => &[],
        }
    }

    /// Exact comparison against the correct answer
    pub fn grade(&self, response: &str) -> bool {
        self.correct_answer.as_deref() == Some(response)
    }
}

/// Random choices for a round, made before any provider call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadPlan {
    Category {
        kind: ChallengeKind,
        options: Vec<String>,
        correct: String,
        query: String,
    },
    Glyph {
        id: String,
        code: String,
        asset: String,
    },
    Scratch,
}

/// Produces an `ActiveChallenge` per kind
pub struct ChallengeLoader {
    catalog: Arc<ChallengeCatalog>,
    image_provider: Option<Arc<dyn MediaProvider>>,
    gif_provider: Option<Arc<dyn MediaProvider>>,
    image_fallback_base: Option<String>,
    fetch_timeout: Duration,
}

impl ChallengeLoader {
    pub fn new(
        catalog: Arc<ChallengeCatalog>,
        image_provider: Option<Arc<dyn MediaProvider>>,
        gif_provider: Option<Arc<dyn MediaProvider>>,
        image_fallback_base: Option<String>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            catalog,
            image_provider,
            gif_provider,
            image_fallback_base,
            fetch_timeout,
        }
    }

    pub fn catalog(&self) -> &ChallengeCatalog {
        &self.catalog
    }

    /// Make the round's random choices
    pub fn plan<R: Rng>(&self, kind: ChallengeKind, rng: &mut R) -> LoadPlan {
        match kind {
            ChallengeKind::CategoryImage | ChallengeKind::CategoryGif => {
                let pool = self.catalog.categories(kind);

                // Distinct sample, then an unbiased shuffle for display order
                let mut picked: Vec<_> = pool.choose_multiple(rng, OPTION_COUNT).collect();
                picked.shuffle(rng);

                let correct = picked.choose(rng).copied();
                LoadPlan::Category {
                    kind,
                    options: picked.iter().map(|entry| entry.label.clone()).collect(),
                    correct: correct.map(|e| e.label.clone()).unwrap_or_default(),
                    query: correct.map(|e| e.query.clone()).unwrap_or_default(),
                }
            }
            ChallengeKind::GlyphCode => {
                let glyph = self.catalog.glyphs().choose(rng);
                let id = glyph.map(|g| g.id.clone()).unwrap_or_default();
                LoadPlan::Glyph {
                    asset: self.catalog.glyph_asset(&id),
                    code: glyph.map(|g| g.code.clone()).unwrap_or_default(),
                    id,
                }
            }
            ChallengeKind::ScratchReveal => LoadPlan::Scratch,
        }
    }

    /// Fetch media for the plan. Always returns a usable challenge.
    pub async fn resolve(&self, plan: LoadPlan) -> ActiveChallenge {
        match plan {
            LoadPlan::Category {
                kind,
                options,
                correct,
                query,
            } => {
                let media = match self.fetch_media(kind, &query).await {
                    Some(url) => Some(url),
                    None => self.fallback_media(kind, &query),
                };
                ActiveChallenge {
                    kind,
                    prompt: Prompt::Category { options },
                    correct_answer: Some(correct),
                    media,
                }
            }
            other => self.degraded(other),
        }
    }

    /// Build the challenge without contacting any provider
    pub fn degraded(&self, plan: LoadPlan) -> ActiveChallenge {
        match plan {
            LoadPlan::Category {
                kind,
                options,
                correct,
                query,
            } => ActiveChallenge {
                kind,
                prompt: Prompt::Category { options },
                correct_answer: Some(correct),
                media: self.fallback_media(kind, &query),
            },
            LoadPlan::Glyph { id, code, asset } => ActiveChallenge {
                kind: ChallengeKind::GlyphCode,
                prompt: Prompt::Glyph { id },
                correct_answer: Some(code),
                media: Some(asset),
            },
            LoadPlan::Scratch => ActiveChallenge {
                kind: ChallengeKind::ScratchReveal,
                prompt: Prompt::Scratch,
                correct_answer: None,
                media: None,
            },
        }
    }

    async fn fetch_media(&self, kind: ChallengeKind, query: &str) -> Option<String> {
        let provider = match kind {
            ChallengeKind::CategoryImage => self.image_provider.as_ref()?,
            ChallengeKind::CategoryGif => self.gif_provider.as_ref()?,
            _ => return None,
        };

        match tokio::time::timeout(self.fetch_timeout, provider.fetch(query)).await {
            Ok(Ok(url)) => Some(url),
            Ok(Err(e)) => {
                tracing::warn!(
                    provider = provider.name(),
                    query = %query,
                    error = %e,
                    "Media fetch failed, degrading round"
                );
                None
            }
            Err(_) => {
                tracing::warn!(
                    provider = provider.name(),
                    query = %query,
                    timeout_ms = self.fetch_timeout.as_millis() as u64,
                    "Media fetch timed out, degrading round"
                );
                None
            }
        }
    }

    /// Deterministic alternate keyed by the category. GIF rounds have none.
    fn fallback_media(&self, kind: ChallengeKind, query: &str) -> Option<String> {
        match kind {
            ChallengeKind::CategoryImage => self
                .image_fallback_base
                .as_ref()
                .map(|base| format!("{}?{}", base, urlencoding::encode(query))),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::media::fakes::{FailingProvider, HangingProvider, StaticProvider};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::{BTreeMap, HashSet};
    use std::sync::atomic::Ordering;

    fn catalog() -> Arc<ChallengeCatalog> {
        let image = ["Nature", "Technology", "Animals", "Architecture", "Food", "Sports"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let gif = ["vehicles", "animals", "sports", "buildings", "cartoons", "actions"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut glyphs = BTreeMap::new();
        glyphs.insert("ka".to_string(), "4821".to_string());
        Arc::new(ChallengeCatalog::new(image, gif, glyphs, 4, "/assets/glyphs"))
    }

    fn loader(
        image: Option<Arc<dyn MediaProvider>>,
        gif: Option<Arc<dyn MediaProvider>>,
    ) -> ChallengeLoader {
        ChallengeLoader::new(
            catalog(),
            image,
            gif,
            Some("https://fallback.example/featured/".to_string()),
            Duration::from_millis(200),
        )
    }

    #[test]
    fn test_category_plan_has_four_distinct_options() {
        let loader = loader(None, None);
        let mut rng = StdRng::seed_from_u64(11);

        for _ in 0..200 {
            match loader.plan(ChallengeKind::CategoryImage, &mut rng) {
                LoadPlan::Category { options, correct, query, .. } => {
                    assert_eq!(options.len(), 4);
                    let distinct: HashSet<_> = options.iter().collect();
                    assert_eq!(distinct.len(), 4);
                    assert!(options.contains(&correct));
                    assert_eq!(query, correct);
                }
                other => panic!("unexpected plan {:?}", other),
            }
        }
    }

    #[test]
    fn test_correct_answer_position_is_spread() {
        let loader = loader(None, None);
        let mut rng = StdRng::seed_from_u64(12);
        let mut positions = [0usize; 4];

        for _ in 0..4_000 {
            if let LoadPlan::Category { options, correct, .. } =
                loader.plan(ChallengeKind::CategoryGif, &mut rng)
            {
                let idx = options.iter().position(|o| *o == correct).unwrap();
                positions[idx] += 1;
            }
        }
        for count in positions {
            assert!(count > 800 && count < 1_200, "positions {:?}", positions);
        }
    }

    #[tokio::test]
    async fn test_resolve_uses_provider() {
        let provider = StaticProvider::new("https://media/");
        let loader = loader(Some(provider.clone()), None);
        let mut rng = StdRng::seed_from_u64(13);

        let plan = loader.plan(ChallengeKind::CategoryImage, &mut rng);
        let challenge = loader.resolve(plan).await;

        let correct = challenge.correct_answer.clone().unwrap();
        assert_eq!(challenge.media, Some(format!("https://media/{}", correct)));
        assert_eq!(challenge.options().len(), 4);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_image_failure_falls_back() {
        let loader = loader(Some(Arc::new(FailingProvider)), None);
        let plan = LoadPlan::Category {
            kind: ChallengeKind::CategoryImage,
            options: vec!["Nature".into(), "Food".into(), "Art".into(), "Space".into()],
            correct: "Space Art".into(),
            query: "Space Art".into(),
        };
        let challenge = loader.resolve(plan).await;
        assert_eq!(
            challenge.media.as_deref(),
            Some("https://fallback.example/featured/?Space%20Art")
        );
    }

    #[tokio::test]
    async fn test_gif_failure_has_no_media() {
        let loader = loader(None, Some(Arc::new(FailingProvider)));
        let mut rng = StdRng::seed_from_u64(14);
        let plan = loader.plan(ChallengeKind::CategoryGif, &mut rng);
        let challenge = loader.resolve(plan).await;
        assert_eq!(challenge.media, None);
        assert!(challenge.correct_answer.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_provider_times_out() {
        let loader = loader(Some(Arc::new(HangingProvider)), None);
        let mut rng = StdRng::seed_from_u64(15);
        let plan = loader.plan(ChallengeKind::CategoryImage, &mut rng);
        let challenge = loader.resolve(plan).await;
        assert!(challenge.media.unwrap().starts_with("https://fallback.example/"));
    }

    #[tokio::test]
    async fn test_glyph_and_scratch() {
        let loader = loader(None, None);
        let mut rng = StdRng::seed_from_u64(16);

        let glyph = loader.resolve(loader.plan(ChallengeKind::GlyphCode, &mut rng)).await;
        assert_eq!(glyph.prompt, Prompt::Glyph { id: "ka".into() });
        assert_eq!(glyph.media.as_deref(), Some("/assets/glyphs/ka.png"));
        assert!(glyph.grade("4821"));
        assert!(!glyph.grade("4820"));

        let scratch = loader.resolve(loader.plan(ChallengeKind::ScratchReveal, &mut rng)).await;
        assert_eq!(scratch.prompt, Prompt::Scratch);
        assert!(!scratch.grade(""));
    }
}
