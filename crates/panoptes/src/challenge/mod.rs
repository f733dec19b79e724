//! Challenge catalog, variant selection and loading.
//!
//! - `catalog`: category pools and the glyph code table
//! - `selector`: device-weighted draw without immediate repeats
//! - `media`: photo and GIF search providers
//! - `loader`: turns a kind into a materialised `ActiveChallenge`

pub mod catalog;
pub mod loader;
pub mod media;
pub mod selector;

pub use catalog::ChallengeCatalog;
pub use loader::{ActiveChallenge, ChallengeLoader, Prompt};
pub use media::{GiphyProvider, MediaProvider, PexelsProvider};
pub use selector::VariantSelector;
