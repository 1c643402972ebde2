// DANS : src/data_pipeline/mod.rs

// Enrichissement côté consommateur : les événements on-chain ne portent que
// l'URI des métadonnées, le reste (description, liens) est récupéré ici.
pub mod metadata;

pub use metadata::{MetadataFetcher, TokenMetadata, extract_github_urls};
