//! Deterministic in-memory embedding provider for tests (§A5).

use async_trait::async_trait;
use mk_core::traits::EmbeddingProvider as EmbeddingProviderTrait;
use std::convert::Infallible;

pub struct MockEmbeddingProvider {
    dimension: usize
}

impl MockEmbeddingProvider {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    /// Hashes `seed` into a deterministic vector so repeated calls on the
    /// same content return the same embedding and distinct content doesn't.
    fn deterministic_vector(&self, seed: &[u8]) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimension];
        let mut state: u64 = 1469598103934665603;
        for &byte in seed {
            state ^= byte as u64;
            state = state.wrapping_mul(1099511628211);
        }
        for (i, slot) in v.iter_mut().enumerate() {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let bucket = ((state >> 33) as u32) as f32 / u32::MAX as f32;
            *slot = if i == 0 { 1.0 } else { bucket * 2.0 - 1.0 };
        }
        v
    }
}

#[async_trait]
impl EmbeddingProviderTrait for MockEmbeddingProvider {
    type Error = Infallible;

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, Self::Error> {
        Ok(self.deterministic_vector(text.as_bytes()))
    }

    async fn embed_image(&self, bytes: &[u8]) -> Result<Vec<f32>, Self::Error> {
        Ok(self.deterministic_vector(bytes))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn health(&self) -> Result<(), Self::Error> {
        Ok(())
    }
}
