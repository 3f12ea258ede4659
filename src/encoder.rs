//! # Embedding provider
//!
//! Joint text–image embeddings for Shutterscout.
//!
//! This module wraps a CLIP ViT-B/32 model running on Candle (pure Rust ML
//! framework). Text queries and photos are projected into the same 512-d
//! space, where cosine similarity correlates with relevance.
//!
//! ## Responsibilities
//! - **Text encoding**: Tokenizes a query and runs the CLIP text tower.
//! - **Image encoding**: Decodes, resizes and normalizes a photo, then runs
//!   the CLIP vision tower; batched variant for the index builder.
//! - **Normalization**: Every returned vector is L2-normalized, so dot
//!   products are cosine similarities.
//!
//! The model is loaded once from the Hugging Face Hub and shared read-only;
//! callers construct a [`ClipEncoder`] up front and pass it by reference.
//! Components depend on the [`TextImageEncoder`] trait so tests can swap in
//! a deterministic stub.

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::clip::{ClipConfig, ClipModel};
use hf_hub::{Repo, RepoType, api::sync::Api};
use std::error::Error;
use std::path::{Path, PathBuf};
use tokenizers::Tokenizer;

/// Text-to-vector and image-to-vector encoding into a shared space.
///
/// Implementations must return L2-normalized vectors of [`dimension`](Self::dimension)
/// length; the retriever and the index builder rely on both properties.
pub trait TextImageEncoder {
    /// Dimensionality of the embedding space.
    fn dimension(&self) -> usize;

    /// Embed a text query.
    fn encode_text(&self, text: &str) -> Result<Vec<f32>, Box<dyn Error>>;

    /// Embed a single photo from disk.
    fn encode_image(&self, path: &Path) -> Result<Vec<f32>, Box<dyn Error>>;

    /// Embed a batch of photos from disk, one vector per input, in order.
    ///
    /// The default forwards to [`encode_image`](Self::encode_image); model
    /// implementations override it to run the batch in one forward pass.
    fn encode_image_batch(&self, paths: &[PathBuf]) -> Result<Vec<Vec<f32>>, Box<dyn Error>> {
        paths.iter().map(|p| self.encode_image(p)).collect()
    }
}

/// CLIP embeddings model using Candle (pure Rust)
pub struct ClipEncoder {
    model: ClipModel,
    tokenizer: Tokenizer,
    config: ClipConfig,
    device: Device,
}

impl ClipEncoder {
    /// Load the model from Hugging Face Hub
    pub fn load() -> Result<Self, Box<dyn Error>> {
        let device = Device::Cpu;
        let model_id = "openai/clip-vit-base-patch32";
        // The safetensors conversion lives on this PR ref upstream.
        let revision = "refs/pr/15";

        // Download model files from Hugging Face
        let repo = Repo::with_revision(model_id.to_string(), RepoType::Model, revision.to_string());
        let api = Api::new()?;
        let api_repo = api.repo(repo);

        let tokenizer_filename = api_repo.get("tokenizer.json")?;
        let weights_filename = api_repo.get("model.safetensors")?;

        // Load tokenizer
        let tokenizer = Tokenizer::from_file(tokenizer_filename)
            .map_err(|e| format!("Failed to load tokenizer: {}", e))?;

        // Load weights
        let config = ClipConfig::vit_base_patch32();
        let vb =
            unsafe { VarBuilder::from_mmaped_safetensors(&[weights_filename], DType::F32, &device)? };
        let model = ClipModel::new(vb, &config)?;

        Ok(Self {
            model,
            tokenizer,
            config,
            device,
        })
    }

    /// Decode a photo and shape it for the vision tower.
    ///
    /// The photo is center-cropped to the model's input resolution and
    /// rescaled from `0..255` into `-1..1`.
    fn image_tensor(&self, path: &Path) -> Result<Tensor, Box<dyn Error>> {
        let size = self.config.image_size;
        let img = image::ImageReader::open(path)?.decode()?;
        let img = img
            .resize_to_fill(size as u32, size as u32, image::imageops::FilterType::Triangle)
            .to_rgb8()
            .into_raw();
        let tensor = Tensor::from_vec(img, (size, size, 3), &Device::Cpu)?
            .permute((2, 0, 1))?
            .to_dtype(DType::F32)?
            .affine(2. / 255., -1.)?;
        Ok(tensor.to_device(&self.device)?)
    }

    /// Run a stacked `[B, 3, H, W]` batch through the vision tower and
    /// normalize each row.
    fn image_features(&self, batch: &Tensor) -> Result<Vec<Vec<f32>>, Box<dyn Error>> {
        let features = self.model.get_image_features(batch)?;
        let rows = features.to_vec2::<f32>()?;
        Ok(rows.into_iter().map(l2_normalize).collect())
    }
}

impl TextImageEncoder for ClipEncoder {
    fn dimension(&self) -> usize {
        self.config.text_config.projection_dim
    }

    /// Encode a text query into an embedding.
    ///
    /// Tokenizes with automatic truncation at the model's context length
    /// (77 tokens for CLIP).
    fn encode_text(&self, text: &str) -> Result<Vec<f32>, Box<dyn Error>> {
        let tokens = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| format!("Tokenization error: {}", e))?;

        let mut token_ids = tokens.get_ids().to_vec();
        let max_len = self.config.text_config.max_position_embeddings;
        if token_ids.len() > max_len {
            token_ids.truncate(max_len);
        }

        let input_ids = Tensor::new(token_ids.as_slice(), &self.device)?.unsqueeze(0)?;
        let features = self.model.get_text_features(&input_ids)?;
        let vector = features.flatten_all()?.to_vec1::<f32>()?;

        Ok(l2_normalize(vector))
    }

    fn encode_image(&self, path: &Path) -> Result<Vec<f32>, Box<dyn Error>> {
        let tensor = self.image_tensor(path)?;
        let batch = Tensor::stack(&[tensor], 0)?;
        let mut rows = self.image_features(&batch)?;
        rows.pop().ok_or_else(|| "empty image batch".into())
    }

    fn encode_image_batch(&self, paths: &[PathBuf]) -> Result<Vec<Vec<f32>>, Box<dyn Error>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        let tensors = paths
            .iter()
            .map(|p| self.image_tensor(p))
            .collect::<Result<Vec<_>, _>>()?;
        let batch = Tensor::stack(&tensors, 0)?;
        self.image_features(&batch)
    }
}

/// L2 normalize an embedding vector.
///
/// A zero vector is returned unchanged rather than dividing by zero.
pub fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_produces_unit_vector() {
        let v = l2_normalize(vec![3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn normalize_leaves_zero_vector_alone() {
        assert_eq!(l2_normalize(vec![0.0, 0.0, 0.0]), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn default_batch_encoding_preserves_order() {
        struct Stub;
        impl TextImageEncoder for Stub {
            fn dimension(&self) -> usize {
                2
            }
            fn encode_text(&self, _text: &str) -> Result<Vec<f32>, Box<dyn Error>> {
                Ok(vec![1.0, 0.0])
            }
            fn encode_image(&self, path: &Path) -> Result<Vec<f32>, Box<dyn Error>> {
                let len = path.to_string_lossy().len() as f32;
                Ok(vec![len, 0.0])
            }
        }

        let paths = vec![PathBuf::from("a.jpg"), PathBuf::from("bb.jpg")];
        let rows = Stub.encode_image_batch(&paths).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0][0] < rows[1][0]);
    }
}
