use std::path::{Path, PathBuf};

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use hf_hub::{Repo, RepoType, api::sync::ApiBuilder};
use serde::Deserialize;
use tokenizers::{EncodeInput, PaddingParams, Tokenizer, TruncationParams};

use crate::{
   embed::{Encoder, normalize_l2},
   error::{Error, Result},
};

const MODEL_FILES: [&str; 3] = ["config.json", "tokenizer.json", "model.safetensors"];
const PAD_TOKENS: [&str; 2] = ["[PAD]", "<pad>"];

pub fn select_device() -> Device {
   Device::cuda_if_available(0).unwrap_or(Device::Cpu)
}

#[derive(Deserialize)]
struct HeadConfig {
   hidden_size: usize,
}

/// Padded, tokenized batch on the model's device.
pub struct Batch {
   pub ids:      Tensor,
   pub type_ids: Tensor,
   pub mask:     Tensor,
   /// Unpadded length of every sequence.
   pub lengths:  Vec<usize>,
}

/// A BERT encoder with its tokenizer, shared by every candle-backed model.
pub struct BertBackbone {
   model:       BertModel,
   tokenizer:   Tokenizer,
   hidden_size: usize,
   device:      Device,
}

impl BertBackbone {
   /// Downloads (or reuses) `model_id` under `cache_dir` and loads it. The
   /// returned builder lets callers pick up task heads stored next to the
   /// encoder weights.
   pub fn load(
      model_id: &str,
      cache_dir: &Path,
      max_len: usize,
   ) -> Result<(Self, VarBuilder<'static>)> {
      let device = select_device();
      let model_path = Self::download_model(model_id, cache_dir)?;
      tracing::info!("loading {} from {:?}, device: {:?}", model_id, model_path, device);

      let mut tokenizer = Tokenizer::from_file(model_path.join("tokenizer.json"))
         .map_err(|e| Error::ModelLoad(format!("failed to load tokenizer: {e}")))?;
      let pad_id = PAD_TOKENS
         .iter()
         .find_map(|t| tokenizer.token_to_id(t).map(|id| (id, *t)));
      let padding = match pad_id {
         Some((pad_id, pad_token)) => {
            PaddingParams { pad_id, pad_token: pad_token.to_string(), ..Default::default() }
         },
         None => PaddingParams::default(),
      };
      tokenizer
         .with_padding(Some(padding))
         .with_truncation(Some(TruncationParams { max_length: max_len, ..Default::default() }))
         .map_err(|e| Error::ModelLoad(format!("failed to configure tokenizer: {e}")))?;

      let raw_config = std::fs::read_to_string(model_path.join("config.json"))
         .map_err(|e| Error::ModelLoad(format!("failed to read config: {e}")))?;
      let config: BertConfig = serde_json::from_str(&raw_config)
         .map_err(|e| Error::ModelLoad(format!("failed to parse config: {e}")))?;
      let head: HeadConfig = serde_json::from_str(&raw_config)?;

      let weights_path = model_path.join("model.safetensors");
      // SAFETY: the weights file lives in the model cache and is not modified
      // while mapped.
      let vb = unsafe {
         VarBuilder::from_mmaped_safetensors(&[weights_path], DTYPE, &device)
            .map_err(|e| Error::ModelLoad(format!("failed to load weights: {e}")))?
      };

      let model = BertModel::load(vb.clone(), &config)
         .map_err(|e| Error::ModelLoad(format!("failed to load model: {e}")))?;

      tracing::info!("{} loaded (hidden size {})", model_id, head.hidden_size);
      Ok((Self { model, tokenizer, hidden_size: head.hidden_size, device }, vb))
   }

   fn download_model(model_id: &str, cache_dir: &Path) -> Result<PathBuf> {
      std::fs::create_dir_all(cache_dir)
         .map_err(|e| Error::ModelLoad(format!("failed to create model cache: {e}")))?;

      let api = ApiBuilder::new()
         .with_cache_dir(cache_dir.to_path_buf())
         .build()
         .map_err(|e| Error::ModelLoad(format!("failed to initialize hf_hub API: {e}")))?;
      let repo = api.repo(Repo::new(model_id.to_string(), RepoType::Model));

      let mut paths = Vec::with_capacity(MODEL_FILES.len());
      for filename in MODEL_FILES {
         let path = repo.get(filename).map_err(|e| {
            Error::ModelLoad(format!(
               "failed to download {filename} for {model_id}: {e}. Run 'prodrank build-index' \
                with network access to fetch models."
            ))
         })?;
         paths.push(path);
      }

      paths
         .first()
         .and_then(|p| p.parent())
         .map(Path::to_path_buf)
         .ok_or_else(|| Error::ModelLoad("invalid model path".to_string()))
   }

   pub const fn hidden_size(&self) -> usize {
      self.hidden_size
   }

   /// Tokenizes single texts or `(a, b)` pairs, padded to the longest input.
   pub fn tokenize<'s, E>(&self, inputs: Vec<E>) -> Result<Batch>
   where
      E: Into<EncodeInput<'s>> + Send,
   {
      let encodings = self
         .tokenizer
         .encode_batch(inputs, true)
         .map_err(|e| Error::Embedding(format!("tokenization failed: {e}")))?;

      let batch_size = encodings.len();
      let seq_len = encodings.first().map_or(0, |e| e.len());

      let mut ids = Vec::with_capacity(batch_size * seq_len);
      let mut type_ids = Vec::with_capacity(batch_size * seq_len);
      let mut mask = Vec::with_capacity(batch_size * seq_len);
      let mut lengths = Vec::with_capacity(batch_size);

      for encoding in &encodings {
         ids.extend_from_slice(encoding.get_ids());
         type_ids.extend_from_slice(encoding.get_type_ids());
         mask.extend_from_slice(encoding.get_attention_mask());
         lengths.push(encoding.get_attention_mask().iter().filter(|m| **m == 1).count());
      }

      let shape = (batch_size, seq_len);
      Ok(Batch {
         ids: Tensor::from_vec(ids, shape, &self.device)?,
         type_ids: Tensor::from_vec(type_ids, shape, &self.device)?,
         mask: Tensor::from_vec(mask, shape, &self.device)?,
         lengths,
      })
   }

   /// Last hidden state, `[batch, seq, hidden]`.
   pub fn forward(&self, batch: &Batch) -> Result<Tensor> {
      self
         .model
         .forward(&batch.ids, &batch.type_ids, Some(&batch.mask))
         .map_err(|e| Error::Embedding(format!("forward pass failed: {e}")))
   }
}

/// Mean-pooled sentence encoder.
pub struct CandleEncoder {
   backbone:   BertBackbone,
   batch_size: usize,
}

impl CandleEncoder {
   pub fn load(model_id: &str, cache_dir: &Path, batch_size: usize) -> Result<Self> {
      let (backbone, _) = BertBackbone::load(model_id, cache_dir, 256)?;
      Ok(Self { backbone, batch_size: batch_size.max(1) })
   }

   fn encode_chunk(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
      let batch = self.backbone.tokenize(texts.iter().map(String::as_str).collect())?;
      let hidden = self.backbone.forward(&batch)?;

      let mask = batch.mask.to_dtype(DType::F32)?.unsqueeze(2)?;
      let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
      let counts = mask.sum(1)?.clamp(1e-9f32, f32::MAX)?;
      let mut pooled: Vec<Vec<f32>> = summed.broadcast_div(&counts)?.to_vec2()?;

      for row in &mut pooled {
         normalize_l2(row);
      }
      Ok(pooled)
   }
}

#[async_trait::async_trait]
impl Encoder for CandleEncoder {
   async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
      let mut out = Vec::with_capacity(texts.len());
      for chunk in texts.chunks(self.batch_size) {
         out.extend(self.encode_chunk(chunk)?);
      }
      Ok(out)
   }

   fn dim(&self) -> usize {
      self.backbone.hidden_size()
   }

   fn is_ready(&self) -> bool {
      true
   }
}
