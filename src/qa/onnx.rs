//! ONNX Runtime answer extractor.
//!
//! Runs a SQuAD-style span-prediction model (for example
//! `distilbert-base-cased-distilled-squad` exported with its `tokenizer.json`)
//! and decodes the answer with [`decode_best_span`]. Contexts longer than one
//! model window are split into overlapping windows and the best span over all
//! of them is returned.

use async_trait::async_trait;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::{Session, SessionInputValue};
use ort::value::Tensor;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokenizers::{Encoding, PostProcessor, Tokenizer, TruncationParams, TruncationStrategy};
use tracing::{debug, info};

use super::{best_window_span, decode_best_span, validate_inputs, AnswerExtractor, QaError, QaResult};
use crate::models::AnswerSpan;

/// Extractive QA model served by ONNX Runtime.
///
/// Inference is CPU-bound and runs on the blocking thread pool.
pub struct OnnxAnswerExtractor {
    model: Arc<QaModel>,
    model_name: String,
}

struct QaModel {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    max_answer_len: usize,
    max_sequence_len: usize,
    doc_stride: usize,
}

impl OnnxAnswerExtractor {
    /// Load the model and tokenizer from disk.
    ///
    /// This is blocking and may take a while for large models.
    ///
    /// # Arguments
    /// * `model_path` - ONNX model with `start_logits`/`end_logits` outputs
    /// * `tokenizer_path` - Matching HuggingFace `tokenizer.json`
    /// * `max_answer_len` - Longest answer, in tokens
    /// * `max_sequence_len` - Token budget for question plus context per window
    /// * `doc_stride` - Context tokens repeated between consecutive windows
    ///
    /// # Errors
    /// Returns `QaError::ModelUnavailable` if either file cannot be loaded or
    /// `doc_stride` does not fit in a window
    pub fn load(
        model_path: &Path,
        tokenizer_path: &Path,
        max_answer_len: usize,
        max_sequence_len: usize,
        doc_stride: usize,
    ) -> QaResult<Self> {
        if doc_stride >= max_sequence_len {
            return Err(QaError::ModelUnavailable(format!(
                "doc_stride {} must be smaller than max_sequence_len {}",
                doc_stride, max_sequence_len
            )));
        }

        let mut tokenizer = Tokenizer::from_file(tokenizer_path).map_err(|e| {
            QaError::ModelUnavailable(format!(
                "Failed to load tokenizer {}: {}",
                tokenizer_path.display(),
                e
            ))
        })?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: max_sequence_len,
                strategy: TruncationStrategy::OnlySecond,
                stride: doc_stride,
                ..Default::default()
            }))
            .map_err(|e| QaError::ModelUnavailable(format!("Invalid truncation settings: {}", e)))?;
        tokenizer.with_padding(None);

        let session = Session::builder()
            .map_err(|e| model_error(model_path, e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| model_error(model_path, e))?
            .commit_from_file(model_path)
            .map_err(|e| model_error(model_path, e))?;

        let model_name = model_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "onnx-qa".to_string());

        info!(
            model = %model_name,
            max_answer_len,
            max_sequence_len,
            doc_stride,
            "answer model loaded"
        );

        Ok(Self {
            model: Arc::new(QaModel {
                session: Mutex::new(session),
                tokenizer,
                max_answer_len,
                max_sequence_len,
                doc_stride,
            }),
            model_name,
        })
    }
}

fn model_error(path: &Path, e: impl std::fmt::Display) -> QaError {
    QaError::ModelUnavailable(format!("Failed to load ONNX model {}: {}", path.display(), e))
}

fn inference_error(e: impl std::fmt::Display) -> QaError {
    QaError::Inference(e.to_string())
}

impl QaModel {
    fn extract(&self, question: &str, context: &str) -> QaResult<AnswerSpan> {
        self.check_question_fits(question)?;

        let encoding = self
            .tokenizer
            .encode((question, context), true)
            .map_err(inference_error)?;

        let windows: Vec<&Encoding> = std::iter::once(&encoding)
            .chain(encoding.get_overflowing())
            .collect();
        let mut spans = Vec::with_capacity(windows.len());
        for window in &windows {
            if let Some(span) = self.decode_window(window, context)? {
                spans.push(span);
            }
        }
        debug!(windows = windows.len(), "answer windows decoded");

        best_window_span(spans)
            .ok_or_else(|| QaError::Inference("no answer span in context".to_string()))
    }

    /// The question must leave room for a context window wider than the stride.
    fn check_question_fits(&self, question: &str) -> QaResult<()> {
        let question_tokens = self
            .tokenizer
            .encode(question, false)
            .map(|encoding| encoding.len())
            .unwrap_or(usize::MAX);
        let special_tokens = self
            .tokenizer
            .get_post_processor()
            .map_or(0, |processor| processor.added_tokens(true));

        let budget = self
            .max_sequence_len
            .saturating_sub(question_tokens.saturating_add(special_tokens));
        if budget <= self.doc_stride {
            return Err(QaError::InvalidInput(format!(
                "question is too long for a {}-token window",
                self.max_sequence_len
            )));
        }
        Ok(())
    }

    fn decode_window(&self, window: &Encoding, context: &str) -> QaResult<Option<AnswerSpan>> {
        let len = window.get_ids().len();
        let as_i64 = |values: &[u32]| values.iter().map(|&v| i64::from(v)).collect::<Vec<i64>>();
        let ids = as_i64(window.get_ids());
        let attention = as_i64(window.get_attention_mask());
        let type_ids = as_i64(window.get_type_ids());

        let context_mask: Vec<bool> = window
            .get_sequence_ids()
            .iter()
            .zip(window.get_special_tokens_mask())
            .map(|(seq, special)| *seq == Some(1) && *special == 0)
            .collect();

        let mut session = self
            .session
            .lock()
            .map_err(|_| QaError::Inference("answer session lock poisoned".to_string()))?;

        // DistilBERT exports have no token_type_ids input, BERT exports do.
        let mut inputs: Vec<(String, SessionInputValue<'static>)> = Vec::new();
        for input in &session.inputs {
            let data = match input.name.as_str() {
                "input_ids" => ids.clone(),
                "attention_mask" => attention.clone(),
                "token_type_ids" => type_ids.clone(),
                other => {
                    return Err(QaError::Inference(format!("unexpected model input '{}'", other)))
                }
            };
            let tensor = Tensor::from_array(([1usize, len], data)).map_err(inference_error)?;
            inputs.push((input.name.clone(), tensor.into()));
        }

        let outputs = session.run(inputs).map_err(inference_error)?;
        let logits = |name: &str| -> QaResult<Vec<f32>> {
            let value = outputs
                .get(name)
                .ok_or_else(|| QaError::Inference(format!("model has no '{}' output", name)))?;
            let (_, data) = value.try_extract_tensor::<f32>().map_err(inference_error)?;
            Ok(data.to_vec())
        };
        let start_logits = logits("start_logits")?;
        let end_logits = logits("end_logits")?;

        Ok(decode_best_span(
            context,
            window.get_offsets(),
            &context_mask,
            &start_logits,
            &end_logits,
            self.max_answer_len,
        ))
    }
}

#[async_trait]
impl AnswerExtractor for OnnxAnswerExtractor {
    async fn extract_answer(&self, question: &str, context: &str) -> QaResult<AnswerSpan> {
        validate_inputs(question, context)?;

        let model = Arc::clone(&self.model);
        let question = question.to_string();
        let context = context.to_string();
        tokio::task::spawn_blocking(move || model.extract(&question, &context))
            .await
            .map_err(|e| QaError::Inference(format!("answer task failed: {}", e)))?
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

impl std::fmt::Debug for OnnxAnswerExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxAnswerExtractor")
            .field("model_name", &self.model_name)
            .field("max_answer_len", &self.model.max_answer_len)
            .field("max_sequence_len", &self.model.max_sequence_len)
            .field("doc_stride", &self.model.doc_stride)
            .finish()
    }
}
