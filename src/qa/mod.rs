//! Extractive question answering.
//!
//! An [`AnswerExtractor`] finds the span of a context passage that best answers
//! a question. The span decoding shared by token-classification models lives
//! here so it can be tested without model weights.

pub mod onnx;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::AnswerSpan;

/// Errors that can occur during answer extraction.
#[derive(Debug, Error)]
pub enum QaError {
    /// The context passage is empty, so there is nothing to extract from
    #[error("Context passage is empty")]
    EmptyContext,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The model or its tokenizer could not be loaded
    #[error("Answer model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Inference failed: {0}")]
    Inference(String),
}

/// Result type for answer extraction.
pub type QaResult<T> = Result<T, QaError>;

/// Trait for extractive question-answering models.
#[async_trait]
pub trait AnswerExtractor: Send + Sync {
    /// Extract the best answer to `question` from `context`.
    ///
    /// # Returns
    /// A span whose `text` is a substring of `context`
    ///
    /// # Errors
    /// * `EmptyContext` if `context` is empty or whitespace
    /// * `InvalidInput` if `question` is empty or whitespace
    async fn extract_answer(&self, question: &str, context: &str) -> QaResult<AnswerSpan>;

    /// Model identifier for logging.
    fn model_name(&self) -> &str;
}

/// Reject inputs no model can answer.
pub fn validate_inputs(question: &str, context: &str) -> QaResult<()> {
    if context.trim().is_empty() {
        return Err(QaError::EmptyContext);
    }
    if question.trim().is_empty() {
        return Err(QaError::InvalidInput("Question cannot be empty".to_string()));
    }
    Ok(())
}

/// Softmax over the entries of `logits` selected by `mask`.
///
/// Unselected entries get probability 0.
fn masked_softmax(logits: &[f32], mask: &[bool]) -> Vec<f32> {
    let max = logits
        .iter()
        .zip(mask)
        .filter(|(_, keep)| **keep)
        .map(|(l, _)| *l)
        .fold(f32::NEG_INFINITY, f32::max);

    let exps: Vec<f32> = logits
        .iter()
        .zip(mask)
        .map(|(l, keep)| if *keep { (l - max).exp() } else { 0.0 })
        .collect();
    let sum: f32 = exps.iter().sum();
    if sum <= 0.0 || !sum.is_finite() {
        return vec![0.0; logits.len()];
    }
    exps.into_iter().map(|e| e / sum).collect()
}

/// Pick the most probable answer span from start/end logits.
///
/// # Arguments
/// * `context` - The passage the offsets index into
/// * `offsets` - Byte range in `context` for each token
/// * `context_mask` - Whether each token belongs to the context
/// * `start_logits` / `end_logits` - Per-token model outputs
/// * `max_answer_len` - Longest allowed span, in tokens
///
/// # Returns
/// The span maximizing `p_start * p_end` with `start <= end` and
/// `end - start < max_answer_len`, or `None` if no context token exists
pub fn decode_best_span(
    context: &str,
    offsets: &[(usize, usize)],
    context_mask: &[bool],
    start_logits: &[f32],
    end_logits: &[f32],
    max_answer_len: usize,
) -> Option<AnswerSpan> {
    let n = offsets
        .len()
        .min(context_mask.len())
        .min(start_logits.len())
        .min(end_logits.len());
    if n == 0 || max_answer_len == 0 {
        return None;
    }
    let mask = &context_mask[..n];
    let start_probs = masked_softmax(&start_logits[..n], mask);
    let end_probs = masked_softmax(&end_logits[..n], mask);

    let mut best: Option<(usize, usize, f32)> = None;
    for start in (0..n).filter(|&i| mask[i]) {
        let last = (start + max_answer_len).min(n);
        for end in (start..last).filter(|&j| mask[j]) {
            let score = start_probs[start] * end_probs[end];
            if best.map_or(true, |(_, _, s)| score > s) {
                best = Some((start, end, score));
            }
        }
    }

    let (start_token, end_token, score) = best?;
    let start = offsets[start_token].0.min(context.len());
    let end = offsets[end_token].1.clamp(start, context.len());
    let raw = context.get(start..end)?;

    // Trim surrounding whitespace while keeping offsets aligned.
    let leading = raw.len() - raw.trim_start().len();
    let text = raw.trim();
    Some(AnswerSpan {
        text: text.to_string(),
        score: Some(score),
        start: start + leading,
        end: start + leading + text.len(),
    })
}

/// Keep the best span found across overlapping context windows.
///
/// Ties go to the span that starts first.
pub fn best_window_span(spans: impl IntoIterator<Item = AnswerSpan>) -> Option<AnswerSpan> {
    spans.into_iter().fold(None, |best, span| match best {
        Some(current) if !outranks(&span, &current) => Some(current),
        _ => Some(span),
    })
}

fn outranks(candidate: &AnswerSpan, current: &AnswerSpan) -> bool {
    let (a, b) = (candidate.score.unwrap_or(0.0), current.score.unwrap_or(0.0));
    a > b || (a == b && candidate.start < current.start)
}
