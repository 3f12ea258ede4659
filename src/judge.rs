//! # Relevance judge
//!
//! Secondary re-ranking pass over retrieved candidates. The judge packages
//! the query and every candidate photo into a single multimodal chat request
//! against an OpenAI-compatible endpoint and asks the model to pick the best
//! matches.
//!
//! The model is instructed to reply with a bare comma-separated list of
//! candidate numbers (1-based, best first). The reply is validated against
//! exactly that shape; anything else (prose, out-of-range numbers, an empty
//! or filtered response) yields an empty selection rather than an error.
//! Callers treat an empty selection as "ranking unavailable" and fall back
//! to the raw retrieval order.

use async_openai::{
    Client,
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestUserMessage,
        ChatCompletionRequestUserMessageContent, ChatCompletionRequestUserMessageContentPart,
        CreateChatCompletionRequestArgs, ImageUrl,
    },
};
use base64::Engine as _;
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use tracing::{debug, info};

use crate::config::ScoutConfig;

/// Chooses the most relevant candidates for a query.
///
/// Returned positions are **1-based** indices into the candidate list, best
/// match first, at most `keep` of them. An empty result means the judge
/// declined or replied unusably; it is never an error.
pub trait RelevanceJudge {
    /// Judge `images` (JPEG bytes, candidate order) against `query`.
    fn rerank(
        &self,
        query: &str,
        images: &[Vec<u8>],
        keep: usize,
    ) -> impl Future<Output = Result<Vec<usize>, Box<dyn Error>>>;
}

/// Relevance judge backed by an OpenAI-compatible multimodal chat endpoint.
///
/// The client is constructed once from configuration and reused for every
/// request; authentication is the configured static API key.
pub struct ChatJudge {
    client: Client<OpenAIConfig>,
    model: String,
}

impl ChatJudge {
    /// Creates a judge client from configuration.
    pub fn new(config: &ScoutConfig) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(config.api_key.clone())
            .with_api_base(config.api_base.clone());
        debug!("Judge client created for {}", config.api_base);
        Self {
            client: Client::with_config(openai_config),
            model: config.judge_model.clone(),
        }
    }

    fn instruction(query: &str, candidates: usize, keep: usize) -> String {
        format!(
            "Here are {candidates} images, numbered 1 to {candidates} in order. \
             Select the {keep} images most relevant to: {query}. \
             Reply with only the numbers of the selected images, comma-separated, \
             best match first. Do not write anything else."
        )
    }
}

impl RelevanceJudge for ChatJudge {
    async fn rerank(
        &self,
        query: &str,
        images: &[Vec<u8>],
        keep: usize,
    ) -> Result<Vec<usize>, Box<dyn Error>> {
        if images.is_empty() || keep == 0 {
            return Ok(Vec::new());
        }

        let mut parts: Vec<ChatCompletionRequestUserMessageContentPart> =
            vec![ChatCompletionRequestUserMessageContentPart::Text(
                ChatCompletionRequestMessageContentPartText {
                    text: Self::instruction(query, images.len(), keep),
                },
            )];
        for image in images {
            parts.push(ChatCompletionRequestUserMessageContentPart::ImageUrl(
                ChatCompletionRequestMessageContentPartImage {
                    image_url: ImageUrl {
                        url: image_data_url(image),
                        detail: None,
                    },
                },
            ));
        }

        let message = ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
            content: ChatCompletionRequestUserMessageContent::Array(parts),
            name: None,
        });

        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model.clone())
            .max_tokens(64u32)
            .messages(vec![message])
            .build()?;

        debug!("Sending rerank request for {} candidates", images.len());
        let response = self.client.chat().create(request).await?;

        let reply = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .unwrap_or_default();

        if reply.is_empty() {
            info!("Judge returned no content; ranking unavailable");
            return Ok(Vec::new());
        }

        debug!("Judge replied: {reply:?}");
        Ok(parse_selection(&reply, images.len(), keep))
    }
}

/// Encode JPEG bytes as an inline `data:` URL for a chat content part.
fn image_data_url(bytes: &[u8]) -> String {
    let b64 = base64::engine::general_purpose::STANDARD.encode(bytes);
    format!("data:image/jpeg;base64,{b64}")
}

/// The only reply shape the judge accepts: a bare comma-separated number list.
static SELECTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\d+\s*(?:,\s*\d+\s*)*$").expect("selection regex is valid"));

/// Validate a judge reply into 1-based candidate positions.
///
/// Fails closed: a reply that is not exactly a comma-separated number list,
/// or that names a position outside `1..=candidates`, yields an empty
/// selection. Duplicate positions keep their first occurrence; the result is
/// truncated to `keep`.
pub fn parse_selection(reply: &str, candidates: usize, keep: usize) -> Vec<usize> {
    if !SELECTION_RE.is_match(reply) {
        info!("Unusable judge reply: {reply:?}");
        return Vec::new();
    }

    let mut selected = Vec::new();
    for token in reply.split(',') {
        let Ok(position) = token.trim().parse::<usize>() else {
            return Vec::new();
        };
        if position == 0 || position > candidates {
            info!("Judge selected out-of-range position {position}");
            return Vec::new();
        }
        if !selected.contains(&position) {
            selected.push(position);
        }
    }
    selected.truncate(keep);
    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_list_is_accepted_in_order() {
        assert_eq!(parse_selection("2, 5, 1", 10, 5), vec![2, 5, 1]);
        assert_eq!(parse_selection("3", 3, 1), vec![3]);
    }

    #[test]
    fn prose_replies_fail_closed() {
        assert_eq!(parse_selection("Top 3: 1, 2, 3", 10, 3), Vec::<usize>::new());
        assert_eq!(parse_selection("I pick image 2.", 10, 1), Vec::<usize>::new());
        assert_eq!(parse_selection("", 10, 3), Vec::<usize>::new());
    }

    #[test]
    fn out_of_range_positions_fail_closed() {
        assert_eq!(parse_selection("1, 99", 10, 5), Vec::<usize>::new());
        assert_eq!(parse_selection("0, 1", 10, 5), Vec::<usize>::new());
    }

    #[test]
    fn duplicates_collapse_and_result_truncates() {
        assert_eq!(parse_selection("1, 1, 2, 3", 5, 2), vec![1, 2]);
    }

    #[test]
    fn data_url_is_jpeg_base64() {
        let url = image_data_url(b"abc");
        assert!(url.starts_with("data:image/jpeg;base64,"));
        assert!(url.ends_with("YWJj"));
    }
}
