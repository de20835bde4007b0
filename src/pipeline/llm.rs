//! Enrichment: expand word tokens into full records with one LLM call.
//!
//! All tokens go out in a single request together with a strict schema
//! instruction; the reply is cleaned and validated by
//! [`crate::pipeline::postprocess`]. There is exactly one attempt per
//! generate action; a failure leaves the caller's state untouched.
//!
//! The service sits behind [`CompletionBackend`] so that the client can be
//! driven by `edgequake-llm` in production and by a canned backend in tests.

use crate::cancel::CancelToken;
use crate::config::CardConfig;
use crate::error::CardError;
use crate::pipeline::postprocess;
use crate::prompts::{enrichment_request, DEFAULT_SYSTEM_PROMPT};
use crate::record::WordRecord;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Default model per provider when none is configured.
const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4.1-nano";

/// A text-completion service: system prompt + user message in, text out.
pub trait CompletionBackend: Send + Sync {
    /// Name used in logs and error messages.
    fn name(&self) -> &str;

    fn complete<'a>(
        &'a self,
        system: &'a str,
        user: &'a str,
    ) -> BoxFuture<'a, Result<String, CardError>>;
}

/// [`CompletionBackend`] over any `edgequake-llm` provider.
pub struct LlmBackend {
    name: String,
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
}

impl LlmBackend {
    pub fn new(name: impl Into<String>, provider: Arc<dyn LLMProvider>, config: &CardConfig) -> Self {
        Self {
            name: name.into(),
            provider,
            options: build_options(config),
        }
    }
}

impl CompletionBackend for LlmBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn complete<'a>(
        &'a self,
        system: &'a str,
        user: &'a str,
    ) -> BoxFuture<'a, Result<String, CardError>> {
        Box::pin(async move {
            let messages = vec![ChatMessage::system(system), ChatMessage::user(user)];
            let response = self
                .provider
                .chat(&messages, Some(&self.options))
                .await
                .map_err(|e| CardError::ServiceUnavailable {
                    provider: self.name.clone(),
                    detail: e.to_string(),
                })?;
            debug!(
                "{}: {} input tokens, {} output tokens",
                self.name, response.prompt_tokens, response.completion_tokens
            );
            Ok(response.content)
        })
    }
}

/// Sends token lists to a [`CompletionBackend`] and validates the reply.
pub struct EnrichmentClient {
    backend: Arc<dyn CompletionBackend>,
    system_prompt: String,
    timeout: Duration,
}

impl EnrichmentClient {
    pub fn new(backend: Arc<dyn CompletionBackend>, config: &CardConfig) -> Self {
        Self {
            backend,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }

    /// Build a client from the configured backend or the environment.
    pub fn from_config(config: &CardConfig) -> Result<Self, CardError> {
        Ok(Self::new(resolve_backend(config)?, config))
    }

    /// Expand `tokens` into records with a single request.
    ///
    /// The number of records is not forced to match the number of tokens;
    /// a mismatch is logged and the records are returned as received. The
    /// one exception is a reply with no displayable record at all (`[]`, or
    /// only blank objects): that is `MalformedResponse`, since there would be
    /// no card to show.
    pub async fn enrich(
        &self,
        tokens: &[String],
        cancel: &CancelToken,
    ) -> Result<Vec<WordRecord>, CardError> {
        if tokens.is_empty() {
            return Err(CardError::validation("nothing to generate"));
        }
        let start = Instant::now();
        info!("Enriching {} words via {}", tokens.len(), self.backend.name());

        let user = enrichment_request(tokens);
        let call = self.backend.complete(&self.system_prompt, &user);
        let raw = match cancel.run(tokio::time::timeout(self.timeout, call)).await? {
            Ok(result) => result?,
            Err(_) => {
                return Err(CardError::ServiceUnavailable {
                    provider: self.backend.name().to_string(),
                    detail: format!("no reply within {}s", self.timeout.as_secs()),
                })
            }
        };

        let records = postprocess::parse_records(&raw)?;
        if records.len() != tokens.len() {
            warn!(
                "Requested {} words but received {} records; keeping the reply as-is",
                tokens.len(),
                records.len()
            );
        }
        info!(
            "Enriched {} records in {}ms",
            records.len(),
            start.elapsed().as_millis()
        );
        Ok(records)
    }
}

/// Build `CompletionOptions` from the card config.
fn build_options(config: &CardConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

fn create_backend(
    provider_name: &str,
    model: &str,
    config: &CardConfig,
) -> Result<Arc<dyn CompletionBackend>, CardError> {
    let provider = ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        CardError::ServiceUnavailable {
            provider: provider_name.to_string(),
            detail: format!("{e}"),
        }
    })?;
    Ok(Arc::new(LlmBackend::new(
        format!("{provider_name}/{model}"),
        provider,
        config,
    )))
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Resolve the completion backend, from most-specific to least-specific.
///
/// 1. **Pre-built backend** (`config.backend`), used as-is.
/// 2. **Named provider** (`config.provider_name`) with `config.model`.
/// 3. **Environment pair** `LEXICARD_LLM_PROVIDER` + `LEXICARD_MODEL`.
/// 4. **Gemini** when `GEMINI_API_KEY` is set, then **OpenAI** when
///    `OPENAI_API_KEY` is set.
/// 5. **Full auto-detection** via `ProviderFactory::from_env`.
///
/// A missing credential surfaces as [`CardError::ServiceUnavailable`]; it
/// only matters for enrichment, never for hand-typed cards.
pub fn resolve_backend(config: &CardConfig) -> Result<Arc<dyn CompletionBackend>, CardError> {
    if let Some(ref backend) = config.backend {
        return Ok(Arc::clone(backend));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(match name.as_str() {
            "gemini" => DEFAULT_GEMINI_MODEL,
            _ => DEFAULT_OPENAI_MODEL,
        });
        return create_backend(name, model, config);
    }

    if let (Some(prov), Some(model)) = (
        env_non_empty("LEXICARD_LLM_PROVIDER"),
        env_non_empty("LEXICARD_MODEL"),
    ) {
        return create_backend(&prov, &model, config);
    }

    if env_non_empty("GEMINI_API_KEY").is_some() {
        let model = config.model.as_deref().unwrap_or(DEFAULT_GEMINI_MODEL);
        return create_backend("gemini", model, config);
    }

    if env_non_empty("OPENAI_API_KEY").is_some() {
        let model = config.model.as_deref().unwrap_or(DEFAULT_OPENAI_MODEL);
        return create_backend("openai", model, config);
    }

    let (provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| CardError::ServiceUnavailable {
            provider: "auto".to_string(),
            detail: format!(
                "no API key found in the environment.\n\
                Set GEMINI_API_KEY, OPENAI_API_KEY or ANTHROPIC_API_KEY.\n\
                Error: {e}"
            ),
        })?;
    Ok(Arc::new(LlmBackend::new("auto", provider, config)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct CannedBackend {
        reply: Result<String, String>,
        seen: Mutex<Vec<String>>,
    }

    impl CompletionBackend for CannedBackend {
        fn name(&self) -> &str {
            "canned"
        }

        fn complete<'a>(
            &'a self,
            _system: &'a str,
            user: &'a str,
        ) -> BoxFuture<'a, Result<String, CardError>> {
            self.seen.lock().unwrap().push(user.to_string());
            let reply = self.reply.clone();
            Box::pin(async move {
                reply.map_err(|detail| CardError::ServiceUnavailable {
                    provider: "canned".into(),
                    detail,
                })
            })
        }
    }

    fn client(reply: Result<&str, &str>) -> (EnrichmentClient, Arc<CannedBackend>) {
        let backend = Arc::new(CannedBackend {
            reply: reply.map(str::to_string).map_err(str::to_string),
            seen: Mutex::new(Vec::new()),
        });
        let c = EnrichmentClient::new(backend.clone(), &CardConfig::default());
        (c, backend)
    }

    fn tokens(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn build_options_defaults() {
        let opts = build_options(&CardConfig::default());
        assert_eq!(opts.temperature, Some(0.2));
        assert_eq!(opts.max_tokens, Some(4096));
    }

    #[tokio::test]
    async fn one_request_for_all_tokens() {
        let (c, backend) = client(Ok(
            r#"[{"englishTerm":"apple","chineseTranslation":"苹果"},{"englishTerm":"kiwi","chineseTranslation":"猕猴桃"}]"#,
        ));
        let records = c
            .enrich(&tokens(&["apple", "kiwi"]), &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].contains("apple") && seen[0].contains("kiwi"));
    }

    #[tokio::test]
    async fn shorter_reply_accepted() {
        let (c, _) = client(Ok(r#"```json
[{"englishTerm":"apple"}]
```"#));
        let records = c
            .enrich(&tokens(&["apple", "kiwi", "fig"]), &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn reply_without_displayable_records_is_malformed() {
        for reply in ["[]", r#"[{"englishTerm":" ","chineseTranslation":""}]"#] {
            let (c, _) = client(Ok(reply));
            let err = c
                .enrich(&tokens(&["apple"]), &CancelToken::new())
                .await
                .unwrap_err();
            assert!(matches!(err, CardError::MalformedResponse { .. }), "{reply}");
        }
    }

    #[tokio::test]
    async fn non_array_is_malformed() {
        let (c, _) = client(Ok(r#"{"englishTerm":"apple"}"#));
        let err = c
            .enrich(&tokens(&["apple"]), &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CardError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn backend_failure_is_service_unavailable() {
        let (c, _) = client(Err("connection refused"));
        let err = c
            .enrich(&tokens(&["apple"]), &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CardError::ServiceUnavailable { .. }));
    }

    #[tokio::test]
    async fn cancelled_before_call() {
        let (c, backend) = client(Ok("[]"));
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = c.enrich(&tokens(&["apple"]), &cancel).await.unwrap_err();
        assert!(matches!(err, CardError::Cancelled));
        // `complete` builds the future eagerly but it is never awaited.
        assert!(backend.seen.lock().unwrap().len() <= 1);
    }

    #[tokio::test]
    async fn empty_tokens_rejected() {
        let (c, backend) = client(Ok("[]"));
        let err = c.enrich(&[], &CancelToken::new()).await.unwrap_err();
        assert!(matches!(err, CardError::Validation { .. }));
        assert!(backend.seen.lock().unwrap().is_empty());
    }
}
