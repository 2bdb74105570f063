use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

use super::{BatchTranslator, TranslateError, TranslateFuture};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub(crate) const DEFAULT_MODEL: &str = "gpt-4o-mini";
const TOOL_NAME: &str = "deliver_translations";

/// OpenAI-compatible chat-completions client that returns translations
/// through a forced tool call.
#[derive(Debug, Clone)]
pub struct ChatTranslator {
    client: reqwest::Client,
    key: String,
    model: String,
    base_url: String,
    target_language: String,
}

impl ChatTranslator {
    pub fn new(key: impl Into<String>, target_language: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            key: key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            target_language: target_language.into(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        if !model.trim().is_empty() {
            self.model = model;
        }
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        if !base_url.trim().is_empty() {
            self.base_url = base_url.trim_end_matches('/').to_string();
        }
        self
    }

    fn request_body(&self, texts: &[String]) -> Value {
        let system = format!(
            "You translate manga speech bubbles into {lang}. \
             Keep the tone of spoken dialogue and keep sound effects short. \
             Return exactly one translation per input string, in the same order, \
             by calling {tool}.",
            lang = self.target_language,
            tool = TOOL_NAME
        );
        let user = serde_json::to_string(texts).unwrap_or_else(|_| "[]".to_string());
        json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user}
            ],
            "tools": [
                {
                    "type": "function",
                    "function": {
                        "name": TOOL_NAME,
                        "description": "Deliver the translated bubble texts.",
                        "parameters": {
                            "type": "object",
                            "properties": {
                                "translations": {
                                    "type": "array",
                                    "items": {"type": "string"}
                                }
                            },
                            "required": ["translations"]
                        }
                    }
                }
            ],
            "tool_choice": {"type": "function", "function": {"name": TOOL_NAME}}
        })
    }

    async fn call(&self, texts: &[String]) -> Result<Vec<String>, TranslateError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!("sending {} bubbles to {} ({})", texts.len(), url, self.model);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.key)
            .json(&self.request_body(texts))
            .send()
            .await
            .map_err(|err| TranslateError::Request(err.to_string()))?;

        let status = response.status();
        let headers = response.headers().clone();
        let text = response.text().await.unwrap_or_default();
        if status.is_success() {
            return extract_translations(&text);
        }
        Err(failure_from_response(status, &headers, &text))
    }
}

impl BatchTranslator for ChatTranslator {
    fn name(&self) -> &str {
        "OpenAI"
    }

    fn translate_batch<'a>(&'a self, texts: &'a [String]) -> TranslateFuture<'a> {
        Box::pin(self.call(texts))
    }
}

fn extract_translations(text: &str) -> Result<Vec<String>, TranslateError> {
    let payload: ChatResponse = serde_json::from_str(text)
        .map_err(|err| TranslateError::InvalidResponse(format!("response JSON: {}", err)))?;
    let tool_call = payload
        .choices
        .first()
        .and_then(|choice| choice.message.tool_calls.first())
        .ok_or_else(|| TranslateError::InvalidResponse("no tool call returned".to_string()))?;
    if tool_call.function.name != TOOL_NAME {
        return Err(TranslateError::InvalidResponse(format!(
            "unexpected tool name '{}'",
            tool_call.function.name
        )));
    }
    let args: ToolArguments = serde_json::from_str(&tool_call.function.arguments)
        .map_err(|err| TranslateError::InvalidResponse(format!("tool arguments: {}", err)))?;
    Ok(args.translations)
}

/// 429, 503 and `rate_limit_*` error codes are throttling; a numeric
/// `Retry-After` header is passed on to the retry loop.
fn failure_from_response(status: StatusCode, headers: &HeaderMap, body: &str) -> TranslateError {
    let detail = extract_openai_error(body);
    let throttled = matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE
    ) || detail
        .as_deref()
        .is_some_and(|detail| detail.contains("code: rate_limit"));
    if throttled {
        let retry_after = headers
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        return TranslateError::RateLimited { retry_after };
    }
    TranslateError::Request(format!(
        "OpenAI API error ({}): {}",
        status,
        detail.unwrap_or_else(|| body.to_string())
    ))
}

fn extract_openai_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<OpenAIError>,
    }

    #[derive(Deserialize)]
    struct OpenAIError {
        message: Option<String>,
        code: Option<String>,
    }

    let error = serde_json::from_str::<ErrorBody>(body).ok()?.error?;
    let mut parts = Vec::new();
    if let Some(message) = error.message.filter(|m| !m.trim().is_empty()) {
        parts.push(message);
    }
    if let Some(code) = error.code.filter(|c| !c.trim().is_empty()) {
        parts.push(format!("code: {}", code));
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" | "))
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    function: FunctionCall,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ToolArguments {
    translations: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_translations_from_tool_call() {
        let payload = include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/tests/fixtures/chat_tool_response.json"
        ));
        let translations = extract_translations(payload).unwrap();
        assert_eq!(translations, vec!["Hello!", "See you tomorrow."]);
    }

    #[test]
    fn missing_tool_call_is_invalid() {
        let err = extract_translations(r#"{"choices": [{"message": {"content": "hi"}}]}"#)
            .unwrap_err();
        assert!(matches!(err, TranslateError::InvalidResponse(_)));
    }

    #[test]
    fn request_forces_the_translation_tool() {
        let translator = ChatTranslator::new("key", "English")
            .with_model("gpt-test")
            .with_base_url("http://localhost:9/v1/");
        let body = translator.request_body(&["こんにちは".to_string()]);
        assert_eq!(body["model"], "gpt-test");
        assert_eq!(body["tool_choice"]["function"]["name"], TOOL_NAME);
        assert_eq!(body["messages"][1]["content"], r#"["こんにちは"]"#);
        assert!(
            body["messages"][0]["content"]
                .as_str()
                .unwrap()
                .contains("into English")
        );
        assert_eq!(translator.base_url, "http://localhost:9/v1");
    }

    #[test]
    fn formats_api_errors() {
        let body = r#"{"error": {"message": "Incorrect API key", "code": "invalid_api_key"}}"#;
        assert_eq!(
            extract_openai_error(body).as_deref(),
            Some("Incorrect API key | code: invalid_api_key")
        );
        assert_eq!(extract_openai_error("not json"), None);
    }

    #[test]
    fn throttling_responses_are_rate_limited() {
        let mut headers = HeaderMap::new();
        let err = failure_from_response(StatusCode::TOO_MANY_REQUESTS, &headers, "");
        assert!(matches!(err, TranslateError::RateLimited { retry_after: None }));

        headers.insert(RETRY_AFTER, "7".parse().unwrap());
        let err = failure_from_response(StatusCode::SERVICE_UNAVAILABLE, &headers, "");
        assert!(matches!(
            err,
            TranslateError::RateLimited { retry_after: Some(wait) } if wait == Duration::from_secs(7)
        ));

        let body = r#"{"error": {"message": "slow down", "code": "rate_limit_exceeded"}}"#;
        let err = failure_from_response(StatusCode::BAD_REQUEST, &HeaderMap::new(), body);
        assert!(matches!(err, TranslateError::RateLimited { .. }));

        headers.insert(RETRY_AFTER, "soon".parse().unwrap());
        let err = failure_from_response(StatusCode::TOO_MANY_REQUESTS, &headers, "");
        assert!(matches!(err, TranslateError::RateLimited { retry_after: None }));
    }

    #[test]
    fn other_api_errors_are_request_failures() {
        let body = r#"{"error": {"message": "Incorrect API key", "code": "invalid_api_key"}}"#;
        let err = failure_from_response(StatusCode::UNAUTHORIZED, &HeaderMap::new(), body);
        let TranslateError::Request(message) = err else {
            panic!("expected a request failure");
        };
        assert!(message.contains("401"));
        assert!(message.contains("Incorrect API key"));
    }
}
