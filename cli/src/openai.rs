use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use recipebox_core::generate::RecipeGenerator;

use crate::config::OpenAiSettings;

const TEMPERATURE: f64 = 0.7;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    response_format: ResponseFormat,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

fn chat_request<'a>(model: &'a str, system: &'a str, user: &'a str) -> ChatRequest<'a> {
    ChatRequest {
        model,
        messages: [
            ChatMessage {
                role: "system",
                content: system,
            },
            ChatMessage {
                role: "user",
                content: user,
            },
        ],
        response_format: ResponseFormat {
            kind: "json_object",
        },
        temperature: TEMPERATURE,
    }
}

fn reply_text(response: ChatResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|text| text.trim().to_string())
        .context("Chat completion returned no content")
}

/// Chat-completions client used for recipe generation.
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    url: String,
    rt: tokio::runtime::Handle,
}

impl OpenAiClient {
    pub fn new(settings: &OpenAiSettings) -> Result<Self> {
        let api_key = settings
            .api_key
            .clone()
            .context("OPENAI_API_KEY is not set; recipe generation is unavailable")?;
        let client = reqwest::Client::builder()
            .user_agent(format!("recipebox/{}", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(60))
            .connect_timeout(std::time::Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;
        let rt = tokio::runtime::Handle::try_current()
            .context("Recipe generation needs a Tokio runtime")?;
        Ok(Self {
            client,
            api_key,
            model: settings.model.clone(),
            url: settings.url.clone(),
            rt,
        })
    }

    pub async fn complete_async(&self, system: &str, user: &str) -> Result<String> {
        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&chat_request(&self.model, system, user))
            .send()
            .await
            .context("Failed to reach the chat completions API")?
            .error_for_status()
            .context("Chat completions API returned an error")?;

        let data: ChatResponse = resp
            .json()
            .await
            .context("Failed to parse chat completions response")?;

        reply_text(data)
    }
}

impl RecipeGenerator for OpenAiClient {
    fn complete(&self, system: &str, user: &str) -> Result<String> {
        self.rt.block_on(self.complete_async(system, user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_shape() {
        let body = serde_json::to_value(chat_request("gpt-4o-mini", "sys", "hi")).unwrap();
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "sys");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["temperature"], 0.7);
    }

    #[test]
    fn test_reply_text() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"role": "assistant", "content": "  {\"title\": \"x\"} "}}]}"#,
        )
        .unwrap();
        assert_eq!(reply_text(response).unwrap(), r#"{"title": "x"}"#);

        let empty: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(reply_text(empty).is_err());
    }

    #[test]
    fn test_new_requires_api_key() {
        let settings = OpenAiSettings {
            api_key: None,
            model: "m".to_string(),
            url: "http://localhost".to_string(),
        };
        let err = OpenAiClient::new(&settings).err().unwrap();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[tokio::test]
    #[ignore = "hits the OpenAI API"]
    async fn test_complete_async_live() {
        let settings = crate::config::Config::load().unwrap().openai;
        let client = OpenAiClient::new(&settings).unwrap();
        let reply = client
            .complete_async("Reply with the JSON object {\"ok\": true}.", "ping")
            .await
            .unwrap();
        assert!(reply.contains("ok"));
    }
}
