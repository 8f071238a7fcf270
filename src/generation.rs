//! Answer generation through a language model.
//!
//! Generators fail soft: any transport or decoding problem is logged and
//! turned into an empty response, which [`answer`] replaces with
//! [`NO_RESPONSE`].

use std::{
    io::{BufRead, BufReader},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;

pub const OLLAMA_HOST_ENV: &str = "OLLAMA_HOST";
pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "gemma3:1b";

pub const GROQ_API_KEY_ENV: &str = "GROQ_API_KEY";
pub const GROQ_ENDPOINT: &str =
    "https://api.groq.com/openai/v1/chat/completions";
pub const DEFAULT_GROQ_MODEL: &str = "llama3-8b-8192";

const SYSTEM_PROMPT: &str = "You are a helpful assistant.";
const MAX_TOKENS: u32 = 300;
const TEMPERATURE: f32 = 0.3;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Shown instead of an empty model response.
pub const NO_RESPONSE: &str = "No response from the model.";

/// Produces a completion for a prompt.
pub trait Generator {
    /// Generate a response with `model`. Returns an empty string on any
    /// failure.
    fn generate(&self, prompt: &str, model: &str) -> String;
}

/// Prompt combining retrieved context and the user's question.
pub fn build_prompt(context: &str, question: &str) -> String {
    format!("Context:\n{context}\n\nQuestion:\n{question}\n\nAnswer:")
}

/// The prompt sent to the model and the text it returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub prompt: String,
    pub response: String,
}

/// Ask `generator` to answer `question` given `context`.
pub fn answer(
    generator: &dyn Generator,
    model: &str,
    context: &str,
    question: &str,
) -> Answer {
    let prompt = build_prompt(context, question);
    let response = generator.generate(&prompt, model);
    let response = if response.trim().is_empty() {
        NO_RESPONSE.to_string()
    } else {
        response
    };
    Answer { prompt, response }
}

fn http_client() -> Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()?)
}

/// Client for a local Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    base_url: String,
    client: reqwest::blocking::Client,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct OllamaChunk {
    #[serde(default)]
    response: String,
}

impl OllamaGenerator {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: http_client()?,
        })
    }

    /// Server from `OLLAMA_HOST`, or the default local address.
    pub fn from_env() -> Result<Self> {
        let host = std::env::var(OLLAMA_HOST_ENV)
            .unwrap_or_else(|_| DEFAULT_OLLAMA_HOST.to_string());
        Self::new(&host)
    }

    pub fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }
}

impl Generator for OllamaGenerator {
    fn generate(&self, prompt: &str, model: &str) -> String {
        let url = self.endpoint();
        debug!(url = %url, model, "requesting completion");
        let response = self
            .client
            .post(&url)
            .json(&OllamaRequest { model, prompt })
            .send()
            .and_then(|r| r.error_for_status());
        match response {
            Ok(r) => parse_ollama_stream(BufReader::new(r)),
            Err(e) => {
                warn!(error = %e, "Ollama request failed");
                String::new()
            }
        }
    }
}

/// Concatenate the `response` fields of a newline-delimited JSON stream.
///
/// Blank and undecodable lines are ignored; the result is trimmed.
pub fn parse_ollama_stream<R: BufRead>(reader: R) -> String {
    let mut output = String::new();
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Ollama stream interrupted");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<OllamaChunk>(&line) {
            Ok(chunk) => output.push_str(&chunk.response),
            Err(e) => debug!(error = %e, "skipping undecodable stream line"),
        }
    }
    output.trim().to_string()
}

/// Client for an OpenAI-compatible chat completions API, by default Groq.
#[derive(Debug, Clone)]
pub struct ChatCompletionsGenerator {
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::blocking::Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionsGenerator {
    pub fn new(endpoint: &str, api_key: Option<String>) -> Result<Self> {
        Ok(Self {
            endpoint: endpoint.to_string(),
            api_key,
            client: http_client()?,
        })
    }

    /// Groq endpoint with the key from `GROQ_API_KEY`.
    pub fn groq_from_env() -> Result<Self> {
        let key = std::env::var(GROQ_API_KEY_ENV)
            .ok()
            .filter(|k| !k.is_empty());
        Self::new(GROQ_ENDPOINT, key)
    }
}

impl Generator for ChatCompletionsGenerator {
    fn generate(&self, prompt: &str, model: &str) -> String {
        let Some(key) = &self.api_key else {
            warn!("no API key configured (set {GROQ_API_KEY_ENV})");
            return String::new();
        };

        let request = ChatRequest {
            model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
        };

        debug!(url = %self.endpoint, model, "requesting completion");
        let body = self
            .client
            .post(&self.endpoint)
            .bearer_auth(key)
            .json(&request)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.text());
        match body {
            Ok(body) => parse_chat_response(&body).unwrap_or_else(|| {
                warn!("chat completion response had no content");
                String::new()
            }),
            Err(e) => {
                warn!(error = %e, "chat completion request failed");
                String::new()
            }
        }
    }
}

/// Content of the first choice of a chat completions response body.
pub fn parse_chat_response(body: &str) -> Option<String> {
    let response: ChatResponse = serde_json::from_str(body).ok()?;
    response.choices.into_iter().next()?.message.content
}
