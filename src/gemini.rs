use super::*;

/// Anything that can turn a prompt into a generation response. The server
/// uses [`GeminiClient`]; tests substitute canned generators.
#[async_trait]
pub(crate) trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<GenerateResponse, GenerateError>;
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub(crate) enum GenerateError {
    #[snafu(display("request to generation endpoint failed: {source}"))]
    Transport { source: reqwest::Error },

    #[snafu(display("generation endpoint returned {status}: {body}"))]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[snafu(display("malformed generation response: {source}"))]
    Decode { source: reqwest::Error },
}

#[derive(Debug, Serialize)]
pub(crate) struct GenerateRequest {
    contents: Vec<RequestContent>,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
struct RequestPart {
    text: String,
}

impl GenerateRequest {
    pub(crate) fn new(prompt: impl Into<String>) -> Self {
        Self {
            contents: vec![RequestContent {
                parts: vec![RequestPart {
                    text: prompt.into(),
                }],
            }],
        }
    }
}

/// The endpoint answers in one of two shapes: a bare text completion, or a
/// candidate list whose content parts carry optional text fragments.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub(crate) enum GenerateResponse {
    Direct { text: String },
    Candidates { candidates: Vec<Candidate> },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct Candidate {
    #[serde(default)]
    pub(crate) content: CandidateContent,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub(crate) struct CandidateContent {
    #[serde(default)]
    pub(crate) parts: Vec<CandidatePart>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub(crate) struct CandidatePart {
    #[serde(default)]
    pub(crate) text: Option<String>,
}

impl GenerateResponse {
    /// The completion text: the direct field when present, otherwise every
    /// part fragment concatenated in order. `None` when neither yields
    /// anything.
    pub(crate) fn text(&self) -> Option<String> {
        let text: String = match self {
            Self::Direct { text } => text.clone(),
            Self::Candidates { candidates } => candidates
                .iter()
                .flat_map(|candidate| candidate.content.parts.iter())
                .filter_map(|part| part.text.as_deref())
                .collect(),
        };

        (!text.is_empty()).then_some(text)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct GeminiClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub(crate) fn new(
        api_url: String,
        api_key: String,
        model: String,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_url, self.model
        )
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<GenerateResponse, GenerateError> {
        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&GenerateRequest::new(prompt))
            .send()
            .await;
        let response = snafu::ResultExt::context(response, TransportSnafu)?;

        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return StatusSnafu { status, body }.fail();
        }

        snafu::ResultExt::context(response.json().await, DecodeSnafu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_direct_text() {
        let response: GenerateResponse =
            serde_json::from_str(r#"{"text": "<!doctype html>"}"#).unwrap();
        assert_eq!(response.text(), Some("<!doctype html>".into()));
    }

    #[test]
    fn deserialize_candidates() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{
              "candidates": [
                {
                  "content": {
                    "parts": [{"text": "<!doctype html>"}, {"text": "<html></html>"}],
                    "role": "model"
                  },
                  "finishReason": "STOP"
                }
              ]
            }"#,
        )
        .unwrap();
        assert_eq!(
            response.text(),
            Some("<!doctype html><html></html>".into())
        );
    }

    #[test]
    fn candidates_across_multiple_entries_concatenate() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{
              "candidates": [
                {"content": {"parts": [{"text": "a"}]}},
                {"content": {"parts": [{"text": "b"}]}}
              ]
            }"#,
        )
        .unwrap();
        assert_eq!(response.text(), Some("ab".into()));
    }

    #[test]
    fn parts_without_text_are_skipped() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{
              "candidates": [
                {"content": {"parts": [{}, {"text": "kept"}, {"inlineData": {}}]}}
              ]
            }"#,
        )
        .unwrap();
        assert_eq!(response.text(), Some("kept".into()));
    }

    #[test]
    fn empty_candidate_list_has_no_text() {
        let response: GenerateResponse = serde_json::from_str(r#"{"candidates": []}"#).unwrap();
        assert_eq!(response.text(), None);
    }

    #[test]
    fn empty_direct_text_has_no_text() {
        let response: GenerateResponse = serde_json::from_str(r#"{"text": ""}"#).unwrap();
        assert_eq!(response.text(), None);
    }

    #[test]
    fn request_wire_shape() {
        let request = serde_json::to_value(GenerateRequest::new("make a page")).unwrap();
        assert_eq!(
            request,
            serde_json::json!({
                "contents": [{"parts": [{"text": "make a page"}]}]
            })
        );
    }

    #[test]
    fn client_trims_trailing_slash() {
        let client = GeminiClient::new(
            "http://localhost:8080/".into(),
            "sk-test".into(),
            "gemini-flash-latest".into(),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            client.endpoint(),
            "http://localhost:8080/v1beta/models/gemini-flash-latest:generateContent"
        );
    }
}
