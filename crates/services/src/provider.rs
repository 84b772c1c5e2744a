// Prediction providers

use async_trait::async_trait;
use matchcast_models::{
    CleanSheetProbabilities, FixtureMatch, GoalLinePick, MatchcastError, OutcomeProbabilities,
    OverUnder, OverUnderProbabilities, PredictedOutcome, PredictionPayload, ProviderError,
    ProviderErrorKind, DEFAULT_GOAL_LINE,
};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// A black-box model provider. Implementations classify every failure into a
/// `ProviderErrorKind` before returning it.
#[async_trait]
pub trait PredictionProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, model: &str, fixture: &FixtureMatch) -> Result<PredictionPayload, ProviderError>;
}

/// Any OpenAI-compatible `/chat/completions` endpoint.
pub struct ChatCompletionsProvider {
    name: String,
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    temperature: f32,
}

impl ChatCompletionsProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> matchcast_models::Result<Self> {
        let name = name.into();
        let api_key = api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| MatchcastError::MissingCredentials(format!("providers.{name}.api_key")))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MatchcastError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self {
            name,
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            temperature: 0.3,
        })
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn transport_error(&self, err: &reqwest::Error) -> ProviderError {
        // Timeouts are how overloaded upstreams usually show up.
        let kind = if err.is_timeout() {
            ProviderErrorKind::UpstreamCapacity
        } else {
            ProviderErrorKind::Unknown
        };
        ProviderError::new(kind, &self.name, err.to_string())
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
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

impl ErrorBody {
    fn code(&self) -> Option<String> {
        self.code
            .as_ref()
            .and_then(|c| c.as_str().map(str::to_string))
            .or_else(|| self.kind.clone())
            .or_else(|| self.status.clone())
    }
}

#[async_trait]
impl PredictionProvider for ChatCompletionsProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, model: &str, fixture: &FixtureMatch) -> Result<PredictionPayload, ProviderError> {
        let request = json!({
            "model": model,
            "temperature": self.temperature,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": build_prompt(fixture)},
            ],
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(&e))?;

        if !status.is_success() {
            let envelope = serde_json::from_str::<ErrorEnvelope>(&body).ok();
            let code = envelope.as_ref().and_then(|e| e.error.code());
            let message = envelope
                .and_then(|e| e.error.message)
                .unwrap_or_else(|| body.chars().take(200).collect());
            return Err(ProviderError::from_http(&self.name, status.as_u16(), code.as_deref(), message));
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::malformed(&self.name, format!("unexpected response shape: {e}")))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::malformed(&self.name, "empty completion"))?;

        debug!(provider = %self.name, model, match_id = %fixture.match_id, "completion received");
        parse_prediction(&self.name, &content)
    }
}

const SYSTEM_PROMPT: &str = "You are a football analyst. Reply with a single JSON object and nothing else.";

pub fn build_prompt(fixture: &FixtureMatch) -> String {
    format!(
        "Predict {home} vs {away} ({league}), kickoff {kickoff}.\n\
         Return JSON with these keys:\n\
         \"outcome\": \"Home Win\" | \"Draw\" | \"Away Win\",\n\
         \"probabilities\": {{\"home\": number, \"draw\": number, \"away\": number}} (percent, summing to 100),\n\
         \"exact_score\": \"H-A\",\n\
         \"btts\": \"Yes\" | \"No\",\n\
         \"over_under\": \"Over 2.5\" | \"Under 2.5\",\n\
         \"over_probability\": number, \"under_probability\": number,\n\
         \"clean_sheet_home\": number, \"clean_sheet_away\": number (percent),\n\
         \"corners\": \"Over 9.5\" | \"Under 9.5\", \"expected_corners\": number,\n\
         \"confidence\": number (0-100),\n\
         \"reasoning\": short string",
        home = fixture.team_home,
        away = fixture.team_away,
        league = fixture.league_name,
        kickoff = fixture.kickoff.format("%Y-%m-%d %H:%M UTC"),
    )
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Flexible {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Flexible {
    fn as_yes_no(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Number(_) => None,
            Self::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
                "yes" | "y" | "true" => Some(true),
                "no" | "n" | "false" => Some(false),
                _ => None,
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawProbabilities {
    #[serde(alias = "home_win")]
    home: Option<f64>,
    draw: Option<f64>,
    #[serde(alias = "away_win")]
    away: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPrediction {
    #[serde(alias = "prediction", alias = "result")]
    outcome: Option<String>,
    probabilities: Option<RawProbabilities>,
    #[serde(alias = "exactScore", alias = "correct_score", alias = "score")]
    exact_score: Option<String>,
    #[serde(alias = "bothTeamsToScore", alias = "both_teams_to_score")]
    btts: Option<Flexible>,
    #[serde(alias = "overUnder", alias = "goal_line")]
    over_under: Option<String>,
    over_probability: Option<f64>,
    under_probability: Option<f64>,
    clean_sheet_home: Option<f64>,
    clean_sheet_away: Option<f64>,
    corners: Option<String>,
    expected_corners: Option<f64>,
    confidence: Option<f64>,
    reasoning: Option<String>,
}

/// Pulls the first balanced JSON object out of a completion, tolerating code
/// fences and prose. Braces inside string literals are ignored.
fn extract_json(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in content[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&content[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

/// "Over 2.5" -> (Over, 2.5); a missing line falls back to the default goal line.
fn parse_line_label(label: &str) -> Option<GoalLinePick> {
    let side = OverUnder::from_label(label)?;
    let line = label
        .split_whitespace()
        .find_map(|token| token.parse::<f64>().ok())
        .unwrap_or(DEFAULT_GOAL_LINE);
    Some(GoalLinePick { side, line })
}

pub fn parse_prediction(provider: &str, content: &str) -> Result<PredictionPayload, ProviderError> {
    let json = extract_json(content)
        .ok_or_else(|| ProviderError::malformed(provider, "no JSON object in completion"))?;
    let raw: RawPrediction = serde_json::from_str(json)
        .map_err(|e| ProviderError::malformed(provider, format!("invalid prediction JSON: {e}")))?;

    let probabilities = raw.probabilities.and_then(|p| match (p.home, p.draw, p.away) {
        (Some(home), Some(draw), Some(away)) => Some(OutcomeProbabilities::new(home, draw, away)),
        _ => None,
    });
    let goal_line = raw.over_under.as_deref().and_then(parse_line_label);
    let over_under = match (raw.over_probability, raw.under_probability) {
        (Some(over), Some(under)) => Some(OverUnderProbabilities {
            over,
            under,
            line: goal_line.map(|g| g.line),
        }),
        _ => None,
    };
    let clean_sheet = match (raw.clean_sheet_home, raw.clean_sheet_away) {
        (Some(home), Some(away)) => Some(CleanSheetProbabilities { home, away }),
        _ => None,
    };

    let payload = PredictionPayload {
        outcome: raw.outcome.as_deref().and_then(PredictedOutcome::from_label),
        probabilities,
        exact_score: raw.exact_score.map(|s| s.trim().to_string()),
        btts: raw.btts.as_ref().and_then(Flexible::as_yes_no),
        goal_line,
        over_under,
        clean_sheet,
        corners: raw.corners.as_deref().and_then(OverUnder::from_label),
        expected_corners: raw.expected_corners,
        confidence: raw.confidence,
        reasoning: raw.reasoning,
    };

    if payload.predicted_outcome().is_none() && payload.scoreline().is_none() {
        return Err(ProviderError::malformed(provider, "prediction has neither outcome nor score"));
    }
    Ok(payload)
}
