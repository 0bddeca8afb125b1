use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::VideoConfig;
use crate::errors::{CourseError, CourseResult};
use crate::models::{TranscriptSegment, VideoCandidate};

/// Transcript languages tried in order
pub const TRANSCRIPT_LANGUAGES: [&str; 2] = ["en", "hi"];

const VIDEO_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait VideoSearch: Send + Sync {
    async fn search(&self, query: &str, max_results: u32) -> CourseResult<Vec<VideoCandidate>>;
}

#[async_trait]
pub trait TranscriptSource: Send + Sync {
    async fn fetch(&self, video_id: &str) -> CourseResult<Vec<TranscriptSegment>>;
}

/// Join transcript segments into one plain-text body
pub fn transcript_text(segments: &[TranscriptSegment]) -> String {
    segments
        .iter()
        .map(|segment| segment.text.trim())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn http_client() -> Client {
    Client::builder()
        .timeout(VIDEO_HTTP_TIMEOUT)
        .build()
        .unwrap_or_default()
}

/// YouTube Data API v3 search
#[derive(Debug, Clone)]
pub struct YouTubeSearchClient {
    client: Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
    snippet: SearchSnippet,
}

#[derive(Debug, Deserialize)]
struct SearchItemId {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchSnippet {
    #[serde(default)]
    title: String,
    #[serde(rename = "channelTitle", default)]
    channel_title: String,
}

impl YouTubeSearchClient {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            client: http_client(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &VideoConfig) -> Self {
        Self::new(config.youtube_api_key.clone(), config.youtube_api_base_url.clone())
    }
}

#[async_trait]
impl VideoSearch for YouTubeSearchClient {
    async fn search(&self, query: &str, max_results: u32) -> CourseResult<Vec<VideoCandidate>> {
        if self.api_key.is_empty() {
            return Err(CourseError::ExternalDataUnavailable(
                "YouTube API key is not configured".to_string(),
            ));
        }

        let max_results = max_results.to_string();
        let response = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[
                ("part", "snippet"),
                ("type", "video"),
                ("q", query),
                ("maxResults", max_results.as_str()),
                ("videoDuration", "medium"),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| CourseError::ExternalDataUnavailable(format!("YouTube search failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(CourseError::ExternalDataUnavailable(format!(
                "YouTube search returned status {}",
                response.status()
            )));
        }

        let body: SearchResponse = response.json().await.map_err(|e| {
            CourseError::ExternalDataUnavailable(format!("YouTube search response unreadable: {}", e))
        })?;

        let candidates: Vec<VideoCandidate> = body
            .items
            .into_iter()
            .filter_map(|item| {
                let video_id = item.id.video_id?;
                Some(VideoCandidate {
                    video_id,
                    title: decode_entities(&item.snippet.title),
                    channel: decode_entities(&item.snippet.channel_title),
                    search_query: query.to_string(),
                })
            })
            .collect();

        info!(query = %query, result_count = candidates.len(), "YouTube search completed");
        Ok(candidates)
    }
}

static TEXT_SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<text start="([\d.]+)"(?: dur="([\d.]+)")?[^>]*>(.*?)</text>"#).unwrap()
});
static INNER_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

/// Caption tracks are often escaped twice (`&amp;#39;`), so the outer `&amp;` goes first
fn decode_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&#39;", "'")
        .replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Parse a timedtext XML document into segments
pub fn parse_timedtext(xml: &str) -> Vec<TranscriptSegment> {
    TEXT_SEGMENT
        .captures_iter(xml)
        .filter_map(|captures| {
            let start = captures[1].parse().ok()?;
            let duration = captures
                .get(2)
                .and_then(|dur| dur.as_str().parse().ok())
                .unwrap_or(0.0);
            let text = decode_entities(&INNER_TAG.replace_all(&captures[3], ""))
                .replace('\n', " ")
                .trim()
                .to_string();
            (!text.is_empty()).then_some(TranscriptSegment {
                start,
                duration,
                text,
            })
        })
        .collect()
}

/// Caption track fetcher over the timedtext endpoint
#[derive(Debug, Clone)]
pub struct TimedTextClient {
    client: Client,
    base_url: String,
}

impl TimedTextClient {
    pub fn new(base_url: String) -> Self {
        Self {
            client: http_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &VideoConfig) -> Self {
        Self::new(config.transcript_base_url.clone())
    }

    async fn fetch_language(&self, video_id: &str, language: &str) -> CourseResult<Vec<TranscriptSegment>> {
        let response = self
            .client
            .get(format!("{}/api/timedtext", self.base_url))
            .query(&[("v", video_id), ("lang", language)])
            .send()
            .await
            .map_err(|e| CourseError::ExternalDataUnavailable(format!("transcript request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(CourseError::ExternalDataUnavailable(format!(
                "transcript endpoint returned status {}",
                response.status()
            )));
        }

        let xml = response.text().await.map_err(|e| {
            CourseError::ExternalDataUnavailable(format!("transcript body unreadable: {}", e))
        })?;
        Ok(parse_timedtext(&xml))
    }
}

#[async_trait]
impl TranscriptSource for TimedTextClient {
    async fn fetch(&self, video_id: &str) -> CourseResult<Vec<TranscriptSegment>> {
        let mut last_error = None;
        for language in TRANSCRIPT_LANGUAGES {
            match self.fetch_language(video_id, language).await {
                Ok(segments) if !segments.is_empty() => {
                    debug!(video_id = %video_id, language, segment_count = segments.len(), "Transcript fetched");
                    return Ok(segments);
                }
                Ok(_) => {}
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            CourseError::ExternalDataUnavailable(format!("no transcript available for video {}", video_id))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timedtext() {
        let xml = r##"<?xml version="1.0" encoding="utf-8" ?><transcript>
<text start="0.5" dur="2.1">Hello &amp;amp; welcome</text>
<text start="2.6" dur="1.9">today&amp;#39;s topic: <font color="#fff">vowels</font></text>
<text start="4.5">   </text>
</transcript>"##;
        let segments = parse_timedtext(xml);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].start, 0.5);
        assert_eq!(segments[0].duration, 2.1);
        assert_eq!(segments[0].text, "Hello & welcome");
        assert_eq!(segments[1].text, "today's topic: vowels");
        assert_eq!(transcript_text(&segments), "Hello & welcome today's topic: vowels");
    }

    #[test]
    fn test_parse_timedtext_empty_body() {
        assert!(parse_timedtext("").is_empty());
    }
}
