//! Crypto news headlines (NewsAPI)

use serde::Deserialize;

use nexus_core::{NewsArticle, UpstreamResult};

use crate::client::{require_key, ApiClient};

#[derive(Debug, Default, Deserialize)]
pub struct NewsResponse {
    #[serde(default)]
    articles: Option<Vec<NewsArticle>>,
}

impl NewsResponse {
    pub fn into_articles(self) -> Vec<NewsArticle> {
        self.articles.unwrap_or_default()
    }
}

/// Articles matching `query`
pub async fn fetch_news(client: &ApiClient, query: &str) -> UpstreamResult<Vec<NewsArticle>> {
    let api_key = require_key(client.config().news_api_key.as_deref(), "News")?;

    let body: NewsResponse = client
        .get_json(&client.config().news_api_url, &[("q", query), ("apiKey", api_key)])
        .await?;

    Ok(body.into_articles())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ApiConfig;
    use crate::test_server::TestServer;
    use nexus_core::UpstreamError;

    fn client_for(server: &TestServer, key: Option<&str>) -> ApiClient {
        ApiClient::new(ApiConfig {
            news_api_url: format!("{}/v2/everything", server.url()),
            news_api_key: key.map(str::to_string),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_parses_articles() {
        let body: NewsResponse = serde_json::from_str(
            r#"{
                "status": "ok",
                "totalResults": 2,
                "articles": [
                    {"title": "Bitcoin rallies", "description": "BTC up 5%", "url": "https://a", "source": {"id": null, "name": "Wire"}},
                    {"title": "ETH upgrade", "description": null, "url": "https://b", "source": {"name": "Desk"}, "urlToImage": "https://img"}
                ]
            }"#,
        )
        .unwrap();

        let articles = body.into_articles();
        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].source.name, "Wire");
        assert_eq!(articles[1].description, "");
        assert_eq!(articles[1].url_to_image.as_deref(), Some("https://img"));
    }

    #[test]
    fn test_missing_articles() {
        let body: NewsResponse = serde_json::from_str(r#"{"status":"error"}"#).unwrap();
        assert!(body.into_articles().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_news_over_http() {
        let server = TestServer::start(&[(
            200,
            r#"{"status":"ok","articles":[{"title":"Bitcoin rallies","source":{"name":"Wire"}}]}"#,
        )])
        .await;

        let articles = fetch_news(&client_for(&server, Some("k")), "cryptocurrency")
            .await
            .unwrap();

        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "Bitcoin rallies");
        assert_eq!(
            server.requests(),
            vec!["GET /v2/everything?q=cryptocurrency&apiKey=k HTTP/1.1"]
        );
    }

    #[tokio::test]
    async fn test_fetch_news_errors() {
        let server = TestServer::start(&[(429, "{}"), (401, r#"{"status":"error"}"#)]).await;
        let client = client_for(&server, Some("k"));

        assert!(fetch_news(&client, "crypto").await.unwrap_err().is_rate_limited());
        assert!(matches!(
            fetch_news(&client, "crypto").await,
            Err(UpstreamError::Status { status: 401, .. })
        ));

        // No request is made without a key
        let unkeyed = client_for(&server, None);
        assert!(matches!(
            fetch_news(&unkeyed, "crypto").await,
            Err(UpstreamError::MissingApiKey("News"))
        ));
        assert_eq!(server.requests().len(), 2);
    }
}
