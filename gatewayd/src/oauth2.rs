//! Authorization-code OAuth2 collaborator (§4.4 AUTH-GATED, §6
//! `beginAuthorization`/`handleCallback`), backed by each route's own
//! `oauth2` config. State (the return path) rides the provider's `state`
//! parameter so the callback can send the browser back where it started.

use async_trait::async_trait;
use serde::Deserialize;

use gateway_core::config::Route;
use gateway_core::collaborators::OAuth2Provider;

pub struct HttpOAuth2Provider {
    http: reqwest::Client,
}

impl HttpOAuth2Provider {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

fn encode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

#[async_trait]
impl OAuth2Provider for HttpOAuth2Provider {
    fn begin_authorization(&self, route: &Route, return_path: &str) -> String {
        let Some(oauth2) = &route.oauth2 else {
            return "/".to_string();
        };
        let state = encode(return_path);
        let scope = encode(&oauth2.scopes.join(" "));
        let redirect_uri = encode(&oauth2.callback_url);
        format!(
            "{}?response_type=code&client_id={}&redirect_uri={}&scope={}&state={}",
            oauth2.authorization_url,
            encode(&oauth2.client_id),
            redirect_uri,
            scope,
            state,
        )
    }

    async fn handle_callback(&self, route: &Route, query: &str) -> anyhow::Result<String> {
        let oauth2 = route
            .oauth2
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("route {} has no oauth2 config", route.domain))?;
        let params: std::collections::HashMap<String, String> =
            url::form_urlencoded::parse(query.as_bytes()).into_owned().collect();
        let code = params
            .get("code")
            .ok_or_else(|| anyhow::anyhow!("callback missing code"))?;

        let resp = self
            .http
            .post(&oauth2.token_url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code.as_str()),
                ("redirect_uri", oauth2.callback_url.as_str()),
                ("client_id", oauth2.client_id.as_str()),
                ("client_secret", oauth2.client_secret.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json::<TokenResponse>()
            .await?;

        Ok(resp.access_token)
    }
}
