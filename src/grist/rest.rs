use std::sync::Arc;

use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::{Method, Url};
use serde_json::Value;
use tracing::{debug, error};

use super::host::{get_auth_info, HostApi};
use super::types::{ColumnDescriptor, ColumnsResponse};
use crate::error::{AppError, AppResult};

/// Build `{base_url}/{path}` carrying the endpoint's own query parameters
/// plus `auth={token}`. Later keys replace earlier ones.
pub fn build_request_url(base_url: &str, endpoint: &str, token: &str) -> AppResult<Url> {
    let (path, query) = match endpoint.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (endpoint, None),
    };
    let joined = format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'));
    let mut url = Url::parse(&joined).map_err(|e| AppError::config(format!("invalid Grist URL '{}': {}", joined, e)))?;

    let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    if let Some(q) = query {
        for (k, v) in parse_query(q) { set_pair(&mut pairs, k, v); }
    }
    set_pair(&mut pairs, "auth".to_string(), token.to_string());
    url.query_pairs_mut()
        .clear()
        .extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    Ok(url)
}

fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let (k, v) = part.split_once('=').unwrap_or((part, ""));
            let k = urlencoding::decode(&k.replace('+', " ")).map(|c| c.into_owned()).unwrap_or_else(|_| k.to_string());
            let v = urlencoding::decode(&v.replace('+', " ")).map(|c| c.into_owned()).unwrap_or_else(|_| v.to_string());
            (k, v)
        })
        .collect()
}

fn set_pair(pairs: &mut Vec<(String, String)>, key: String, value: String) {
    if let Some(slot) = pairs.iter_mut().find(|(k, _)| *k == key) {
        slot.1 = value;
    } else {
        pairs.push((key, value));
    }
}

/// Client for the platform-hosted REST endpoints, authenticated with the
/// host-issued token as an `auth` query parameter.
#[derive(Clone)]
pub struct GristRestClient {
    host: Arc<dyn HostApi>,
    client: reqwest::Client,
}

impl GristRestClient {
    pub fn new(host: Arc<dyn HostApi>) -> Self {
        Self { host, client: reqwest::Client::new() }
    }

    pub fn host(&self) -> &Arc<dyn HostApi> { &self.host }

    pub async fn request(&self, endpoint: &str, method: Method, body: Option<&Value>) -> AppResult<Value> {
        let auth = get_auth_info(self.host.as_ref()).await?;
        let url = build_request_url(&auth.base_url, endpoint, &auth.token)?;
        debug!(target: "grist", "{} {}", method, endpoint);

        let mut req = self.client
            .request(method, url)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(b) = body {
            req = req.body(serde_json::to_vec(b)?);
        }
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!(target: "grist", "Grist API {} on '{}': {}", status, endpoint, body);
            return Err(AppError::Api {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or("").to_string(),
                body,
            });
        }
        Ok(resp.json::<Value>().await?)
    }

    pub async fn get(&self, endpoint: &str) -> AppResult<Value> {
        self.request(endpoint, Method::GET, None).await
    }
}

/// Visible columns of `table_id`, in table order.
pub async fn get_columns_for_table(rest: &GristRestClient, table_id: &str) -> AppResult<Vec<ColumnDescriptor>> {
    let endpoint = format!("tables/{}/columns?hidden=false", urlencoding::encode(table_id));
    let v = rest.get(&endpoint).await?;
    let resp: ColumnsResponse = serde_json::from_value(v)?;
    Ok(resp.columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grist::{AuthInfo, MemoryHost};
    use mockito::Matcher;

    #[test]
    fn url_reattaches_query_and_appends_auth() {
        let url = build_request_url("https://grist.example/api/docs/abc", "tables/People/columns?hidden=false", "t0k").unwrap();
        assert_eq!(url.path(), "/api/docs/abc/tables/People/columns");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs, vec![("hidden".to_string(), "false".to_string()), ("auth".to_string(), "t0k".to_string())]);
    }

    #[test]
    fn url_without_query_only_has_auth() {
        let url = build_request_url("https://grist.example/api/docs/abc/", "/tables", "a b").unwrap();
        assert_eq!(url.as_str(), "https://grist.example/api/docs/abc/tables?auth=a+b");
    }

    #[test]
    fn endpoint_auth_is_overridden_by_token() {
        let url = build_request_url("https://g/api", "x?auth=old&sort=id", "new").unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs, vec![("auth".to_string(), "new".to_string()), ("sort".to_string(), "id".to_string())]);
    }

    #[test]
    fn invalid_base_is_config_error() {
        assert!(matches!(build_request_url("not a url", "x", "t"), Err(AppError::Config(_))));
    }

    fn client_for(server: &mockito::ServerGuard) -> GristRestClient {
        let host = MemoryHost::new(Some(AuthInfo { base_url: format!("{}/api/docs/d1", server.url()), token: "tok".into() }), None);
        GristRestClient::new(Arc::new(host))
    }

    #[tokio::test]
    async fn fetches_columns_with_auth_param() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/docs/d1/tables/People/columns")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("hidden".into(), "false".into()),
                Matcher::UrlEncoded("auth".into(), "tok".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"columns":[{"id":"name","fields":{"label":"Name","type":"Text"}}]}"#)
            .create_async()
            .await;

        let cols = get_columns_for_table(&client_for(&server), "People").await.unwrap();
        mock.assert_async().await;
        assert_eq!(cols.len(), 1);
        assert_eq!(cols[0].id, "name");
    }

    #[tokio::test]
    async fn non_success_is_api_error_with_body() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/api/docs/d1/tables/Nope/columns")
            .match_query(Matcher::Any)
            .with_status(404)
            .with_body("table not found")
            .create_async()
            .await;

        let err = get_columns_for_table(&client_for(&server), "Nope").await.unwrap_err();
        match err {
            AppError::Api { status, status_text, body } => {
                assert_eq!(status, 404);
                assert_eq!(status_text, "Not Found");
                assert_eq!(body, "table not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn post_sends_json_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/docs/d1/tables/People/records")
            .match_query(Matcher::UrlEncoded("auth".into(), "tok".into()))
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(serde_json::json!({"records": []})))
            .with_status(200)
            .with_body(r#"{"records":[]}"#)
            .create_async()
            .await;

        let body = serde_json::json!({"records": []});
        let v = client_for(&server).request("tables/People/records", Method::POST, Some(&body)).await.unwrap();
        mock.assert_async().await;
        assert_eq!(v, serde_json::json!({"records": []}));
    }

    #[tokio::test]
    async fn host_denial_propagates() {
        let rest = GristRestClient::new(Arc::new(MemoryHost::new(None, None)));
        assert!(matches!(rest.get("tables").await, Err(AppError::HostAuth(_))));
    }
}
