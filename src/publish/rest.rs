//! Online publisher backed by the Figma REST API.
//!
//! Flow: `GET /me` to check the token, `GET /teams/:id/projects` to pick the
//! first project, `POST /projects/:id/files` to create an empty file named
//! after the document. Node content is not uploaded; the REST API has no
//! endpoint for it.

use super::{file_url, PublishedArtifact, Publisher, ROOT_NODE_ID};
use crate::error::PublishError;
use crate::scene::SceneNode;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct MeResponse {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    handle: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProjectsResponse {
    #[serde(default)]
    projects: Vec<Project>,
}

#[derive(Debug, Deserialize)]
struct Project {
    id: serde_json::Value,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct CreateFileResponse {
    file: CreatedFile,
}

#[derive(Debug, Deserialize)]
struct CreatedFile {
    key: String,
}

pub struct FigmaRestPublisher {
    client: reqwest::Client,
    base_url: String,
    team_id: String,
}

impl fmt::Debug for FigmaRestPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FigmaRestPublisher")
            .field("base_url", &self.base_url)
            .field("team_id", &self.team_id)
            .finish_non_exhaustive()
    }
}

impl FigmaRestPublisher {
    pub fn new(token: &str, team_id: &str, base_url: &str, timeout_secs: u64) -> Result<Self, PublishError> {
        let mut headers = HeaderMap::new();
        let mut value = HeaderValue::from_str(token)
            .map_err(|_| PublishError::Auth("access token contains invalid characters".into()))?;
        value.set_sensitive(true);
        headers.insert(HeaderName::from_static("x-figma-token"), value);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .no_proxy()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| PublishError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            team_id: team_id.to_string(),
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, PublishError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);
        let response = self.client.get(&url).send().await.map_err(transport)?;
        handle_response(response).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: &serde_json::Value) -> Result<T, PublishError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {}", url);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(transport)?;
        handle_response(response).await
    }
}

fn transport(e: reqwest::Error) -> PublishError {
    PublishError::Transport(e.to_string())
}

async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, PublishError> {
    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PublishError::Auth(message),
            StatusCode::NOT_FOUND => PublishError::NotFound(message),
            _ => PublishError::Api {
                status: status.as_u16(),
                message,
            },
        });
    }
    response.json().await.map_err(|e| PublishError::Api {
        status: status.as_u16(),
        message: format!("unexpected response body: {e}"),
    })
}

#[async_trait]
impl Publisher for FigmaRestPublisher {
    async fn publish(&self, document_name: &str, nodes: &[SceneNode]) -> Result<PublishedArtifact, PublishError> {
        let me: MeResponse = self.get("/me").await?;
        info!(
            "Authenticated as {}",
            me.email.or(me.handle).unwrap_or_else(|| "<unknown>".into())
        );

        let projects: ProjectsResponse = self.get(&format!("/teams/{}/projects", self.team_id)).await?;
        let project = projects.projects.first().ok_or_else(|| {
            PublishError::NotFound(format!("no projects in team {}", self.team_id))
        })?;
        let project_id = match &project.id {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        info!("Creating file in project {} ({})", project_id, project.name);

        let created: CreateFileResponse = self
            .post(
                &format!("/projects/{project_id}/files"),
                &serde_json::json!({ "name": document_name }),
            )
            .await?;
        info!(
            "Created file {} ({} scene nodes not uploaded)",
            created.file.key,
            nodes.iter().map(SceneNode::node_count).sum::<usize>()
        );

        Ok(PublishedArtifact {
            artifact_url: file_url(&created.file.key, document_name),
            artifact_id: created.file.key,
            root_node_id: Some(ROOT_NODE_ID.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve canned responses keyed by request line, one request per connection.
    async fn serve(routes: Vec<(&'static str, u16, &'static str)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let routes = routes.clone();
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 8192];
                    let mut read = 0;
                    loop {
                        let n = socket.read(&mut buf[read..]).await.unwrap_or(0);
                        if n == 0 {
                            break;
                        }
                        read += n;
                        let text = String::from_utf8_lossy(&buf[..read]);
                        if let Some(head_end) = text.find("\r\n\r\n") {
                            let content_length = text[..head_end]
                                .lines()
                                .find_map(|l| {
                                    let lower = l.to_ascii_lowercase();
                                    lower
                                        .strip_prefix("content-length:")
                                        .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                                })
                                .unwrap_or(0);
                            if read >= head_end + 4 + content_length {
                                break;
                            }
                        }
                    }
                    let request = String::from_utf8_lossy(&buf[..read]).to_string();
                    let line = request.lines().next().unwrap_or_default().to_string();
                    let (status, body) = routes
                        .iter()
                        .find(|(prefix, _, _)| line.starts_with(prefix))
                        .map(|(_, s, b)| (*s, *b))
                        .unwrap_or((500, "{}"));
                    let response = format!(
                        "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        format!("http://{addr}/v1")
    }

    #[tokio::test]
    async fn creates_file_in_first_project() {
        let base = serve(vec![
            ("GET /v1/me ", 200, r#"{"email":"dev@example.test"}"#),
            ("GET /v1/teams/42/projects ", 200, r#"{"projects":[{"id":"7","name":"Imports"}]}"#),
            ("POST /v1/projects/7/files ", 200, r#"{"file":{"key":"KEY123"}}"#),
        ])
        .await;
        let publisher = FigmaRestPublisher::new("tok", "42", &base, 5).unwrap();
        let artifact = publisher.publish("Landing", &[]).await.unwrap();
        assert_eq!(artifact.artifact_id, "KEY123");
        assert_eq!(artifact.artifact_url, "https://www.figma.com/file/KEY123/Landing");
        assert_eq!(artifact.root_node_id.as_deref(), Some("0:1"));
    }

    #[tokio::test]
    async fn rejected_token_is_auth_error() {
        let base = serve(vec![("GET /v1/me ", 403, r#"{"err":"Invalid token"}"#)]).await;
        let publisher = FigmaRestPublisher::new("bad", "42", &base, 5).unwrap();
        let err = publisher.publish("Landing", &[]).await.unwrap_err();
        assert!(matches!(err, PublishError::Auth(ref m) if m.contains("Invalid token")), "got {err:?}");
    }

    #[tokio::test]
    async fn missing_team_is_not_found() {
        let base = serve(vec![
            ("GET /v1/me ", 200, r#"{"handle":"dev"}"#),
            ("GET /v1/teams/42/projects ", 404, r#"{"err":"Not found"}"#),
        ])
        .await;
        let publisher = FigmaRestPublisher::new("tok", "42", &base, 5).unwrap();
        let err = publisher.publish("Landing", &[]).await.unwrap_err();
        assert!(matches!(err, PublishError::NotFound(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn empty_team_is_not_found() {
        let base = serve(vec![
            ("GET /v1/me ", 200, r#"{}"#),
            ("GET /v1/teams/42/projects ", 200, r#"{"projects":[]}"#),
        ])
        .await;
        let publisher = FigmaRestPublisher::new("tok", "42", &base, 5).unwrap();
        let err = publisher.publish("Landing", &[]).await.unwrap_err();
        assert!(matches!(err, PublishError::NotFound(ref m) if m.contains("42")));
    }

    #[tokio::test]
    async fn server_error_is_api_error() {
        let base = serve(vec![("GET /v1/me ", 503, "busy")]).await;
        let publisher = FigmaRestPublisher::new("tok", "42", &base, 5).unwrap();
        let err = publisher.publish("Landing", &[]).await.unwrap_err();
        assert!(matches!(err, PublishError::Api { status: 503, .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn unreachable_host_is_transport_error() {
        // Bind then drop to get a port nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let publisher = FigmaRestPublisher::new("tok", "42", &format!("http://{addr}"), 5).unwrap();
        let err = publisher.publish("Landing", &[]).await.unwrap_err();
        assert!(matches!(err, PublishError::Transport(_)), "got {err:?}");
    }
}
