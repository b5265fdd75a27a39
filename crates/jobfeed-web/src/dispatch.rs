//! Resume dispatch: one message per posting, sent through a bearer-token
//! mail API.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use jobfeed_core::Posting;
use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("mail provider rejected the credentials (http {status})")]
    Unauthorized { status: u16 },
    #[error("mail provider returned http {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("posting {id} has no contact email")]
    NoRecipient { id: String },
    #[error("mail request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Uploaded resume file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeAttachment {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait ResumeDispatcher: Send + Sync {
    async fn send(&self, posting: &Posting, resume: &ResumeAttachment) -> Result<(), DispatchError>;
}

/// Subject line of the application mail ("application for <title>").
pub fn subject_for(posting: &Posting) -> String {
    format!("应聘 {}", posting.title)
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub api_url: String,
    pub access_token: String,
    pub sender: String,
}

impl MailConfig {
    /// `None` unless URL, token and sender are all set.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let value = |key: &str| get(key).filter(|v| !v.trim().is_empty());
        Some(Self {
            api_url: value("JOBFEED_MAIL_API_URL")?,
            access_token: value("JOBFEED_MAIL_ACCESS_TOKEN")?,
            sender: value("JOBFEED_MAIL_SENDER")?,
        })
    }
}

#[derive(Debug, Serialize)]
struct MailAttachment<'a> {
    filename: &'a str,
    content_type: &'a str,
    content: String,
}

#[derive(Debug, Serialize)]
struct MailMessage<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: String,
    text: String,
    attachments: [MailAttachment<'a>; 1],
}

pub struct HttpMailDispatcher {
    client: reqwest::Client,
    config: MailConfig,
}

impl HttpMailDispatcher {
    pub fn new(config: MailConfig) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl ResumeDispatcher for HttpMailDispatcher {
    async fn send(&self, posting: &Posting, resume: &ResumeAttachment) -> Result<(), DispatchError> {
        if !posting.has_email() {
            return Err(DispatchError::NoRecipient {
                id: posting.id.clone(),
            });
        }
        let message = MailMessage {
            from: &self.config.sender,
            to: [posting.email.as_str()],
            subject: subject_for(posting),
            text: format!(
                "您好，\n\n附件是我的简历，应聘贵方发布的「{}」岗位，期待回复。",
                posting.title
            ),
            attachments: [MailAttachment {
                filename: &resume.file_name,
                content_type: &resume.content_type,
                content: STANDARD.encode(&resume.bytes),
            }],
        };

        let resp = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.access_token)
            .json(&message)
            .send()
            .await?;
        let status = resp.status();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(DispatchError::Unauthorized {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DispatchError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        debug!(id = %posting.id, to = %posting.email, "resume sent");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::routing::post;
    use axum::{Json, Router};
    use chrono::NaiveDate;
    use jobfeed_core::EmploymentType;
    use serde_json::Value;
    use tokio::net::TcpListener;

    use super::*;

    pub(crate) fn posting(id: &str, email: &str) -> Posting {
        Posting {
            id: id.to_string(),
            date: NaiveDate::from_ymd_opt(2026, 10, 1).unwrap(),
            company: "Marisa".into(),
            title: "后端工程师".into(),
            salary: "1800U".into(),
            email: email.into(),
            tags: vec!["招聘".into(), "后端工程师".into()],
            employment_type: EmploymentType::FullTime,
            location: "远程".into(),
            raw_content: "#招聘 #后端工程师".into(),
        }
    }

    fn resume() -> ResumeAttachment {
        ResumeAttachment {
            file_name: "cv.pdf".into(),
            content_type: "application/pdf".into(),
            bytes: b"%PDF-1.4".to_vec(),
        }
    }

    type Captured = Arc<Mutex<Vec<(Option<String>, Value)>>>;

    /// Local stand-in for the mail provider answering every request with `status`.
    async fn mail_api(status: AxumStatus) -> (String, Captured) {
        let captured: Captured = Arc::default();
        let app = Router::new()
            .route(
                "/send",
                post(
                    |State((captured, status)): State<(Captured, AxumStatus)>,
                     headers: HeaderMap,
                     Json(body): Json<Value>| async move {
                        let auth = headers
                            .get("authorization")
                            .and_then(|v| v.to_str().ok())
                            .map(String::from);
                        captured.lock().unwrap().push((auth, body));
                        status
                    },
                ),
            )
            .with_state((captured.clone(), status));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/send"), captured)
    }

    fn dispatcher(api_url: String) -> HttpMailDispatcher {
        HttpMailDispatcher::new(MailConfig {
            api_url,
            access_token: "token-1".into(),
            sender: "me@example.com".into(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn posts_one_message_with_encoded_attachment() {
        let (url, captured) = mail_api(AxumStatus::ACCEPTED).await;
        dispatcher(url)
            .send(&posting("c/1", "hr@marisa.io"), &resume())
            .await
            .unwrap();

        let captured = captured.lock().unwrap();
        assert_eq!(captured.len(), 1);
        let (auth, body) = &captured[0];
        assert_eq!(auth.as_deref(), Some("Bearer token-1"));
        assert_eq!(body["to"][0], "hr@marisa.io");
        assert_eq!(body["from"], "me@example.com");
        assert_eq!(body["subject"], "应聘 后端工程师");
        assert_eq!(body["attachments"][0]["filename"], "cv.pdf");
        assert_eq!(body["attachments"][0]["content"], STANDARD.encode(b"%PDF-1.4"));
    }

    #[tokio::test]
    async fn auth_failure_is_distinguished() {
        let (url, _) = mail_api(AxumStatus::UNAUTHORIZED).await;
        let err = dispatcher(url)
            .send(&posting("c/1", "hr@marisa.io"), &resume())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Unauthorized { status: 401 }));

        let (url, _) = mail_api(AxumStatus::BAD_GATEWAY).await;
        let err = dispatcher(url)
            .send(&posting("c/1", "hr@marisa.io"), &resume())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Rejected { status: 502, .. }));
    }

    #[tokio::test]
    async fn posting_without_email_is_not_sent() {
        let (url, captured) = mail_api(AxumStatus::OK).await;
        let err = dispatcher(url)
            .send(&posting("c/2", ""), &resume())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::NoRecipient { .. }));
        assert!(captured.lock().unwrap().is_empty());
    }

    #[test]
    fn mail_config_needs_every_value() {
        let mut vars = HashMap::from([
            ("JOBFEED_MAIL_API_URL", "https://mail.example/send"),
            ("JOBFEED_MAIL_ACCESS_TOKEN", "t"),
        ]);
        assert!(MailConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).is_none());
        vars.insert("JOBFEED_MAIL_SENDER", "me@example.com");
        let config = MailConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.sender, "me@example.com");
    }
}
