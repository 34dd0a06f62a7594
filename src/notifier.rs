use serde::Serialize;

use crate::model::{api::election::ResultsDescription, db::results::ElectionResults};

/// Sends a notice when an election completes, if a webhook is configured.
#[derive(Debug, Clone)]
pub struct Notifier {
    target: Option<Webhook>,
}

#[derive(Debug, Clone)]
struct Webhook {
    client: reqwest::Client,
    url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompletionNotice<'a> {
    event: &'a str,
    results: ResultsDescription,
}

impl Notifier {
    /// A notifier that drops every notice.
    pub fn disabled() -> Self {
        Self { target: None }
    }

    /// A notifier that POSTs a JSON notice to `url`.
    pub fn webhook(url: String) -> Self {
        Self {
            target: Some(Webhook {
                client: reqwest::Client::new(),
                url,
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.target.is_some()
    }

    /// Announce an election's final results.
    ///
    /// Delivery failures are logged and otherwise ignored.
    pub async fn election_completed(&self, results: &ElectionResults) {
        let webhook = match &self.target {
            Some(webhook) => webhook,
            None => {
                debug!("Notices disabled, not announcing election {}", results.election_id);
                return;
            }
        };
        let notice = CompletionNotice {
            event: "election_completed",
            results: results.clone().into(),
        };
        let sent = webhook
            .client
            .post(&webhook.url)
            .json(&notice)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);
        match sent {
            Ok(_) => info!("Announced completion of election {}", results.election_id),
            Err(e) => warn!(
                "Failed to announce completion of election {}: {e}",
                results.election_id
            ),
        }
    }
}
