//! Alertmanager bridge (alternate mode, §6): for monitors declaring
//! `alertmanagerUrl`, POST a JSON array containing a single alert object.
//! A non-2xx response is logged and swallowed -- this path never fails
//! the alert pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::store::MonitorState;

#[derive(Serialize)]
struct Alert {
    labels: Labels,
    annotations: Annotations,
    #[serde(rename = "generatorURL")]
    generator_url: String,
    #[serde(rename = "startsAt")]
    starts_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct Labels {
    alertname: String,
    monitor: String,
    namespace: String,
    state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tags: Option<String>,
}

#[derive(Serialize)]
struct Annotations {
    summary: String,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none", rename = "runbook_url")]
    runbook_url: Option<String>,
}

pub struct AlertmanagerBridge {
    client: reqwest::Client,
}

impl Default for AlertmanagerBridge {
    fn default() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl AlertmanagerBridge {
    fn state_label(state: MonitorState) -> &'static str {
        match state {
            MonitorState::Down => "firing",
            _ => "resolved",
        }
    }

    pub async fn notify(
        &self,
        url: &str,
        namespace: &str,
        name: &str,
        state: MonitorState,
        tags: &[String],
        reason: &str,
        message: &str,
    ) {
        let alert = Alert {
            labels: Labels {
                alertname: format!("{namespace}_{name}"),
                monitor: name.to_string(),
                namespace: namespace.to_string(),
                state: Self::state_label(state).to_string(),
                tags: (!tags.is_empty()).then(|| tags.join(",")),
            },
            annotations: Annotations {
                summary: format!("{name} is {}", Self::state_label(state)),
                description: format!("{reason}: {message}"),
                runbook_url: None,
            },
            generator_url: format!("https://yuptime.invalid/monitors/{namespace}/{name}"),
            starts_at: Utc::now(),
        };

        match self.client.post(url).json(&[alert]).send().await {
            Ok(response) if !response.status().is_success() => {
                warn!(url, status = %response.status(), "alertmanager bridge received non-2xx response");
            }
            Err(e) => {
                warn!(url, error = %e, "alertmanager bridge request failed");
            }
            _ => {}
        }
    }
}
