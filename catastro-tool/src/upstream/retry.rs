//! Requêtes HTTP avec nouvelles tentatives sur erreurs transitoires
//!
//! Attente linéaire entre deux tentatives (`base_delay × n`). Les erreurs de
//! connexion, délais, HTTP 429 et 5xx sont retentées; les autres 4xx sont
//! définitives.

use std::time::Duration;

use bytes::Bytes;
use tracing::debug;

use afecciones::AfeccionError;

/// Politique de nouvelles tentatives
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Nombre de tentatives après la première
    pub max_retries: u32,
    /// Attente avant la première nouvelle tentative
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Attente avant la tentative `attempt` (1 = première nouvelle tentative)
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// Réponse HTTP lue entièrement
#[derive(Debug, Clone)]
pub struct Fetched {
    pub status: reqwest::StatusCode,
    pub body: Bytes,
}

/// Envoie une requête et lit le corps, avec nouvelles tentatives
///
/// `build_request` est rappelée à chaque tentative (un `RequestBuilder` est
/// consommé par `send`). Les réponses 4xx (hors 429) sont rendues telles
/// quelles: c'est à l'appelant de les interpréter.
pub async fn send_bytes<F>(
    service: &str,
    policy: &RetryPolicy,
    build_request: F,
) -> Result<Fetched, AfeccionError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_error = String::new();

    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            let delay = policy.delay(attempt);
            debug!(service, attempt, max = policy.max_retries, delay = ?delay, "Retrying request");
            tokio::time::sleep(delay).await;
        }

        let response = match build_request().send().await {
            Ok(response) => response,
            Err(e) if is_transient(&e) => {
                debug!(service, error = %e, "Transient HTTP error");
                last_error = e.to_string();
                continue;
            }
            Err(e) => return Err(AfeccionError::upstream(service, e.to_string())),
        };

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            debug!(service, %status, "Retryable HTTP status");
            last_error = format!("HTTP {}", status);
            continue;
        }

        match response.bytes().await {
            Ok(body) => return Ok(Fetched { status, body }),
            Err(e) => {
                debug!(service, error = %e, "Response body read failed");
                last_error = e.to_string();
            }
        }
    }

    Err(AfeccionError::upstream(
        service,
        format!(
            "{} (after {} retries)",
            if last_error.is_empty() {
                "request failed"
            } else {
                &last_error
            },
            policy.max_retries
        ),
    ))
}

/// Erreurs susceptibles de disparaître à la tentative suivante
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_request()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.delay(2), Duration::from_secs(2));
        assert_eq!(RetryPolicy::with_max_retries(5).max_retries, 5);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_upstream_error() {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(200))
            .build()
            .unwrap();
        let policy = RetryPolicy {
            max_retries: 1,
            base_delay: Duration::from_millis(1),
        };
        // Port 9 (discard) sur la boucle locale: connexion refusée
        let err = send_bytes("test", &policy, || client.get("http://127.0.0.1:9/"))
            .await
            .unwrap_err();
        assert!(matches!(err, AfeccionError::UpstreamUnavailable { .. }));
        assert!(err.to_string().contains("after 1 retries"));
    }
}
