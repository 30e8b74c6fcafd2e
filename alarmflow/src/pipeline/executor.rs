//! Stage 3: poll every vendor URL and decode the alarms it returns.
//!
//! Each provider has its own [`ConcurrencyLimit`]; a slow vendor never
//! starves the other. Only timeouts are retried. Every retry slides the
//! window end to the current time, rebuilds the URL and re-reads the token.

use super::url_builder::PollRequest;
use super::Stage;
use crate::auth::TokenStore;
use crate::errors::{StageError, TransportError};
use crate::fanout::{ConcurrencyLimit, TaskGroup};
use crate::model::{Alarm, Provider};
use crate::ports::PollTransport;
use crate::providers::ProviderEndpoints;
use crate::retry::{with_retry, RetryConfig};
use crate::utils::now_unix;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

/// Issues vendor requests with retry and per-provider limits.
pub struct PollExecutor {
    transport: Arc<dyn PollTransport>,
    endpoints: Arc<ProviderEndpoints>,
    tokens: Arc<TokenStore>,
    retry: RetryConfig,
    iopgps_limit: ConcurrencyLimit,
    whatsgps_limit: ConcurrencyLimit,
}

impl PollExecutor {
    /// Creates an executor with the given per-provider ceilings.
    #[must_use]
    pub fn new(
        transport: Arc<dyn PollTransport>,
        endpoints: Arc<ProviderEndpoints>,
        tokens: Arc<TokenStore>,
        iopgps_permits: usize,
        whatsgps_permits: usize,
    ) -> Self {
        Self {
            transport,
            endpoints,
            tokens,
            retry: RetryConfig::default(),
            iopgps_limit: ConcurrencyLimit::new(iopgps_permits),
            whatsgps_limit: ConcurrencyLimit::new(whatsgps_permits),
        }
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn limit_for(&self, provider: Provider) -> &ConcurrencyLimit {
        match provider {
            Provider::WhatsGps => &self.whatsgps_limit,
            Provider::WanWayTech | Provider::Unknown => &self.iopgps_limit,
        }
    }

    /// Polls every request and returns the collected alarms.
    pub async fn poll_all(&self, requests: Vec<PollRequest>) -> Vec<Alarm> {
        let collected = Arc::new(Mutex::new(Vec::new()));
        let mut group = TaskGroup::new("poll_executor");

        for request in requests {
            let limit = self.limit_for(request.provider).clone();
            let poller = Poller {
                transport: self.transport.clone(),
                endpoints: self.endpoints.clone(),
                tokens: self.tokens.clone(),
                retry: self.retry.clone(),
            };
            let collected = collected.clone();

            group.spawn(&limit, async move {
                let alarms = poller.poll(request).await;
                if !alarms.is_empty() {
                    collected.lock().extend(alarms);
                }
            });
        }

        group.join().await;
        let mut alarms = collected.lock();
        std::mem::take(&mut *alarms)
    }
}

struct Poller {
    transport: Arc<dyn PollTransport>,
    endpoints: Arc<ProviderEndpoints>,
    tokens: Arc<TokenStore>,
    retry: RetryConfig,
}

impl Poller {
    async fn poll(&self, request: PollRequest) -> Vec<Alarm> {
        let provider = request.provider;
        let device_id = request.device_id.as_str();

        let fetched = with_retry(&self.retry, device_id, TransportError::is_timeout, |attempt| {
            let url = if attempt == 0 {
                Ok(request.url.clone())
            } else {
                let window = request.window.slide_to(now_unix());
                self.endpoints
                    .build_url(provider, device_id, window)
                    .map_err(|e| TransportError::Request {
                        url: request.url.clone(),
                        message: e.to_string(),
                    })
            };
            let headers = self.headers(provider);

            async move {
                let url = url?;
                self.transport.get(&url, &headers).await
            }
        })
        .await;

        let body = match fetched {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(device_id, provider = provider.as_str(), error = %e, "Dropping poll request");
                return Vec::new();
            }
        };

        match self.endpoints.decode(provider, &body) {
            Ok(alarms) => {
                tracing::debug!(device_id, alarms = alarms.len(), "Polled vendor");
                alarms
            }
            Err(e) => {
                tracing::warn!(device_id, provider = provider.as_str(), url = %request.url, error = %e, "Failed to decode vendor response");
                Vec::new()
            }
        }
    }

    fn headers(&self, provider: Provider) -> Vec<(&'static str, String)> {
        match (ProviderEndpoints::token_header(provider), self.tokens.value()) {
            (Some(name), Some(token)) => vec![(name, token)],
            _ => Vec::new(),
        }
    }
}

impl std::fmt::Debug for PollExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollExecutor")
            .field("retry", &self.retry)
            .field("iopgps_permits", &self.iopgps_limit.permits())
            .field("whatsgps_permits", &self.whatsgps_limit.permits())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for PollExecutor {
    type Input = Vec<PollRequest>;
    type Output = Vec<Alarm>;

    fn name(&self) -> &'static str {
        "poll_executor"
    }

    async fn execute(&self, requests: Vec<PollRequest>) -> Result<Vec<Alarm>, StageError> {
        Ok(self.poll_all(requests).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AccessToken;
    use crate::model::AlarmCode;
    use crate::providers::PollWindow;
    use crate::retry::JitterStrategy;
    use crate::utils::{fixed_offset, GUAYAQUIL_OFFSET_SECONDS};

    /// Times out `timeouts` times, then answers with `body`.
    struct ScriptedTransport {
        timeouts: usize,
        body: &'static str,
        calls: Mutex<Vec<(String, Vec<(&'static str, String)>)>>,
    }

    impl ScriptedTransport {
        fn new(timeouts: usize, body: &'static str) -> Self {
            Self {
                timeouts,
                body,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PollTransport for ScriptedTransport {
        async fn get(&self, url: &str, headers: &[(&'static str, String)]) -> Result<Vec<u8>, TransportError> {
            let mut calls = self.calls.lock();
            calls.push((url.to_string(), headers.to_vec()));
            if calls.len() <= self.timeouts {
                return Err(TransportError::Timeout { url: url.to_string() });
            }
            Ok(self.body.as_bytes().to_vec())
        }
    }

    const IOPGPS_BODY: &str = r#"{"code":0,"details":[{"imei":"860419050021378","alarmCode":"SOS","alarmType":99,"time":1709298900,"lat":"-2.18","lng":"-79.88"}]}"#;

    fn endpoints() -> Arc<ProviderEndpoints> {
        Arc::new(ProviderEndpoints {
            iopgps_alarm_url: "https://open.iopgps.com/api/device/alarm".to_string(),
            whatsgps_alarm_url: "https://www.whatsgps.com/alarmSta/queryDetail.do".to_string(),
            whatsgps_token: "wg".to_string(),
            vendor_offset: fixed_offset(GUAYAQUIL_OFFSET_SECONDS).unwrap(),
        })
    }

    fn request(provider: Provider) -> PollRequest {
        let window = PollWindow { start: 0, end: 100 };
        let url = endpoints().build_url(provider, "860419050021378", window).unwrap();
        PollRequest {
            device_id: "860419050021378".to_string(),
            provider,
            window,
            url,
        }
    }

    fn executor(transport: Arc<ScriptedTransport>, tokens: TokenStore) -> PollExecutor {
        PollExecutor::new(transport, endpoints(), Arc::new(tokens), 5, 10).with_retry(
            RetryConfig::new()
                .with_base_delay_ms(1)
                .with_max_delay_ms(2)
                .with_jitter(JitterStrategy::None),
        )
    }

    #[tokio::test]
    async fn test_poll_decodes_alarms_and_sends_token() {
        let transport = Arc::new(ScriptedTransport::new(0, IOPGPS_BODY));
        let tokens = TokenStore::with_token(AccessToken::new("tok", 0));
        let executor = executor(transport.clone(), tokens);

        let alarms = executor.poll_all(vec![request(Provider::WanWayTech)]).await;

        assert_eq!(alarms.len(), 1);
        assert_eq!(alarms[0].alarm_code, AlarmCode::Sos);
        let calls = transport.calls.lock();
        assert_eq!(calls[0].1, vec![("AccessToken", "tok".to_string())]);
    }

    #[tokio::test]
    async fn test_whatsgps_sends_no_header() {
        let transport = Arc::new(ScriptedTransport::new(0, r#"{"ret":1,"total":0,"data":null}"#));
        let tokens = TokenStore::with_token(AccessToken::new("tok", 0));
        let executor = executor(transport.clone(), tokens);

        let alarms = executor.poll_all(vec![request(Provider::WhatsGps)]).await;

        assert!(alarms.is_empty());
        assert!(transport.calls.lock()[0].1.is_empty());
    }

    #[tokio::test]
    async fn test_timeouts_below_limit_succeed_with_recomputed_window() {
        let transport = Arc::new(ScriptedTransport::new(3, IOPGPS_BODY));
        let executor = executor(transport.clone(), TokenStore::new());
        let original = request(Provider::WanWayTech);

        let alarms = executor.poll_all(vec![original.clone()]).await;

        assert_eq!(alarms.len(), 1);
        let calls = transport.calls.lock();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[0].0, original.url);
        for (url, _) in calls.iter().skip(1) {
            assert_ne!(url, &original.url);
            assert!(url.contains("startTime=0"));
            assert!(!url.contains("endTime=100"));
        }
    }

    #[tokio::test]
    async fn test_timeouts_at_limit_abandon_url() {
        let transport = Arc::new(ScriptedTransport::new(7, IOPGPS_BODY));
        let executor = executor(transport.clone(), TokenStore::new());

        let alarms = executor.poll_all(vec![request(Provider::WanWayTech)]).await;

        assert!(alarms.is_empty());
        assert_eq!(transport.calls.lock().len(), 7);
    }

    struct StatusTransport;

    #[async_trait]
    impl PollTransport for StatusTransport {
        async fn get(&self, url: &str, _headers: &[(&'static str, String)]) -> Result<Vec<u8>, TransportError> {
            Err(TransportError::Status {
                url: url.to_string(),
                status: 500,
                body: "boom".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_status_error_is_not_retried() {
        let executor = PollExecutor::new(Arc::new(StatusTransport), endpoints(), Arc::new(TokenStore::new()), 5, 10);

        let alarms = executor
            .poll_all(vec![request(Provider::WanWayTech), request(Provider::WhatsGps)])
            .await;

        assert!(alarms.is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_body_contributes_nothing() {
        let transport = Arc::new(ScriptedTransport::new(0, "<html>maintenance</html>"));
        let executor = executor(transport, TokenStore::new());

        let alarms = executor.poll_all(vec![request(Provider::WanWayTech)]).await;

        assert!(alarms.is_empty());
    }

    #[tokio::test]
    async fn test_vendor_error_code_contributes_nothing() {
        let transport = Arc::new(ScriptedTransport::new(0, r#"{"code":1001,"details":null}"#));
        let executor = executor(transport.clone(), TokenStore::new());

        let alarms = executor.poll_all(vec![request(Provider::WanWayTech)]).await;

        assert!(alarms.is_empty());
        assert_eq!(transport.calls.lock().len(), 1);
    }
}
