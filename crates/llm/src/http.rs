//! Shared, tuned HTTP client used by every ASR/LLM/TTS backend (§5 shared-resource policy).
//!
//! One `reqwest::Client` per process: HTTP/2 is negotiated opportunistically
//! over TLS (falling back to HTTP/1.1 for plaintext self-hosted backends),
//! idle connections are kept for 90s, and a connect must complete within
//! 30s. Backend-specific request timeouts (30s for ASR/TTS, 60-120s for
//! LLM) are applied per-call with `.timeout()` on top of this shared pool.

use std::time::Duration;

use reqwest::Client;

const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_IDLE_PER_HOST: usize = 32;

pub fn build_http_client() -> Client {
    Client::builder()
        .pool_idle_timeout(POOL_IDLE_TIMEOUT)
        .pool_max_idle_per_host(MAX_IDLE_PER_HOST)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .expect("static reqwest client configuration is always valid")
}
