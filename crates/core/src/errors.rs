use thiserror::Error;

/// Rejections produced by the inbound security gate. Terminal for the
/// request; nothing past the gate runs.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GateError {
    #[error("webhook payload validation failed: {0}")]
    Validation(String),
    #[error("webhook signature rejected")]
    Authentication,
    #[error("rate limit exceeded for key `{key}`")]
    RateLimited { key: String, remaining: u32, retry_after_secs: u64 },
}

/// Failures of external collaborators. Caught at the orchestrator boundary
/// and converted into exactly one user-facing reply; never propagated into
/// the webhook acknowledgment path.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("transcription failed: {0}")]
    Transcription(String),
    #[error("model call failed: {0}")]
    Model(String),
    #[error("model returned malformed output: {0}")]
    MalformedModelOutput(String),
    #[error("calendar connector failed: {0}")]
    Calendar(String),
    #[error("calendar credentials expired")]
    CredentialExpired,
    #[error("knowledge-base connector failed: {0}")]
    Knowledge(String),
    #[error("messaging channel call failed: {0}")]
    Channel(String),
    #[error("storage call failed: {0}")]
    Storage(String),
}

impl UpstreamError {
    /// Portuguese apology shown to the user when a flow fails. Detail stays
    /// in the logs; the reply is intentionally generic except for expired
    /// credentials, which get a re-link prompt.
    pub fn user_reply(&self) -> &'static str {
        match self {
            Self::Transcription(_) => {
                "Não consegui entender o áudio. Pode tentar de novo ou mandar por texto?"
            }
            Self::CredentialExpired => {
                "Seu acesso ao calendário expirou. Envie *conectar* para vincular novamente."
            }
            _ => "Tive um problema para processar sua mensagem. Pode tentar novamente em instantes?",
        }
    }
}
