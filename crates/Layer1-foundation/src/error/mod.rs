//! Error types for the wercker runner
//!
//! 모든 에러를 중앙에서 관리

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Wercker runner 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // 설정 관련
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    // ========================================================================
    // 스테이징 관련 (host filesystem)
    // ========================================================================
    #[error("Staging error: {0}")]
    Staging(String),

    // ========================================================================
    // 컨테이너 엔진 관련
    // ========================================================================
    #[error("Docker error: {0}")]
    Docker(String),

    // ========================================================================
    // 세션 프로토콜 관련
    // ========================================================================
    #[error("Session error: {0}")]
    Session(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    // ========================================================================
    // 일반
    // ========================================================================
    #[error("Not found: {0}")]
    NotFound(String),

    // ========================================================================
    // 외부 에러 변환
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // ========================================================================
    // 기타
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// 빌드를 중단시키는 에러인지 확인
    ///
    /// Command failures inside the container are observed through exit
    /// statuses and never surface as an `Error`; everything that does reach
    /// this type stops the build except a protocol timeout, which the caller
    /// may report per command.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Timeout(_))
    }

    /// Staging 에러 생성 헬퍼
    pub fn staging(message: impl Into<String>) -> Self {
        Error::Staging(message.into())
    }

    /// Docker 에러 생성 헬퍼
    pub fn docker(message: impl Into<String>) -> Self {
        Error::Docker(message.into())
    }
}

// ============================================================================
// From 구현 (추가 변환)
// ============================================================================

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}
