use axum::http::header::WWW_AUTHENTICATE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sha1::{Digest, Sha1};
use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

/// Challenge sent along with a 401, prompting clients for Basic credentials.
pub const BASIC_CHALLENGE: &str = r#"Basic realm="Secure Area""#;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Login!")]
    Unauthorized,
    #[error("Forbidden")]
    Forbidden,
    #[error("Forbidden")]
    InvalidCredentials,
    #[error("This operation is not implemented")]
    Unimplemented,
    #[error("Internal error ({})", error_id(_0))]
    ServiceError(#[from] anyhow::Error),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let code = match &self {
            Self::Unauthorized => {
                return (
                    StatusCode::UNAUTHORIZED,
                    [(WWW_AUTHENTICATE, BASIC_CHALLENGE)],
                    self.to_string(),
                )
                    .into_response();
            }
            // unknown users and wrong passwords are not told apart from missing roles
            Self::Forbidden | Self::InvalidCredentials => StatusCode::FORBIDDEN,
            Self::Unimplemented => StatusCode::NOT_IMPLEMENTED,
            Self::ServiceError(error) => {
                tracing::error!(?error, "Encountered service error in auth operation");

                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (code, self.to_string()).into_response()
    }
}

/// We can't disclose the actual message, it could contain private info or attacker-injected strings.
/// But it is useful to differentiate between different types of internal errors.
fn error_id(err: &anyhow::Error) -> String {
    let msg = err.to_string();
    let digest = hex::encode(Sha1::digest(msg.as_bytes()));
    digest[..6].to_owned()
}
