pub mod middleware;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct FirebaseErrorResponse {
    pub error: FirebaseErrorDetails,
}

#[derive(Debug, Deserialize)]
pub struct FirebaseErrorDetails {
    pub code: u16,
    pub message: String,
    pub status: Option<String>,
    pub errors: Option<Vec<FirebaseSubError>>,
}

#[derive(Debug, Deserialize)]
pub struct FirebaseSubError {
    pub message: String,
    pub domain: Option<String>,
    pub reason: Option<String>,
}

impl FirebaseErrorResponse {
    pub fn display_message(&self) -> String {
        format!("{} (code: {})", self.error.message, self.error.code)
    }

    /// The leading error code of the message, e.g. `TOO_MANY_ATTEMPTS_TRY_LATER`
    /// for `"TOO_MANY_ATTEMPTS_TRY_LATER : Access disabled..."`.
    pub fn error_code(&self) -> &str {
        self.error
            .message
            .split(|c: char| c == ' ' || c == ':')
            .next()
            .unwrap_or_default()
    }
}

/// Renders a failed response as a message, falling back to `default_msg` and
/// the status when the body is not a Firebase error envelope.
pub async fn parse_error_response(response: reqwest::Response, default_msg: &str) -> String {
    let status = response.status();
    match response.json::<FirebaseErrorResponse>().await {
        Ok(error_resp) => error_resp.display_message(),
        Err(_) => format!("{}: {}", default_msg, status),
    }
}
