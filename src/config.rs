//! Engine configuration.

const DEFAULT_ACTIVATION_TTL_SECONDS: i64 = 60 * 60;
const DEFAULT_RESET_TTL_SECONDS: i64 = 60 * 60;
const DEFAULT_APP_NAME: &str = env!("CARGO_PKG_NAME");

#[derive(Clone, Debug)]
pub struct AccountConfig {
    base_url: String,
    app_name: String,
    activation_ttl_seconds: i64,
    reset_ttl_seconds: i64,
    revoke_prior_reset_tokens: bool,
}

impl AccountConfig {
    /// `base_url` is the public origin that activation and reset links are
    /// built against, e.g. `https://app.example.com`.
    #[must_use]
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            app_name: DEFAULT_APP_NAME.to_string(),
            activation_ttl_seconds: DEFAULT_ACTIVATION_TTL_SECONDS,
            reset_ttl_seconds: DEFAULT_RESET_TTL_SECONDS,
            revoke_prior_reset_tokens: false,
        }
    }

    #[must_use]
    pub fn with_app_name(mut self, app_name: String) -> Self {
        self.app_name = app_name;
        self
    }

    #[must_use]
    pub fn with_activation_ttl_seconds(mut self, seconds: i64) -> Self {
        self.activation_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_reset_ttl_seconds(mut self, seconds: i64) -> Self {
        self.reset_ttl_seconds = seconds;
        self
    }

    /// When enabled, a password-reset request first revokes the account's
    /// outstanding reset tokens. Off by default: repeated requests would
    /// otherwise let anyone who knows an email address keep invalidating the
    /// legitimate user's live token.
    #[must_use]
    pub fn with_revoke_prior_reset_tokens(mut self, enabled: bool) -> Self {
        self.revoke_prior_reset_tokens = enabled;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    #[must_use]
    pub fn activation_ttl_seconds(&self) -> i64 {
        self.activation_ttl_seconds
    }

    #[must_use]
    pub fn reset_ttl_seconds(&self) -> i64 {
        self.reset_ttl_seconds
    }

    #[must_use]
    pub fn revoke_prior_reset_tokens(&self) -> bool {
        self.revoke_prior_reset_tokens
    }
}
