use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

const USERS_INFO_URL: &str = "https://slack.com/api/users.info";
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Profile fields returned by a successful identifier lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedUser {
    pub real_name: String,
    pub display_name: String,
}

/// Outcome of resolving one identifier. A failed lookup is a value, not an
/// error: the run continues with the identifier retained verbatim.
#[derive(Debug, Clone)]
pub enum Resolution {
    Resolved(ResolvedUser),
    Unresolved { id: String, reason: String },
}

/// Errors from a single lookup attempt. These never abort the run; the
/// caching resolver folds them into `Resolution::Unresolved`.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Slack API error: {0}")]
    Api(String),
}

/// The resolution step seen by the converter. Injected rather than
/// constructed internally so tests can supply a fake. Only used through
/// generic bounds, never as a trait object.
#[allow(async_fn_in_trait)]
pub trait UserResolver {
    async fn resolve(&mut self, id: &str) -> Resolution;
}

/// Backend performing one uncached lookup.
#[allow(async_fn_in_trait)]
pub trait UserLookup {
    async fn lookup(&self, id: &str) -> Result<ResolvedUser, LookupError>;
}

/// Wraps a lookup backend with an in-run cache so each unique identifier is
/// looked up at most once. Failures are cached too: a revoked token should
/// not trigger one network round-trip per message. The cache is not
/// persisted across runs.
pub struct CachingResolver<L> {
    backend: L,
    cache: HashMap<String, Resolution>,
}

impl<L: UserLookup> CachingResolver<L> {
    pub fn new(backend: L) -> Self {
        Self {
            backend,
            cache: HashMap::new(),
        }
    }
}

impl<L: UserLookup> UserResolver for CachingResolver<L> {
    async fn resolve(&mut self, id: &str) -> Resolution {
        if let Some(hit) = self.cache.get(id) {
            return hit.clone();
        }
        let resolution = match self.backend.lookup(id).await {
            Ok(user) => Resolution::Resolved(user),
            Err(e) => Resolution::Unresolved {
                id: id.to_string(),
                reason: e.to_string(),
            },
        };
        self.cache.insert(id.to_string(), resolution.clone());
        resolution
    }
}

/// `users.info` response envelope. Slack reports failures in-band with
/// `ok: false` and an `error` string.
#[derive(Debug, Deserialize)]
struct UsersInfoResponse {
    ok: bool,
    error: Option<String>,
    user: Option<UserPayload>,
}

#[derive(Debug, Deserialize)]
struct UserPayload {
    name: Option<String>,
    real_name: Option<String>,
    profile: Option<ProfilePayload>,
}

#[derive(Debug, Deserialize)]
struct ProfilePayload {
    real_name: Option<String>,
    display_name: Option<String>,
}

impl UsersInfoResponse {
    fn into_resolved(self) -> Result<ResolvedUser, LookupError> {
        if !self.ok {
            return Err(LookupError::Api(
                self.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        let user = self
            .user
            .ok_or_else(|| LookupError::Api("response is missing the user payload".to_string()))?;
        let profile = user.profile.unwrap_or(ProfilePayload {
            real_name: None,
            display_name: None,
        });
        let fallback = user.name.unwrap_or_default();
        let real_name = profile
            .real_name
            .or(user.real_name)
            .unwrap_or_else(|| fallback.clone());
        let display_name = profile
            .display_name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| real_name.clone());
        Ok(ResolvedUser {
            real_name,
            display_name,
        })
    }
}

/// Live lookup backend against the Slack Web API, authenticated with the
/// token supplied on the command line.
pub struct SlackApi {
    client: reqwest::Client,
    token: String,
}

impl SlackApi {
    pub fn new(token: String) -> Result<Self, LookupError> {
        let client = reqwest::Client::builder().timeout(LOOKUP_TIMEOUT).build()?;
        Ok(Self { client, token })
    }
}

impl UserLookup for SlackApi {
    async fn lookup(&self, id: &str) -> Result<ResolvedUser, LookupError> {
        let response: UsersInfoResponse = self
            .client
            .get(USERS_INFO_URL)
            .query(&[("user", id)])
            .bearer_auth(&self.token)
            .send()
            .await?
            .json()
            .await?;
        response.into_resolved()
    }
}

/// The resolver used by `main` when a token is supplied.
pub type SlackUserResolver = CachingResolver<SlackApi>;

impl SlackUserResolver {
    pub fn with_token(token: String) -> Result<Self, LookupError> {
        Ok(CachingResolver::new(SlackApi::new(token)?))
    }
}
