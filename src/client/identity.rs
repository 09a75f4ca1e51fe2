use crate::transport::Headers;
use crate::types::{ADMIN_ROLE_MARKER, header_names};

/// Who the session connects as
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientIdentity {
    pub user_id: String,
    /// Display name; falls back to `user_id`
    pub user_name: Option<String>,
    pub roles: Vec<String>,
    pub call_type: String,
}

impl ClientIdentity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }

    pub fn with_user_name(mut self, user_name: impl Into<String>) -> Self {
        self.user_name = Some(user_name.into());
        self
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_call_type(mut self, call_type: impl Into<String>) -> Self {
        self.call_type = call_type.into();
        self
    }

    /// Any role name containing `Admin`
    pub fn has_admin_role(&self) -> bool {
        self.roles.iter().any(|role| role.contains(ADMIN_ROLE_MARKER))
    }

    /// Connect-time headers, sent on every (re)connect
    pub fn connect_headers(&self, trace_id: &str) -> Headers {
        let mut headers = Headers::new();
        headers.insert(header_names::LOGIN_USER_ID.to_string(), self.user_id.clone());
        headers.insert(
            header_names::LOGIN_USER_NAME.to_string(),
            self.user_name.clone().unwrap_or_else(|| self.user_id.clone()),
        );
        headers.insert(header_names::USER_ROLES.to_string(), self.roles.join(","));
        headers.insert(header_names::APP_CALL_TYPE.to_string(), self.call_type.clone());
        headers.insert(header_names::TRACE_ID.to_string(), trace_id.to_string());
        headers
    }
}
