use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::frame::{FrameHandle, FrameInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ActionId(pub(crate) u64);

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "action-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub url: Url,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl Request {
    pub fn get(url: Url) -> Self {
        Self {
            url,
            method: default_method(),
            headers: BTreeMap::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

fn default_method() -> String {
    String::from("GET")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedirectKind {
    /// Meta refresh or script-initiated location change.
    Client,
    /// HTTP 3xx.
    Server,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationType {
    #[default]
    Other,
    Reload,
    LinkActivated,
    FormSubmitted,
    FormResubmitted,
    BackForward,
    SessionRestoration,
    Redirect(RedirectKind),
}

impl NavigationType {
    pub fn redirect_kind(&self) -> Option<RedirectKind> {
        match self {
            NavigationType::Redirect(kind) => Some(*kind),
            _ => None,
        }
    }

    pub fn is_redirect(&self) -> bool {
        self.redirect_kind().is_some()
    }
}

/// Raw description of a load as reported by the rendering-engine binding.
/// The sequencer turns it into an immutable [`NavigationAction`].
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequest {
    pub request: Request,
    pub navigation_type: NavigationType,
    pub source_frame: FrameHandle,
    /// `None` when the load opens a surface that does not exist yet.
    pub target_frame: Option<FrameHandle>,
    pub user_initiated: bool,
}

impl ActionRequest {
    /// A load of `request` into `frame`, started from that same frame.
    pub fn new(frame: FrameHandle, request: Request) -> Self {
        Self {
            request,
            navigation_type: NavigationType::Other,
            source_frame: frame,
            target_frame: Some(frame),
            user_initiated: false,
        }
    }

    pub fn with_type(mut self, navigation_type: NavigationType) -> Self {
        self.navigation_type = navigation_type;
        self
    }

    pub fn targeting_new_window(mut self) -> Self {
        self.target_frame = None;
        self
    }

    pub fn targeting(mut self, frame: FrameHandle) -> Self {
        self.target_frame = Some(frame);
        self
    }

    pub fn user_initiated(mut self) -> Self {
        self.user_initiated = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NavigationAction {
    id: ActionId,
    request: Request,
    navigation_type: NavigationType,
    source_frame: FrameInfo,
    target_frame: Option<FrameInfo>,
    from: Option<ActionId>,
    redirects: Vec<ActionId>,
    user_initiated: bool,
}

impl NavigationAction {
    pub(crate) fn new(
        id: ActionId,
        raw: ActionRequest,
        source_frame: FrameInfo,
        target_frame: Option<FrameInfo>,
        from: Option<ActionId>,
        redirects: Vec<ActionId>,
    ) -> Self {
        Self {
            id,
            request: raw.request,
            navigation_type: raw.navigation_type,
            source_frame,
            target_frame,
            from,
            redirects,
            user_initiated: raw.user_initiated,
        }
    }

    pub fn id(&self) -> ActionId {
        self.id
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn url(&self) -> &Url {
        &self.request.url
    }

    pub fn navigation_type(&self) -> NavigationType {
        self.navigation_type
    }

    pub fn source_frame(&self) -> &FrameInfo {
        &self.source_frame
    }

    pub fn target_frame(&self) -> Option<&FrameInfo> {
        self.target_frame.as_ref()
    }

    pub fn is_targeting_new_window(&self) -> bool {
        self.target_frame.is_none()
    }

    /// The action this one followed on the same frame, if it is still retained.
    pub fn from(&self) -> Option<ActionId> {
        self.from
    }

    /// Prior actions of this logical load, oldest first.
    pub fn redirects(&self) -> &[ActionId] {
        &self.redirects
    }

    pub fn is_user_initiated(&self) -> bool {
        self.user_initiated
    }
}
