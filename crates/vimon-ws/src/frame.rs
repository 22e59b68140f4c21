//! Outbound wire directives.
//!
//! The broker's realtime gateway takes JSON directives of the form
//! `{"header": {"token": ..., "tr_type": ...}, "body": {"tr_cd": ..., "tr_key": ...}}`.
//! `tr_type` selects the action ("3" subscribe, "4" unsubscribe), `tr_cd`
//! names the channel and `tr_key` the key within it (a market code for the
//! VI channel, a symbol for trade channels).

use serde::Serialize;

const TR_TYPE_SUBSCRIBE: &str = "3";
const TR_TYPE_UNSUBSCRIBE: &str = "4";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveAction {
    Subscribe,
    Unsubscribe,
}

impl DirectiveAction {
    fn tr_type(&self) -> &'static str {
        match self {
            Self::Subscribe => TR_TYPE_SUBSCRIBE,
            Self::Unsubscribe => TR_TYPE_UNSUBSCRIBE,
        }
    }
}

/// A subscribe or unsubscribe directive, rendered to the wire with the
/// session token injected by the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub action: DirectiveAction,
    pub tr_cd: String,
    pub tr_key: String,
}

impl Directive {
    pub fn subscribe(tr_cd: impl Into<String>, tr_key: impl Into<String>) -> Self {
        Self {
            action: DirectiveAction::Subscribe,
            tr_cd: tr_cd.into(),
            tr_key: tr_key.into(),
        }
    }

    pub fn unsubscribe(tr_cd: impl Into<String>, tr_key: impl Into<String>) -> Self {
        Self {
            action: DirectiveAction::Unsubscribe,
            tr_cd: tr_cd.into(),
            tr_key: tr_key.into(),
        }
    }

    /// Channel registry key, used for active-subscription tracking.
    pub fn channel_key(&self) -> String {
        format!("{}:{}", self.tr_cd, self.tr_key)
    }

    /// Render the directive as its wire JSON with the given session token.
    pub fn render(&self, token: &str) -> serde_json::Result<String> {
        #[derive(Serialize)]
        struct Header<'a> {
            token: &'a str,
            tr_type: &'a str,
        }

        #[derive(Serialize)]
        struct Body<'a> {
            tr_cd: &'a str,
            tr_key: &'a str,
        }

        #[derive(Serialize)]
        struct Wire<'a> {
            header: Header<'a>,
            body: Body<'a>,
        }

        serde_json::to_string(&Wire {
            header: Header {
                token,
                tr_type: self.action.tr_type(),
            },
            body: Body {
                tr_cd: &self.tr_cd,
                tr_key: &self.tr_key,
            },
        })
    }
}
