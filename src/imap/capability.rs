//! CAPABILITY string composition.

use crate::imap::config::ImapServerConfig;
use crate::imap::session::EnabledExtensions;

/// Always present, regardless of state.
const COMMON_SUFFIX: &[&str] = &["UNSELECT", "UIDPLUS", "CHILDREN", "LIST-EXTENDED", "LIST-STATUS"];

#[allow(clippy::too_many_arguments)]
pub fn compose(authenticated: bool, secure: bool, tls_available: bool, config: &ImapServerConfig, extensions: EnabledExtensions, sasl_mechanisms: &[&str]) -> Vec<String> {
    let mut tokens: Vec<String> = vec!["IMAP4rev2".to_string()];

    if !authenticated {
        if !secure && tls_available {
            tokens.push("STARTTLS".to_string());
        }
        for mech in sasl_mechanisms {
            tokens.push(format!("AUTH={mech}"));
        }
        if !secure && !config.allow_plaintext_login {
            tokens.push("LOGINDISABLED".to_string());
        }
    } else {
        if extensions.idle {
            tokens.push("IDLE".to_string());
        }
        if extensions.namespace {
            tokens.push("NAMESPACE".to_string());
        }
        if extensions.quota {
            tokens.push("QUOTA".to_string());
        }
        if extensions.r#move {
            tokens.push("MOVE".to_string());
        }
    }

    tokens.extend(COMMON_SUFFIX.iter().map(|s| s.to_string()));
    tokens
}

pub fn render_line(tokens: &[String]) -> String {
    format!("CAPABILITY {}", tokens.join(" "))
}
