//! Externalized reply text.
//!
//! Keeps English literals out of the dispatcher so reply wording can be
//! swapped per deployment without touching protocol logic.
//! [`MessageCatalog`] is the injected `key -> template` map; `{0}`, `{1}`,
//! ... placeholders are substituted positionally by [`MessageCatalog::format`].

use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct MessageCatalog {
    templates: HashMap<&'static str, &'static str>,
}

impl MessageCatalog {
    pub fn format(&self, key: &str, args: &[&str]) -> String {
        let template = self.templates.get(key).copied().unwrap_or(key);
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        loop {
            match rest.find('{') {
                None => {
                    out.push_str(rest);
                    break;
                }
                Some(pos) => {
                    let Some(end) = rest[pos..].find('}') else {
                        out.push_str(rest);
                        break;
                    };
                    let end = pos + end;
                    out.push_str(&rest[..pos]);
                    if let Ok(idx) = rest[pos + 1..end].parse::<usize>() {
                        if let Some(value) = args.get(idx) {
                            out.push_str(value);
                        }
                    }
                    rest = &rest[end + 1..];
                }
            }
        }
        out
    }
}

impl Default for MessageCatalog {
    fn default() -> Self {
        let mut templates = HashMap::new();
        // FTP
        templates.insert("ftp.command_unrecognized", "command unrecognized: {0}");
        templates.insert("ftp.not_authenticated", "Please login with USER and PASS");
        templates.insert("ftp.permission_denied", "Permission denied");
        templates.insert("ftp.quota_exceeded", "Quota exceeded: used {0} of {1}");
        templates.insert("ftp.line_too_long", "line too long");
        templates.insert("ftp.illegal_characters", "illegal characters");
        templates.insert("ftp.rename_from_required", "RNFR required before RNTO");
        templates.insert("ftp.epsv_all_latched", "Network protocol not supported, EPSV ALL in effect");
        templates.insert("ftp.already_secure", "already secure");
        templates.insert("ftp.tls_unavailable", "TLS not available");
        templates.insert("ftp.pbsz_requires_tls", "PBSZ requires a secure connection");
        templates.insert("ftp.prot_requires_pbsz", "PROT requires PBSZ first");
        templates.insert("ftp.ccc_unsupported", "CCC not supported");
        // IMAP
        templates.insert("imap.bad_state", "command not allowed in this state");
        templates.insert("imap.login_disabled", "LOGIN is disabled over a cleartext connection");
        templates.insert("imap.literal_too_large", "literal too large");
        templates.insert("imap.idle_timeout", "idle timeout");
        templates.insert("imap.internal_error", "internal error");
        MessageCatalog { templates }
    }
}
