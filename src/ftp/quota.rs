//! `SITE QUOTA` / `SITE SETQUOTA`, and the pre-upload quota gate.

use crate::error::ErrorCategory;
use crate::ftp::handler::{QuotaManager, QuotaSource, QuotaUsage};
use crate::ftp::reply::{Reply, ReplyCode};
use crate::telemetry;

fn source_label(source: QuotaSource) -> &'static str {
    match source {
        QuotaSource::User => "USER",
        QuotaSource::Role => "ROLE",
        QuotaSource::Default => "DEFAULT",
        QuotaSource::None => "NONE",
    }
}

fn format_usage_line(user: &str, usage: &QuotaUsage) -> String {
    match usage.limit {
        Some(limit) => {
            let percent = if limit == 0 { 0 } else { (usage.used.saturating_mul(100)) / limit };
            format!(
                " {user}: source={source} used={used} limit={limit} percent={percent}%",
                source = source_label(usage.source),
                used = usage.used,
            )
        }
        None => format!(" {user}: source={source} used={used} limit=unlimited", source = source_label(usage.source), used = usage.used,),
    }
}

/// `SITE QUOTA [user]`: reports the caller's own usage, or another user's
/// usage if the caller is an admin and named one. The caller is responsible
/// for resolving `target_user` to the requester's own name when they are
/// not an admin.
pub async fn site_quota(target_user: &str, quota_manager: &dyn QuotaManager) -> Reply {
    let usage = quota_manager.usage(target_user).await;
    Reply::multiline(ReplyCode::SystemStatus, ["Quota status:".to_string(), format_usage_line(target_user, &usage), "End".to_string()])
}

/// `SITE SETQUOTA <user> <size>`. `size` may carry a `K`/`M`/`G` suffix.
pub async fn site_setquota(arg: &str, quota_manager: &dyn QuotaManager) -> Reply {
    let mut parts = arg.split_whitespace();
    let (Some(user), Some(size_str)) = (parts.next(), parts.next()) else {
        return Reply::new(ReplyCode::ParameterSyntaxError, "usage: SITE SETQUOTA <user> <size>");
    };
    let Some(limit) = parse_size_with_suffix(size_str) else {
        return Reply::new(ReplyCode::ParameterSyntaxError, "invalid size argument");
    };
    match quota_manager.set_user_quota(user, Some(limit)).await {
        Ok(()) => Reply::new(ReplyCode::CommandOkay, format!("Quota for {user} set to {limit} bytes")),
        Err(e) => Reply::new(ReplyCode::FileError, e),
    }
}

/// Parses sizes like `1024`, `900K`, `1G` into a byte count.
pub fn parse_size_with_suffix(s: &str) -> Option<u64> {
    let s = s.trim();
    let (digits, multiplier) = match s.chars().last() {
        Some(c @ ('K' | 'k')) => (&s[..s.len() - c.len_utf8()], 1024u64),
        Some(c @ ('M' | 'm')) => (&s[..s.len() - c.len_utf8()], 1024 * 1024),
        Some(c @ ('G' | 'g')) => (&s[..s.len() - c.len_utf8()], 1024 * 1024 * 1024),
        _ => (s, 1),
    };
    digits.trim().parse::<u64>().ok().map(|n| n * multiplier)
}

/// Pre-upload quota gate for STOR/STOU/APPE. Returns `None` when there is no
/// quota manager installed (always allowed) or the request is within quota;
/// `Some(reply)` when it must be rejected with 552.
pub async fn check_upload_quota(user: &str, size_hint: u64, quota_manager: Option<&dyn QuotaManager>) -> Option<Reply> {
    let quota_manager = quota_manager?;
    if quota_manager.can_store(user, size_hint).await {
        return None;
    }
    let usage = quota_manager.usage(user).await;
    let limit_text = usage.limit.map(|l| l.to_string()).unwrap_or_else(|| "unlimited".to_string());
    telemetry::emit_error_event!(ErrorCategory::LimitExceeded, user, used = usage.used, limit = limit_text.as_str(), "upload quota exceeded");
    Some(Reply::new(
        ReplyCode::ExceededStorageAllocation,
        format!("Quota exceeded: used {} of {}", usage.used, limit_text),
    ))
}
