use super::CommandContext;
use anyhow::{Result, anyhow, bail};
use chrono::{Duration, Utc};
use lms_rbac::rbac::{AuditQuery, AuditResult};

/// Filters of the audit command
#[derive(Debug)]
pub struct AuditFilter {
    pub user: Option<String>,
    pub permission: Option<String>,
    pub result: Option<String>,
    pub days: i64,
    pub limit: usize,
}

impl AuditFilter {
    fn to_query(&self) -> Result<AuditQuery> {
        let result = self.result.as_deref().map(|r| r.parse::<AuditResult>().map_err(|e| anyhow!(e))).transpose()?;

        if self.days < 0 {
            bail!("--days must not be negative, got {}", self.days);
        }
        let since = Duration::try_days(self.days)
            .and_then(|window| Utc::now().checked_sub_signed(window))
            .ok_or_else(|| anyhow!("--days {} reaches past the earliest supported date", self.days))?;

        Ok(AuditQuery {
            username: self.user.clone(),
            permission: self.permission.clone(),
            result,
            since: Some(since),
            until: None,
            limit: Some(self.limit),
        })
    }
}

pub fn handle_audit(ctx: &CommandContext, filter: AuditFilter) -> Result<()> {
    let query = filter.to_query()?;
    let entries = ctx.audit.query(&query);

    println!("Permission audit, last {} days", filter.days);
    println!("{}", "=".repeat(40));

    if entries.is_empty() {
        println!("No audit entries found.");
    } else {
        println!("{:<20} {:<16} {:<28} {:<8} {:<20}", "Time", "User", "Permission", "Result", "Resource");
        println!("{}", "-".repeat(96));

        for entry in &entries {
            let resource = match entry.resource_id {
                Some(id) => format!("{}:{}", entry.resource_type, id),
                None => entry.resource_type.clone(),
            };
            println!(
                "{:<20} {:<16} {:<28} {:<8} {:<20}",
                entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                entry.username.as_deref().unwrap_or("anonymous"),
                entry.permission,
                entry.result,
                resource
            );
        }
    }

    let summary = ctx.audit.summary(query.since, None);
    println!();
    println!("Summary:");
    println!("  Total checks: {}", summary.total);
    println!("  Granted: {}", summary.granted);
    println!("  Denied: {}", summary.denied);
    println!("  Errors: {}", summary.error);

    Ok(())
}
