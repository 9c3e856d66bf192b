use super::{CommandContext, parse_datetime};
use anyhow::{Result, anyhow};
use lms_rbac::rbac::{AssignOptions, COURSE_OFFERING_KIND, PolicyStore, ScopeObject, ScopeType};

/// Scope flags of the assign command; at most one is set
#[derive(Debug, Default)]
pub struct ScopeArgs {
    pub department: Option<u64>,
    pub course: Option<u64>,
    pub offering: Option<u64>,
    pub custom: Option<String>,
}

impl ScopeArgs {
    fn into_options(self) -> Result<AssignOptions> {
        if let Some(id) = self.department {
            return Ok(AssignOptions::scoped(ScopeType::Department, ScopeObject::new("department", id)));
        }
        if let Some(id) = self.course {
            return Ok(AssignOptions::scoped(ScopeType::Course, ScopeObject::new("course", id)));
        }
        if let Some(id) = self.offering {
            return Ok(AssignOptions::scoped(ScopeType::Course, ScopeObject::new(COURSE_OFFERING_KIND, id)));
        }
        if let Some(custom) = self.custom {
            let (kind, id) = custom.split_once(':').ok_or_else(|| anyhow!("Custom scope must be KIND:ID, got '{}'", custom))?;
            let id = id.parse::<u64>().map_err(|_| anyhow!("Invalid custom scope id '{}'", id))?;
            return Ok(AssignOptions::scoped(ScopeType::Custom, ScopeObject::new(kind, id)));
        }
        Ok(AssignOptions::default())
    }
}

pub fn handle_assign(ctx: &CommandContext, user: &str, role: &str, scope: ScopeArgs, start: Option<&str>, end: Option<&str>) -> Result<()> {
    let user = ctx.resolve_user(user)?;
    let role = ctx.store.role_by_code(role)?.ok_or_else(|| anyhow!("Role '{}' not found", role))?;

    let start_date = start.map(parse_datetime).transpose()?;
    let end_date = end.map(parse_datetime).transpose()?;
    let options = scope.into_options()?.window(start_date, end_date);

    let assignment = ctx.evaluator.assign_role_to_user(&user, &role, options)?;
    ctx.save()?;

    println!("Role assigned successfully:");
    println!("  Assignment: {}", assignment.id);
    println!("  User: {}", user.username);
    println!("  Role: {}", role.code);
    println!("  Scope: {}", assignment.scope);
    println!("  Window: {} .. {}", assignment.start_date.format("%Y-%m-%d %H:%M:%S"), assignment.end_date.map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string()).unwrap_or_else(|| "open".to_string()));

    Ok(())
}

pub fn handle_deactivate(ctx: &CommandContext, assignment_id: u64) -> Result<()> {
    let assignment = ctx.evaluator.deactivate_assignment(assignment_id)?;
    ctx.save()?;

    println!("Assignment {} deactivated (user {}).", assignment.id, assignment.user_id);
    Ok(())
}

pub fn handle_grant(ctx: &CommandContext, user: &str, permission: &str, context_type: &str, context_id: u64, expires: Option<&str>) -> Result<()> {
    let user = ctx.resolve_user(user)?;
    let expires_at = expires.map(parse_datetime).transpose()?;

    let grant = ctx.evaluator.grant_contextual_permission(&user, permission, context_type, context_id, None, expires_at)?;
    ctx.save()?;

    println!("Contextual permission granted:");
    println!("  Grant: {}", grant.id);
    println!("  User: {}", user.username);
    println!("  Permission: {}", grant.permission);
    println!("  Context: {}:{}", grant.context_type, grant.context_id);
    if let Some(expires_at) = grant.expires_at {
        println!("  Expires: {}", expires_at.format("%Y-%m-%d %H:%M:%S"));
    }

    Ok(())
}
