use super::CommandContext;
use anyhow::Result;
use lms_rbac::resources::{ResourceRef, ScopableResource};

/// Build the check target from the location flags, typed by the most specific one given
fn resource_from_flags(department: Option<u64>, course: Option<u64>, offering: Option<u64>) -> Option<ResourceRef> {
    let mut resource = match (offering, course, department) {
        (Some(id), _, _) => ResourceRef::new("CourseOffering", Some(id)),
        (None, Some(id), _) => ResourceRef::new("Course", Some(id)),
        (None, None, Some(id)) => ResourceRef::new("Department", Some(id)),
        (None, None, None) => return None,
    };

    if let Some(id) = department {
        resource = resource.in_department(id);
    }
    if let Some(id) = course {
        resource = resource.in_course(id);
    }
    if let Some(id) = offering {
        resource = resource.in_offering(id);
    }
    Some(resource)
}

pub fn handle_check(ctx: &CommandContext, user: &str, permission: &str, department: Option<u64>, course: Option<u64>, offering: Option<u64>) -> Result<()> {
    let user = ctx.resolve_user(user)?;
    let resource = resource_from_flags(department, course, offering);

    let granted = ctx
        .evaluator
        .user_has_permission(Some(&user), permission, resource.as_ref().map(|r| r as &dyn ScopableResource), None);
    ctx.save()?;

    let target = resource
        .as_ref()
        .map(|r| format!("{} {}", r.resource_type, r.id.map(|id| id.to_string()).unwrap_or_default()))
        .unwrap_or_else(|| "global".to_string());
    println!("{} {} '{}' on {}", user.username, if granted { "GRANTED" } else { "DENIED" }, permission, target.trim_end());

    Ok(())
}

pub fn handle_permissions(ctx: &CommandContext, user: &str) -> Result<()> {
    let user = ctx.resolve_user(user)?;
    let permissions = ctx.evaluator.get_user_permissions(Some(&user), None);
    let roles = ctx.evaluator.effective_role_codes(&user)?;

    println!("Permissions for {}", user.username);
    println!("====================");
    println!("Roles: {}", if roles.is_empty() { "-".to_string() } else { roles.into_iter().collect::<Vec<_>>().join(", ") });
    println!();

    if permissions.is_empty() {
        println!("No permissions.");
        return Ok(());
    }

    for codename in &permissions {
        println!("  {}", codename);
    }
    println!();
    println!("Total: {}", permissions.len());

    Ok(())
}
