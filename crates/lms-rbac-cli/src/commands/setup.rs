use super::CommandContext;
use anyhow::Result;
use tracing::info;

pub fn handle_setup(ctx: &CommandContext) -> Result<()> {
    println!("Setting up RBAC system...");

    let report = ctx.evaluator.seed_defaults()?;
    println!("Created {} permissions", report.permissions_created);
    println!("Created {} roles", report.roles_created);

    let mut assigned = 0;
    for user in ctx.users.list() {
        let Some(profile_role) = user.profile_role.clone() else {
            continue;
        };
        if ctx.evaluator.assign_base_role(&user, &profile_role)?.is_some() {
            assigned += 1;
        }
    }
    println!("Assigned base roles to {} users", assigned);

    ctx.save()?;
    info!(
        permissions_created = report.permissions_created,
        roles_created = report.roles_created,
        base_roles_assigned = assigned,
        "RBAC setup complete"
    );
    println!("RBAC system setup completed successfully!");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_context;
    use lms_rbac::User;

    #[test]
    fn test_setup_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path());
        ctx.users.add(User::new(1, "alice").with_profile_role("faculty")).unwrap();
        ctx.users.add(User::new(2, "guest")).unwrap();

        handle_setup(&ctx).unwrap();
        handle_setup(&ctx).unwrap();

        let alice = ctx.resolve_user("alice").unwrap();
        let guest = ctx.resolve_user("guest").unwrap();
        assert_eq!(ctx.evaluator.current_assignments(&alice).unwrap().len(), 1);
        assert!(ctx.evaluator.current_assignments(&guest).unwrap().is_empty());
        assert!(ctx.evaluator.user_has_permission(Some(&alice), "can_grade_assignments", None, None));
        assert!(dir.path().join("policy.json").exists());
    }
}
