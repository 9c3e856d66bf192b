use super::CommandContext;
use anyhow::Result;
use lms_rbac::rbac::PolicyStore;

pub fn handle_roles(ctx: &CommandContext) -> Result<()> {
    let roles = ctx.store.roles()?;

    if roles.is_empty() {
        println!("No roles defined. Run `lms-rbac setup` first.");
        return Ok(());
    }

    println!("{:<12} {:<24} {:<9} {:<8} {:<12} {:<16}", "Code", "Name", "Priority", "Users", "Permissions", "Parent");
    println!("{}", "-".repeat(86));

    for role in roles {
        let summary = ctx.evaluator.role_summary(role.id)?;
        println!(
            "{:<12} {:<24} {:<9} {:<8} {:<12} {:<16}",
            summary.role.code,
            summary.role.name,
            summary.role.priority,
            summary.user_count,
            summary.effective_permissions.len(),
            summary.parent_name.as_deref().unwrap_or("-")
        );
    }

    Ok(())
}
