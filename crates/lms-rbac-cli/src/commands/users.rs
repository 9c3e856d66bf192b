use super::CommandContext;
use crate::UserCommands;
use anyhow::Result;
use lms_rbac::User;

pub fn handle_user_command(ctx: &CommandContext, command: UserCommands) -> Result<()> {
    match command {
        UserCommands::Add { id, username, profile_role } => add_user(ctx, id, &username, profile_role),
        UserCommands::List => list_users(ctx),
    }
}

fn add_user(ctx: &CommandContext, id: u64, username: &str, profile_role: Option<String>) -> Result<()> {
    let mut user = User::new(id, username);
    if let Some(role) = profile_role {
        user = user.with_profile_role(role);
    }
    ctx.users.add(user.clone())?;

    println!("User registered:");
    println!("  ID: {}", user.id);
    println!("  Username: {}", user.username);

    if let Some(profile_role) = &user.profile_role {
        match ctx.evaluator.assign_base_role(&user, profile_role)? {
            Some(assignment) => println!("  Base role assigned (assignment {})", assignment.id),
            None => println!("  No base role assigned for profile role '{}'", profile_role),
        }
    }

    ctx.save()
}

fn list_users(ctx: &CommandContext) -> Result<()> {
    let users = ctx.users.list();

    if users.is_empty() {
        println!("No users registered.");
        return Ok(());
    }

    println!("{:<10} {:<24} {:<14} {:<30}", "ID", "Username", "Profile Role", "Roles");
    println!("{}", "-".repeat(80));

    for user in users {
        let roles = ctx.evaluator.current_role_codes(&user)?.into_iter().collect::<Vec<_>>().join(",");
        println!("{:<10} {:<24} {:<14} {:<30}", user.id, user.username, user.profile_role.as_deref().unwrap_or("-"), roles);
    }

    Ok(())
}
