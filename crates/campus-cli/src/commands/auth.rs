use anyhow::Result;
use campus_core::profile::UserRole;

use crate::bootstrap::Portal;

pub async fn sign_up(
    portal: &Portal,
    email: &str,
    password: &str,
    full_name: &str,
    role: &str,
) -> Result<()> {
    let role: UserRole = role.parse()?;
    if let Err(err) = portal.session.sign_up(email, password, full_name, role).await {
        if err.is_profile_write() {
            eprintln!("Account created, but the profile could not be saved. Sign in and contact support.");
        }
        return Err(err.into());
    }

    match portal.session.identity() {
        Some(identity) => println!("Signed up as {} ({})", identity.email, role),
        None => println!("Account created. Confirm your email, then run `campus sign-in`."),
    }
    Ok(())
}

pub async fn sign_in(portal: &Portal, email: &str, password: &str) -> Result<()> {
    portal.session.sign_in(email, password).await?;

    match portal.session.profile() {
        Some(profile) => println!("Welcome, {} ({})", profile.full_name, profile.role),
        None => println!("Signed in as {} (no profile yet)", email),
    }
    Ok(())
}

pub async fn sign_out(portal: &Portal) -> Result<()> {
    portal.session.sign_out().await?;
    println!("Signed out");
    Ok(())
}

pub fn whoami(portal: &Portal) -> Result<()> {
    let identity = portal.require_user()?;
    println!("id:    {}", identity.id);
    println!("email: {}", identity.email);

    match portal.session.profile() {
        Some(profile) => {
            println!("name:  {}", profile.full_name);
            println!("role:  {}", profile.role);
            if let Some(student_id) = profile.student_id {
                println!("student id: {}", student_id);
            }
        }
        None => println!("(no profile row)"),
    }
    Ok(())
}
